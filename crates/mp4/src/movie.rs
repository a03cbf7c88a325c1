//! Movie header probing for progressive MP4 files.
//!
//! Only the `moov` box is inspected: movie duration from `mvhd`, and for each
//! `trak` the `tkhd` geometry (display matrix and 16.16 width/height) plus the
//! `hdlr` handler type. This is enough to know how long a clip is and how it
//! should be laid out on screen, including clips captured in portrait whose
//! pixels are stored landscape with a rotation matrix.

use bytes::Bytes;
use tracing::debug;

use crate::box_utils::{BoxView, FieldReader, children, find_first_box};
use crate::{Matrix, ProbeError};

/// Kind of media carried by a track, from its `hdlr` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Other([u8; 4]),
}

impl TrackKind {
    fn from_handler(handler: [u8; 4]) -> Self {
        match &handler {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            _ => Self::Other(handler),
        }
    }
}

/// Geometry and identity of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub track_id: u32,
    pub kind: TrackKind,
    /// Stored width in pixels, before the display matrix is applied.
    pub width: f64,
    /// Stored height in pixels, before the display matrix is applied.
    pub height: f64,
    pub matrix: Matrix,
}

impl TrackInfo {
    /// Width and height after applying the display matrix, as absolute values.
    pub fn display_size(&self) -> (f64, f64) {
        self.matrix.apply_to_size(self.width, self.height)
    }
}

/// Everything the probe learned from the `moov` box.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MovieInfo {
    /// Movie duration in seconds, `None` when unknown or unset.
    pub duration: Option<f64>,
    pub tracks: Vec<TrackInfo>,
}

impl MovieInfo {
    /// First video track, if any.
    pub fn video_track(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }
}

/// Probe the head of a progressive MP4 file.
///
/// `data` only needs to contain the top-level boxes up to and including
/// `moov`; a ranged download of the first few megabytes is usually enough for
/// files written with the movie header first.
pub fn probe_movie(data: &Bytes) -> Result<MovieInfo, ProbeError> {
    let moov = find_first_box(data, 0, data.len(), *b"moov").ok_or(ProbeError::MoovNotFound)?;

    let mut info = MovieInfo::default();
    for child in children(data, moov.body_start, moov.body_end) {
        match &child.fourcc {
            b"mvhd" => info.duration = parse_mvhd(child.body(data))?,
            b"trak" => {
                if let Some(track) = parse_trak(data, &child)? {
                    info.tracks.push(track);
                }
            }
            _ => {}
        }
    }

    debug!(
        duration = ?info.duration,
        tracks = info.tracks.len(),
        "Probed movie header"
    );
    Ok(info)
}

fn parse_mvhd(body: &[u8]) -> Result<Option<f64>, ProbeError> {
    let malformed = || ProbeError::Malformed {
        fourcc: "mvhd",
        reason: "header truncated",
    };
    let mut r = FieldReader::new(body);
    let version = r.u8().ok_or_else(malformed)?;
    r.skip(3).ok_or_else(malformed)?;

    let (timescale, duration) = if version == 1 {
        r.skip(16).ok_or_else(malformed)?;
        let timescale = r.u32().ok_or_else(malformed)?;
        (timescale, r.u64().ok_or_else(malformed)?)
    } else {
        r.skip(8).ok_or_else(malformed)?;
        let timescale = r.u32().ok_or_else(malformed)?;
        let duration = r.u32().ok_or_else(malformed)?;
        // All ones means "unknown" in the 32-bit layout.
        let duration = if duration == u32::MAX {
            u64::MAX
        } else {
            duration as u64
        };
        (timescale, duration)
    };

    if timescale == 0 || duration == 0 || duration == u64::MAX {
        return Ok(None);
    }
    Ok(Some(duration as f64 / timescale as f64))
}

fn parse_trak(data: &Bytes, trak: &BoxView) -> Result<Option<TrackInfo>, ProbeError> {
    let Some(tkhd) = find_first_box(data, trak.body_start, trak.body_end, *b"tkhd") else {
        return Ok(None);
    };

    let handler = find_first_box(data, trak.body_start, trak.body_end, *b"mdia")
        .and_then(|mdia| find_first_box(data, mdia.body_start, mdia.body_end, *b"hdlr"))
        .and_then(|hdlr| {
            let mut r = FieldReader::new(hdlr.body(data));
            r.skip(8)?;
            r.fourcc()
        });

    let malformed = || ProbeError::Malformed {
        fourcc: "tkhd",
        reason: "header truncated",
    };
    let mut r = FieldReader::new(tkhd.body(data));
    let version = r.u8().ok_or_else(malformed)?;
    r.skip(3).ok_or_else(malformed)?;

    let track_id = if version == 1 {
        r.skip(16).ok_or_else(malformed)?;
        let id = r.u32().ok_or_else(malformed)?;
        r.skip(4 + 8).ok_or_else(malformed)?;
        id
    } else {
        r.skip(8).ok_or_else(malformed)?;
        let id = r.u32().ok_or_else(malformed)?;
        r.skip(4 + 4).ok_or_else(malformed)?;
        id
    };

    // reserved(8) + layer(2) + alternate_group(2) + volume(2) + reserved(2)
    r.skip(16).ok_or_else(malformed)?;

    let mut raw = [0i32; 9];
    for slot in raw.iter_mut() {
        *slot = r.i32().ok_or_else(malformed)?;
    }
    let width = r.u32().ok_or_else(malformed)?;
    let height = r.u32().ok_or_else(malformed)?;

    Ok(Some(TrackInfo {
        track_id,
        kind: handler.map_or(TrackKind::Other(*b"????"), TrackKind::from_handler),
        width: fixed_16_16(width),
        height: fixed_16_16(height),
        matrix: Matrix::from_raw(raw),
    }))
}

fn fixed_16_16(value: u32) -> f64 {
    value as f64 / 65536.0
}
