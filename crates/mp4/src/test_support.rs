//! Shared MP4 test builders.
//!
//! This module is available for local mp4 tests and optionally for downstream
//! crate tests when the `test-utils` feature is enabled.

use bytes::Bytes;

/// `tkhd`/`mvhd` identity matrix in raw 16.16 / 2.30 fixed point.
pub const IDENTITY_MATRIX: [i32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Display matrix written by phones recording in portrait (90° clockwise).
pub const ROTATE_90_MATRIX: [i32; 9] = [0, 0x0001_0000, 0, -0x0001_0000, 0, 0, 0, 0, 0x4000_0000];

pub fn make_box(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let size = (8 + body.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

pub fn make_full_box(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + payload.len());
    body.push(version);
    body.push(((flags >> 16) & 0xFF) as u8);
    body.push(((flags >> 8) & 0xFF) as u8);
    body.push((flags & 0xFF) as u8);
    body.extend_from_slice(payload);
    make_box(fourcc, &body)
}

fn push_matrix(out: &mut Vec<u8>, matrix: [i32; 9]) {
    for value in matrix {
        out.extend_from_slice(&value.to_be_bytes());
    }
}

pub fn make_mvhd(version: u8, timescale: u32, duration: u64) -> Vec<u8> {
    let mut payload = Vec::new();
    if version == 1 {
        payload.extend_from_slice(&0u64.to_be_bytes());
        payload.extend_from_slice(&0u64.to_be_bytes());
        payload.extend_from_slice(&timescale.to_be_bytes());
        payload.extend_from_slice(&duration.to_be_bytes());
    } else {
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&timescale.to_be_bytes());
        payload.extend_from_slice(&(duration as u32).to_be_bytes());
    }
    payload.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate
    payload.extend_from_slice(&0x0100u16.to_be_bytes()); // volume
    payload.extend_from_slice(&[0u8; 10]);
    push_matrix(&mut payload, IDENTITY_MATRIX);
    payload.extend_from_slice(&[0u8; 24]);
    payload.extend_from_slice(&2u32.to_be_bytes()); // next_track_ID
    make_full_box(b"mvhd", version, 0, &payload)
}

pub fn make_tkhd(version: u8, track_id: u32, width: u32, height: u32, matrix: [i32; 9]) -> Vec<u8> {
    let mut payload = Vec::new();
    if version == 1 {
        payload.extend_from_slice(&0u64.to_be_bytes());
        payload.extend_from_slice(&0u64.to_be_bytes());
        payload.extend_from_slice(&track_id.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0u64.to_be_bytes());
    } else {
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&track_id.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0u32.to_be_bytes());
    }
    payload.extend_from_slice(&[0u8; 16]);
    push_matrix(&mut payload, matrix);
    payload.extend_from_slice(&(width << 16).to_be_bytes());
    payload.extend_from_slice(&(height << 16).to_be_bytes());
    make_full_box(b"tkhd", version, 0x7, &payload)
}

pub fn make_hdlr(handler: &[u8; 4]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&0u32.to_be_bytes()); // pre_defined
    payload.extend_from_slice(handler);
    payload.extend_from_slice(&[0u8; 12]);
    payload.extend_from_slice(b"probe\0");
    make_full_box(b"hdlr", 0, 0, &payload)
}

pub fn make_trak(
    track_id: u32,
    handler: &[u8; 4],
    width: u32,
    height: u32,
    matrix: [i32; 9],
) -> Vec<u8> {
    let mut body = make_tkhd(0, track_id, width, height, matrix);
    body.extend_from_slice(&make_box(b"mdia", &make_hdlr(handler)));
    make_box(b"trak", &body)
}

/// A complete `ftyp` + `moov` head, followed by a small `mdat`.
pub fn make_movie(timescale: u32, duration: u64, traks: &[Vec<u8>]) -> Bytes {
    let mut moov_body = make_mvhd(0, timescale, duration);
    for trak in traks {
        moov_body.extend_from_slice(trak);
    }

    let mut out = make_box(b"ftyp", b"isom\0\0\x02\0isomiso2avc1mp41");
    out.extend_from_slice(&make_box(b"moov", &moov_body));
    out.extend_from_slice(&make_box(b"mdat", &[0u8; 64]));
    Bytes::from(out)
}
