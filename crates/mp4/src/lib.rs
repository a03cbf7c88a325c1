//! Minimal MP4 probing.
//!
//! Reads just enough of a progressive MP4 head (`ftyp` + `moov`) to report the
//! movie duration and the display geometry of its tracks.

pub(crate) mod box_utils;
pub mod movie;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use movie::{MovieInfo, TrackInfo, TrackKind, probe_movie};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("moov box not found in the provided data")]
    MoovNotFound,

    #[error("malformed {fourcc} box: {reason}")]
    Malformed {
        fourcc: &'static str,
        reason: &'static str,
    },
}

/// 2D affine display transform from a `tkhd`/`mvhd` matrix.
///
/// The on-disk layout is `[a, b, u, c, d, v, x, y, w]` where `a, b, c, d, x, y`
/// are 16.16 fixed point and `u, v, w` are 2.30. Only the affine part is kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn from_raw(raw: [i32; 9]) -> Self {
        let fixed = |v: i32| v as f64 / 65536.0;
        Self {
            a: fixed(raw[0]),
            b: fixed(raw[1]),
            c: fixed(raw[3]),
            d: fixed(raw[4]),
            tx: fixed(raw[6]),
            ty: fixed(raw[7]),
        }
    }

    /// Apply the linear part to a size and return absolute dimensions.
    pub fn apply_to_size(&self, width: f64, height: f64) -> (f64, f64) {
        let w = self.a * width + self.c * height;
        let h = self.b * width + self.d * height;
        (w.abs(), h.abs())
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}
