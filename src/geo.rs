use serde::Deserialize;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<[f64; 2]> for LatLng {
    fn from(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }
}

/// Shift longitudes west of the antimeridian opposite `central_meridian` by a
/// full turn so territories spanning it project contiguously.
#[inline(always)]
pub fn normalize_lng(lng: f64, central_meridian: f64) -> f64 {
    if lng < central_meridian - 180.0 {
        lng + 360.0
    } else {
        lng
    }
}

/// Fold a longitude produced by an inverse projection back into
/// `[-180, 180]`, undoing [`normalize_lng`].
#[inline(always)]
pub fn denormalize_lng(lng: f64) -> f64 {
    if lng > 180.0 {
        lng - 360.0
    } else if lng < -180.0 {
        lng + 360.0
    } else {
        lng
    }
}
