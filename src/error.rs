use thiserror::Error;

/// Errors raised by the map engine.
///
/// Data problems inside a series (a value that does not parse as a number)
/// are not errors: the element falls back to its pre-series style.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("map `{0}` is not registered")]
    UnknownMap(String),

    #[error("region `{0}` does not exist on this map")]
    UnknownRegion(String),

    #[error("marker `{0}` does not exist on this map")]
    UnknownMarker(String),

    #[error("focus target does not resolve to any region")]
    EmptyFocus,

    #[error("map `{0}` has no projection, geographic coordinates are unavailable")]
    NoProjection(String),

    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("failed to parse json: {0}")]
    Json(#[from] simd_json::Error),

    #[error("failed to write markup: {0}")]
    Markup(String),

    #[error("invalid scale: {0}")]
    Scale(String),

    #[error("no {kind} series at index {index}")]
    Series { kind: &'static str, index: usize },
}

pub type Result<T, E = MapError> = std::result::Result<T, E>;
