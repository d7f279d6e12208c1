//! Interactive thematic maps: projected region outlines and markers drawn on
//! a vector surface, styled from data series, with animated pan and zoom,
//! selection and drill-down into sub-maps.

pub mod braille;
pub mod color;
pub mod drilldown;
pub mod error;
pub mod geo;
pub mod map;
pub mod model;
pub mod path;
pub mod scale;
pub mod series;
pub mod style;
pub mod surface;
pub mod topology;

pub use drilldown::{ChildLoader, ChildRequest, DrillDown, DrillDownOptions};
pub use error::{MapError, Result};
pub use geo::LatLng;
pub use map::{ElementKind, FocusSpec, MapConfig, MapEvent, SeriesTarget, SingleMap};
pub use surface::{BrailleSurface, Surface, SvgSurface, VmlSurface};
pub use topology::{register_map, MapTopology};
