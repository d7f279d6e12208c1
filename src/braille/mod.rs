mod canvas;
pub mod geometry;

pub use canvas::BrailleCanvas;
