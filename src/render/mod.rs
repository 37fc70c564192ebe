//! Rendering of the record stream as a raster image.

pub mod heatmap;

pub use heatmap::{HeatmapAccumulator, Raster};
