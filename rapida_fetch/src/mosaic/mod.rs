//! Per-band mosaicking of the fetched tiles, reprojected and cropped to the project boundary.

mod backend;
mod spec;
mod stage;

pub use backend::{CropMask, MosaicBackend};
pub use spec::{MosaicSpec, RasterInfo};
pub use stage::{BandOutcome, BandStatus, MosaicStage};
