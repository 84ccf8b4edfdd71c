//! GDAL backed collaborators, enabled with the `gdal` feature.
//!
//! GDAL handles are not shared between threads: every call opens its own
//! dataset on the blocking thread pool.

mod mosaic;
mod raster;
mod vector;
mod warp;

pub use mosaic::GdalMosaicBackend;
pub use raster::GdalRasterSource;
pub use vector::{GdalVectorSource, boundary_bbox};
pub use warp::GdalReprojector;
