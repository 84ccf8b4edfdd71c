use super::{MosaicSpec, RasterInfo};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Polygon layer every output raster is cropped to.
#[derive(Clone, Debug, PartialEq)]
pub struct CropMask {
	pub path: PathBuf,
	pub layer: String,
}

/// Raster operations of the mosaic stage.
///
/// Calls block; the stage runs them on the blocking thread pool.
pub trait MosaicBackend: Send + Sync {
	fn describe(&self, path: &Path) -> Result<RasterInfo>;

	/// Writes a virtual mosaic of `files` on the grid of `spec`, nearest neighbour,
	/// `nodata` for source and destination.
	fn build_mosaic(&self, files: &[PathBuf], spec: &MosaicSpec, nodata: f64, mosaic: &Path) -> Result<()>;

	/// Warps `mosaic` into the target reference of `spec`, cropped to `mask`, as compressed tiled GeoTIFF.
	fn crop(&self, mosaic: &Path, spec: &MosaicSpec, mask: &CropMask, nodata: f64, output: &Path) -> Result<()>;
}
