use crate::{RasterArray, RasterSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use gdal::Dataset;
use rapida_core::RasterWindow;
use std::path::PathBuf;

/// Reads windows of a raster GDAL can open, local or remote (`/vsicurl/...`).
#[derive(Clone, Debug)]
pub struct GdalRasterSource {
	path: PathBuf,
}

impl GdalRasterSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Raster size and the block size of `band`.
	pub async fn layout(&self, band: usize) -> Result<((usize, usize), (usize, usize))> {
		let path = self.path.clone();
		tokio::task::spawn_blocking(move || {
			let dataset = Dataset::open(&path)?;
			let size = dataset.raster_size();
			let block = dataset.rasterband(band)?.block_size();
			Ok((size, block))
		})
		.await?
	}
}

#[async_trait]
impl RasterSource for GdalRasterSource {
	async fn read_window(&self, band: usize, window: RasterWindow) -> Result<RasterArray> {
		let path = self.path.clone();
		tokio::task::spawn_blocking(move || {
			let dataset = Dataset::open(&path).with_context(|| format!("Failed to open {path:?}"))?;
			let size = (window.col_size, window.row_size);
			let buffer = dataset.rasterband(band)?.read_as::<f64>(
				(window.col_start as isize, window.row_start as isize),
				size,
				size,
				None,
			)?;
			RasterArray::new(window.col_size, window.row_size, buffer.data().to_vec())
		})
		.await?
	}
}
