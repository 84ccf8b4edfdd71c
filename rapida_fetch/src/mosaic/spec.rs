use anyhow::{Context, Result, ensure};
use rapida_core::{GeoBBox, Resolution};

/// Extent and pixel size of one local raster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterInfo {
	pub bounds: GeoBBox,
	pub resolution: Resolution,
}

impl RasterInfo {
	/// Derives the extent from a north-up geo transform and the raster size.
	pub fn from_geo_transform(gt: &[f64; 6], width: usize, height: usize) -> Result<RasterInfo> {
		let resolution = Resolution::from_geo_transform(gt)?;
		let x0 = gt[0];
		let y0 = gt[3];
		let x1 = x0 + gt[1] * width as f64;
		let y1 = y0 + gt[5] * height as f64;
		Ok(RasterInfo {
			bounds: GeoBBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))?,
			resolution,
		})
	}
}

/// Output grid of one band: union of the tile extents at the finest tile resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct MosaicSpec {
	pub target_srs: String,
	pub resolution: Resolution,
	pub bounds: GeoBBox,
}

impl MosaicSpec {
	pub fn from_rasters(target_srs: &str, rasters: &[RasterInfo]) -> Result<MosaicSpec> {
		ensure!(!rasters.is_empty(), "cannot build a mosaic without rasters");
		let bounds = GeoBBox::union_of(rasters.iter().map(|r| r.bounds)).context("no bounds")?;
		let resolution = Resolution::finest_of(rasters.iter().map(|r| r.resolution)).context("no resolution")?;
		Ok(MosaicSpec {
			target_srs: target_srs.to_string(),
			resolution,
			bounds,
		})
	}

	/// Same extent on a different pixel grid.
	#[must_use]
	pub fn with_resolution(self, resolution: Resolution) -> MosaicSpec {
		MosaicSpec { resolution, ..self }
	}

	/// Output size in whole pixels.
	pub fn pixel_size(&self) -> (usize, usize) {
		let width = (self.bounds.width() / self.resolution.x).round().max(1.0);
		let height = (self.bounds.height() / self.resolution.y).round().max(1.0);
		(width as usize, height as usize)
	}
}
