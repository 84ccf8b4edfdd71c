use crate::{FetchTask, http::{Reprojector, acquisition_date}};
use anyhow::{Context, Result, bail};
use gdal::{
	Dataset, DatasetOptions, GdalOpenFlags,
	cpl::CslStringList,
	raster::Buffer,
};
use std::{ffi::CString, path::Path};
use time::Date;

/// Creation options of every GeoTIFF written by the pipeline.
pub(super) const GTIFF_OPTIONS: [&str; 6] = ["-of", "GTiff", "-co", "COMPRESS=ZSTD", "-co", "TILED=YES"];

fn path_str(path: &Path) -> Result<&str> {
	path.to_str().with_context(|| format!("path {path:?} is not valid UTF-8"))
}

/// Runs `gdalwarp <args> src dst`.
pub(super) fn warp(src: &Path, dst: &Path, args: &[String]) -> Result<()> {
	log::trace!("gdalwarp {} {src:?} {dst:?}", args.join(" "));
	let source = Dataset::open(src).with_context(|| format!("Failed to open {src:?}"))?;

	let mut argv = CslStringList::new();
	for arg in args {
		argv.add_string(arg)?;
	}
	let dst_name = CString::new(path_str(dst)?)?;

	unsafe {
		use gdal_sys::*;

		let options = GDALWarpAppOptionsNew(argv.as_ptr(), core::ptr::null_mut());
		if options.is_null() {
			bail!("invalid warp options: {}", args.join(" "));
		}
		let mut sources = [source.c_dataset()];
		let mut usage_error = 0;
		let result = GDALWarp(
			dst_name.as_ptr(),
			core::ptr::null_mut(),
			1,
			sources.as_mut_ptr(),
			options,
			&raw mut usage_error,
		);
		GDALWarpAppOptionsFree(options);
		if result.is_null() {
			let msg = std::ffi::CStr::from_ptr(CPLGetLastErrorMsg()).to_string_lossy().into_owned();
			bail!("gdalwarp {src:?} to {dst:?} failed: {msg}");
		}
		GDALClose(result);
	}
	Ok(())
}

pub(super) fn nodata_args(nodata: f64) -> [String; 4] {
	[
		"-srcnodata".into(),
		nodata.to_string(),
		"-dstnodata".into(),
		nodata.to_string(),
	]
}

/// Warps downloads into the task's reference system, nearest neighbour, as tiled ZSTD GeoTIFF.
///
/// Optionally shifts newer acquisitions back onto an older processing baseline
/// by subtracting a constant from every valid pixel.
#[derive(Clone, Debug, Default)]
pub struct GdalReprojector {
	baseline: Option<(Date, f64)>,
}

impl GdalReprojector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Subtracts `offset` from acquisitions made on or after `cutoff`.
	#[must_use]
	pub fn with_baseline_offset(mut self, cutoff: Date, offset: f64) -> Self {
		self.baseline = Some((cutoff, offset));
		self
	}

	fn harmonize(path: &Path, offset: f64, nodata: Option<f64>) -> Result<()> {
		let options = DatasetOptions {
			open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
			..DatasetOptions::default()
		};
		let dataset = Dataset::open_ex(path, options)?;
		for index in 1..=dataset.raster_count() {
			let mut band = dataset.rasterband(index)?;
			let nodata = nodata.or(band.no_data_value());
			let buffer = band.read_band_as::<f64>()?;
			let shape = buffer.shape();
			let data = buffer
				.data()
				.iter()
				.map(|&v| if Some(v) == nodata { v } else { (v - offset).max(0.0) })
				.collect();
			let mut shifted = Buffer::new(shape, data);
			band.write((0, 0), shape, &mut shifted)?;
		}
		Ok(())
	}
}

impl Reprojector for GdalReprojector {
	fn reproject(&self, download: &Path, output: &Path, task: &FetchTask) -> Result<()> {
		let mut args: Vec<String> = vec!["-t_srs".into(), task.target_srs.clone(), "-r".into(), "near".into()];
		if let Some(nodata) = task.nodata {
			args.extend(nodata_args(nodata));
		}
		args.extend(GTIFF_OPTIONS.iter().map(|s| s.to_string()));
		warp(download, output, &args)?;

		if let Some((cutoff, offset)) = self.baseline {
			let acquired = acquisition_date(&task.url)?;
			if acquired >= cutoff {
				log::debug!("shifting {} acquired {acquired} by {offset}", task.name());
				Self::harmonize(output, offset, task.nodata)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gdal::{DriverManager, spatial_ref::SpatialRef};
	use rstest::rstest;
	use std::path::PathBuf;
	use time::macros::date;

	fn write_tile(path: &Path, value: u16) {
		let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
		let mut dataset = driver.create_with_band_type::<u16, _>(path, 4, 4, 1).unwrap();
		dataset.set_geo_transform(&[0.0, 10.0, 0.0, 40.0, 0.0, -10.0]).unwrap();
		dataset.set_spatial_ref(&SpatialRef::from_epsg(3857).unwrap()).unwrap();
		let mut data = vec![value; 16];
		data[0] = 0;
		let mut buffer = Buffer::new((4, 4), data);
		dataset.rasterband(1).unwrap().write((0, 0), (4, 4), &mut buffer).unwrap();
	}

	fn task(url: &str) -> FetchTask {
		FetchTask {
			tile_id: "36MZE".into(),
			asset_key: "red".into(),
			band: "B04".into(),
			url: url.into(),
			target: PathBuf::from("B04"),
			nodata: Some(0.0),
			target_srs: "EPSG:3857".into(),
		}
	}

	#[rstest]
	#[case("https://host/36/M/ZE/2021/6/1/S2B_36MZE_20210601_0_L2A/B04.tif", 1500.0)]
	#[case("https://host/36/M/ZE/2022/1/25/S2A_36MZE_20220125_0_L2A/B04.tif", 500.0)]
	fn reproject_shifts_new_baseline(#[case] url: &str, #[case] expected: f64) {
		let dir = tempfile::tempdir().unwrap();
		let download = dir.path().join("download.tif");
		let output = dir.path().join("B04.tif");
		write_tile(&download, 1500);

		let reprojector = GdalReprojector::new().with_baseline_offset(date!(2022 - 01 - 25), 1000.0);
		reprojector.reproject(&download, &output, &task(url)).unwrap();

		let dataset = Dataset::open(&output).unwrap();
		assert_eq!(dataset.raster_size(), (4, 4));
		let values = dataset.rasterband(1).unwrap().read_band_as::<f64>().unwrap();
		assert_eq!(values.data()[0], 0.0);
		assert_eq!(values.data()[5], expected);
	}
}
