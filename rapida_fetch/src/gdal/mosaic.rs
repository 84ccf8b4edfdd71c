use super::warp::{GTIFF_OPTIONS, nodata_args, warp};
use crate::{CropMask, MosaicBackend, MosaicSpec, RasterInfo};
use anyhow::{Context, Result};
use gdal::{
	Dataset,
	programs::raster::{BuildVRTOptions, build_vrt},
};
use std::path::{Path, PathBuf};

/// Memory GDAL may use for warping, in MB.
const WARP_MEMORY_MB: u32 = 1024;

#[derive(Clone, Copy, Debug, Default)]
pub struct GdalMosaicBackend;

impl MosaicBackend for GdalMosaicBackend {
	fn describe(&self, path: &Path) -> Result<RasterInfo> {
		let dataset = Dataset::open(path)?;
		let gt = dataset.geo_transform()?;
		let (width, height) = dataset.raster_size();
		RasterInfo::from_geo_transform(&gt, width, height)
	}

	fn build_mosaic(&self, files: &[PathBuf], spec: &MosaicSpec, nodata: f64, mosaic: &Path) -> Result<()> {
		let datasets = files
			.iter()
			.map(|f| Dataset::open(f).with_context(|| format!("Failed to open {f:?}")))
			.collect::<Result<Vec<_>>>()?;
		let [x_min, y_min, x_max, y_max] = spec.bounds.as_array();
		let args = vec![
			"-te".to_string(),
			x_min.to_string(),
			y_min.to_string(),
			x_max.to_string(),
			y_max.to_string(),
			"-tr".into(),
			spec.resolution.x.to_string(),
			spec.resolution.y.to_string(),
			"-r".into(),
			"nearest".into(),
			"-a_srs".into(),
			spec.target_srs.clone(),
			"-srcnodata".into(),
			nodata.to_string(),
			"-vrtnodata".into(),
			nodata.to_string(),
		];
		let options = BuildVRTOptions::new(args)?;
		// the VRT is written when the dataset is closed
		let vrt = build_vrt(Some(mosaic), &datasets, Some(options))?;
		drop(vrt);
		Ok(())
	}

	fn crop(&self, mosaic: &Path, spec: &MosaicSpec, mask: &CropMask, nodata: f64, output: &Path) -> Result<()> {
		let mut args: Vec<String> = vec![
			"-t_srs".into(),
			spec.target_srs.clone(),
			"-tr".into(),
			spec.resolution.x.to_string(),
			spec.resolution.y.to_string(),
			"-r".into(),
			"near".into(),
			"-cutline".into(),
			mask.path.to_string_lossy().into_owned(),
			"-cl".into(),
			mask.layer.clone(),
			"-crop_to_cutline".into(),
			"-wm".into(),
			WARP_MEMORY_MB.to_string(),
			"-multi".into(),
			"-wo".into(),
			"NUM_THREADS=ALL_CPUS".into(),
			"-co".into(),
			"BIGTIFF=IF_SAFER".into(),
		];
		args.extend(nodata_args(nodata));
		args.extend(GTIFF_OPTIONS.iter().map(|s| s.to_string()));
		warp(mosaic, output, &args)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use gdal::{DriverManager, spatial_ref::SpatialRef};
	use rapida_core::Resolution;

	fn write_tile(path: &Path, origin_x: f64, res: f64, size: usize) {
		let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
		let mut dataset = driver.create_with_band_type::<u8, _>(path, size, size, 1).unwrap();
		dataset
			.set_geo_transform(&[origin_x, res, 0.0, 1000.0, 0.0, -res])
			.unwrap();
		dataset.set_spatial_ref(&SpatialRef::from_epsg(3857).unwrap()).unwrap();
	}

	#[test]
	fn describe_and_build_mosaic() {
		let dir = tempfile::tempdir().unwrap();
		let ten = dir.path().join("T1_B02.tif");
		let twenty = dir.path().join("T2_B02.tif");
		write_tile(&ten, 0.0, 10.0, 100);
		write_tile(&twenty, 1000.0, 20.0, 50);

		let backend = GdalMosaicBackend;
		let infos = vec![backend.describe(&ten).unwrap(), backend.describe(&twenty).unwrap()];
		assert_eq!(infos[1].bounds.as_tuple(), (1000.0, 0.0, 2000.0, 1000.0));

		let spec = MosaicSpec::from_rasters("EPSG:3857", &infos).unwrap();
		assert_eq!(spec.resolution, Resolution::new(10.0, 10.0).unwrap());

		let vrt = dir.path().join("B02.vrt");
		backend.build_mosaic(&[ten, twenty], &spec, 0.0, &vrt).unwrap();
		let mosaic = backend.describe(&vrt).unwrap();
		assert_eq!(mosaic.bounds, spec.bounds);
		assert_eq!(mosaic.resolution, spec.resolution);
	}
}
