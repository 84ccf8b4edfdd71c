use super::{CropMask, MosaicBackend, MosaicSpec, RasterInfo};
use crate::AssetRegistry;
use anyhow::{Context, Result};
use rapida_core::{ProgressSink, ProgressUpdate, ProjectConfig, Resolution};
use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

/// No-data value used when the catalog did not report one.
const DEFAULT_NODATA: f64 = 0.0;

const STALE_EXTENSIONS: [&str; 3] = ["tif", "vrt", "xml"];

#[derive(Clone, Debug, PartialEq)]
pub enum BandStatus {
	Written(PathBuf),
	Failed(String),
	/// No tile delivered a file for the band.
	Skipped,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BandOutcome {
	pub band: String,
	pub status: BandStatus,
}

/// Turns the registry into one cropped raster per band, `<output_dir>/<band>.tif`.
pub struct MosaicStage {
	backend: Arc<dyn MosaicBackend>,
	output_dir: PathBuf,
	target_srs: String,
	mask: CropMask,
}

impl MosaicStage {
	pub fn new(backend: Arc<dyn MosaicBackend>, output_dir: &Path, target_srs: &str, mask: CropMask) -> Self {
		Self {
			backend,
			output_dir: output_dir.to_path_buf(),
			target_srs: target_srs.to_string(),
			mask,
		}
	}

	pub fn from_config(backend: Arc<dyn MosaicBackend>, config: &ProjectConfig) -> Self {
		let mask = CropMask {
			path: config.boundary.clone(),
			layer: config.layer.clone(),
		};
		Self::new(backend, &config.output_dir, &config.target_srs, mask)
	}

	pub fn output_path(&self, band: &str) -> PathBuf {
		self.output_dir.join(format!("{band}.tif"))
	}

	/// Mosaics every band of `registry`.
	///
	/// Stale outputs in the output directory are removed first. All bands share
	/// the finest resolution found among every downloaded file, so the outputs
	/// line up pixel for pixel; extents stay per band. A failing band is reported
	/// and does not stop the others. Only a failure to prepare the output
	/// directory is returned as error.
	pub async fn run(&self, registry: &AssetRegistry, progress: &dyn ProgressSink) -> Result<Vec<BandOutcome>> {
		let removed = self.clear_stale()?;
		log::debug!("removed {removed} stale files from {:?}", self.output_dir);

		let id = progress.add("Postprocessing downloaded data", Some(registry.len() as u64));
		let mut described = self.describe_all(registry).await?;
		let resolution = Resolution::finest_of(described.values().flatten().flatten().map(|info| info.resolution));
		if let Some(resolution) = resolution {
			log::debug!("mosaicking all bands at {resolution}");
		}

		let mut outcomes = Vec::with_capacity(registry.len());
		for (band, files) in registry.iter() {
			progress.update(id, ProgressUpdate::description(format!("Creating mosaic of {band}")));
			let nodata = registry.nodata(band).unwrap_or(DEFAULT_NODATA);
			let infos = described.remove(band).context("band was not described")?;
			let spec = infos.and_then(|infos| {
				let spec = MosaicSpec::from_rasters(&self.target_srs, &infos)?;
				Ok(match resolution {
					Some(resolution) => spec.with_resolution(resolution),
					None => spec,
				})
			});
			let result = match spec {
				Ok(spec) => self.mosaic_band(band, files.to_vec(), spec, nodata).await,
				Err(err) => Err(err),
			};
			let status = match result {
				Ok(path) => {
					log::info!("wrote {band} to {path:?}");
					BandStatus::Written(path)
				}
				Err(err) => {
					log::error!("Failed to mosaic {band}: {err:#}");
					BandStatus::Failed(format!("{err:#}"))
				}
			};
			outcomes.push(BandOutcome {
				band: band.to_string(),
				status,
			});
			progress.update(id, ProgressUpdate::advance(1).with_description(format!("Processed {band}")));
		}
		progress.remove(id);
		Ok(outcomes)
	}

	/// Deletes rasters, mosaics and sidecars directly in the output directory.
	/// Per-tile subdirectories are left alone.
	fn clear_stale(&self) -> Result<usize> {
		fs::create_dir_all(&self.output_dir)
			.with_context(|| format!("Failed to create output directory {:?}", self.output_dir))?;
		let mut removed = 0;
		for entry in fs::read_dir(&self.output_dir)? {
			let path = entry?.path();
			let stale = path
				.extension()
				.and_then(|e| e.to_str())
				.is_some_and(|e| STALE_EXTENSIONS.contains(&e));
			if stale && path.is_file() {
				fs::remove_file(&path).with_context(|| format!("Failed to remove {path:?}"))?;
				removed += 1;
			}
		}
		Ok(removed)
	}

	/// Extent and pixel size of every file, per band in registry order.
	async fn describe_all(&self, registry: &AssetRegistry) -> Result<BTreeMap<String, Result<Vec<RasterInfo>>>> {
		let backend = Arc::clone(&self.backend);
		let bands: Vec<(String, Vec<PathBuf>)> = registry
			.iter()
			.map(|(band, files)| (band.to_string(), files.to_vec()))
			.collect();
		tokio::task::spawn_blocking(move || {
			bands
				.into_iter()
				.map(|(band, files)| {
					let infos = files
						.iter()
						.map(|file| backend.describe(file).with_context(|| format!("Failed to read {file:?}")))
						.collect::<Result<Vec<_>>>();
					(band, infos)
				})
				.collect()
		})
		.await
		.context("describe task panicked")
	}

	async fn mosaic_band(&self, band: &str, files: Vec<PathBuf>, spec: MosaicSpec, nodata: f64) -> Result<PathBuf> {
		let backend = Arc::clone(&self.backend);
		let mosaic = self.output_dir.join(format!("{band}.vrt"));
		let output = self.output_path(band);
		let mask = self.mask.clone();

		tokio::task::spawn_blocking(move || {
			let result = build_band(backend.as_ref(), &files, &spec, &mask, nodata, &mosaic, &output);
			remove_if_exists(&mosaic);
			if result.is_err() {
				remove_if_exists(&output);
			}
			result.map(|()| output)
		})
		.await
		.with_context(|| format!("mosaic task of {band} panicked"))?
	}
}

fn build_band(
	backend: &dyn MosaicBackend,
	files: &[PathBuf],
	spec: &MosaicSpec,
	mask: &CropMask,
	nodata: f64,
	mosaic: &Path,
	output: &Path,
) -> Result<()> {
	log::debug!(
		"mosaic of {} files at {} over {:?}",
		files.len(),
		spec.resolution,
		spec.bounds
	);
	backend
		.build_mosaic(files, spec, nodata, mosaic)
		.with_context(|| format!("Failed to build mosaic {mosaic:?}"))?;
	backend
		.crop(mosaic, spec, mask, nodata, output)
		.with_context(|| format!("Failed to crop {mosaic:?} to {:?}", mask.path))?;
	Ok(())
}

fn remove_if_exists(path: &Path) {
	if path.exists()
		&& let Err(err) = fs::remove_file(path)
	{
		log::warn!("Failed to remove {path:?}: {err}");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		discover,
		discovery::tests::{StaticCatalog, item, query},
		scheduler::tests::{FakeFetcher, scheduler},
	};
	use anyhow::bail;
	use pretty_assertions::assert_eq;
	use rapida_core::{CancelSignal, GeoBBox, MemoryProgress, NoProgress};
	use std::collections::BTreeSet;
	use time::macros::datetime;

	/// Writes plain text "rasters" describing what would have been produced.
	#[derive(Default)]
	struct TextBackend {
		infos: BTreeMap<PathBuf, RasterInfo>,
		failing_crops: BTreeSet<String>,
	}

	impl MosaicBackend for TextBackend {
		fn describe(&self, path: &Path) -> Result<RasterInfo> {
			self.infos.get(path).copied().context("not a raster")
		}

		fn build_mosaic(&self, files: &[PathBuf], spec: &MosaicSpec, nodata: f64, mosaic: &Path) -> Result<()> {
			let names: Vec<_> = files.iter().map(|f| f.display().to_string()).collect();
			let text = format!("{} {:?} {} nodata={nodata}", names.join(","), spec.bounds, spec.resolution);
			fs::write(mosaic, text)?;
			Ok(())
		}

		fn crop(&self, mosaic: &Path, spec: &MosaicSpec, mask: &CropMask, _nodata: f64, output: &Path) -> Result<()> {
			fs::write(output, "partial")?;
			let band = output.file_stem().unwrap().to_string_lossy().to_string();
			if self.failing_crops.contains(&band) {
				bail!("cutline does not intersect");
			}
			let text = fs::read_to_string(mosaic)?;
			fs::write(output, format!("{text} {} {}", spec.target_srs, mask.layer))?;
			Ok(())
		}
	}

	fn tile(x: f64, res: f64) -> RasterInfo {
		RasterInfo {
			bounds: GeoBBox::new(x, 0.0, x + 1000.0, 1000.0).unwrap(),
			resolution: Resolution::new(res, res).unwrap(),
		}
	}

	fn setup(dir: &Path, failing: &[&str]) -> (MosaicStage, AssetRegistry) {
		let mut backend = TextBackend {
			failing_crops: failing.iter().map(|s| s.to_string()).collect(),
			..TextBackend::default()
		};
		let mut registry = AssetRegistry::new();
		for (tile_id, x) in [("T1", 0.0), ("T2", 1000.0)] {
			fs::create_dir_all(dir.join(tile_id)).unwrap();
			for (band, res) in [("B02", 10.0), ("B03", 20.0)] {
				let path = dir.join(tile_id).join(format!("{band}.tif"));
				fs::write(&path, "tile").unwrap();
				backend.infos.insert(path.clone(), tile(x, res));
				registry.add(band, &path, Some(0.0));
			}
		}
		let mask = CropMask {
			path: dir.join("project.gpkg"),
			layer: "polygons".into(),
		};
		(MosaicStage::new(Arc::new(backend), dir, "EPSG:3857", mask), registry)
	}

	#[tokio::test]
	async fn writes_one_raster_per_band_and_removes_mosaics() {
		let dir = tempfile::tempdir().unwrap();
		let (stage, registry) = setup(dir.path(), &[]);
		let progress = MemoryProgress::default();

		let outcomes = stage.run(&registry, &progress).await.unwrap();

		assert_eq!(
			outcomes,
			vec![
				BandOutcome {
					band: "B02".into(),
					status: BandStatus::Written(dir.path().join("B02.tif")),
				},
				BandOutcome {
					band: "B03".into(),
					status: BandStatus::Written(dir.path().join("B03.tif")),
				},
			]
		);
		let b02 = fs::read_to_string(dir.path().join("B02.tif")).unwrap();
		assert!(b02.contains("GeoBBox(0, 0, 2000, 1000) 10x10"), "{b02}");
		assert!(!dir.path().join("B02.vrt").exists());
		assert!(!dir.path().join("B03.vrt").exists());
		assert!(progress.active().is_empty());
	}

	#[tokio::test]
	async fn coarse_bands_use_the_finest_resolution_of_the_run() {
		let dir = tempfile::tempdir().unwrap();
		let (stage, registry) = setup(dir.path(), &[]);

		stage.run(&registry, &NoProgress).await.unwrap();

		let b03 = fs::read_to_string(dir.path().join("B03.tif")).unwrap();
		assert!(b03.contains("GeoBBox(0, 0, 2000, 1000) 10x10"), "{b03}");
		assert!(!b03.contains("20x20"), "{b03}");
	}

	#[tokio::test]
	async fn undescribable_band_fails_alone() {
		let dir = tempfile::tempdir().unwrap();
		let (stage, mut registry) = setup(dir.path(), &[]);
		let broken = dir.path().join("T1").join("B04.tif");
		fs::write(&broken, "not a raster").unwrap();
		registry.add("B04", &broken, None);

		let outcomes = stage.run(&registry, &NoProgress).await.unwrap();

		let failed: Vec<_> = outcomes
			.iter()
			.filter(|o| matches!(o.status, BandStatus::Failed(_)))
			.map(|o| o.band.as_str())
			.collect();
		assert_eq!(failed, vec!["B04"]);
		assert!(dir.path().join("B03.tif").exists());
		assert!(!dir.path().join("B04.tif").exists());
	}

	#[tokio::test(start_paused = true)]
	async fn bands_that_failed_to_download_get_no_output() {
		let dir = tempfile::tempdir().unwrap();
		let catalog = StaticCatalog(vec![
			item("a", Some("T1"), datetime!(2024-05-01 10:00 UTC), &[("B02", None), ("B03", None), ("B04", None)]),
			item("b", Some("T2"), datetime!(2024-05-03 10:00 UTC), &[("B02", None), ("B03", None), ("B04", None)]),
		]);
		let tasks = discover(
			&catalog,
			&query(&[("B02", "B02"), ("B03", "B03"), ("B04", "B04")]),
			dir.path(),
			"EPSG:3857",
		)
		.await
		.unwrap();
		let mut backend = TextBackend::default();
		for task in &tasks {
			let x = if task.tile_id == "T1" { 0.0 } else { 1000.0 };
			backend.infos.insert(task.output_path(), tile(x, 10.0));
		}

		let fetcher = Arc::new(FakeFetcher::failing(&["B04"]));
		let (registry, _) = scheduler(&fetcher, 5).run(tasks, &CancelSignal::new()).await;
		let mask = CropMask {
			path: dir.path().join("project.gpkg"),
			layer: "polygons".into(),
		};
		let stage = MosaicStage::new(Arc::new(backend), dir.path(), "EPSG:3857", mask);
		let outcomes = stage.run(&registry, &NoProgress).await.unwrap();

		let written: Vec<&str> = outcomes
			.iter()
			.filter(|o| matches!(o.status, BandStatus::Written(_)))
			.map(|o| o.band.as_str())
			.collect();
		assert_eq!(written, vec!["B02", "B03"]);
		assert!(dir.path().join("B02.tif").exists());
		assert!(dir.path().join("B03.tif").exists());
		assert!(!dir.path().join("B04.tif").exists());
	}

	#[tokio::test]
	async fn rerun_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let (stage, registry) = setup(dir.path(), &[]);

		stage.run(&registry, &NoProgress).await.unwrap();
		let first = fs::read(dir.path().join("B03.tif")).unwrap();
		stage.run(&registry, &NoProgress).await.unwrap();
		let second = fs::read(dir.path().join("B03.tif")).unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn stale_files_are_removed_but_tiles_kept() {
		let dir = tempfile::tempdir().unwrap();
		let (stage, registry) = setup(dir.path(), &[]);
		for name in ["B04.tif", "B04.vrt", "B02.tif.aux.xml"] {
			fs::write(dir.path().join(name), "stale").unwrap();
		}
		fs::write(dir.path().join("notes.txt"), "keep").unwrap();

		stage.run(&registry, &NoProgress).await.unwrap();

		assert!(!dir.path().join("B04.tif").exists());
		assert!(!dir.path().join("B04.vrt").exists());
		assert!(!dir.path().join("B02.tif.aux.xml").exists());
		assert!(dir.path().join("notes.txt").exists());
		assert!(dir.path().join("T1").join("B02.tif").exists());
	}

	#[tokio::test]
	async fn failing_band_leaves_no_intermediates() {
		let dir = tempfile::tempdir().unwrap();
		let (stage, registry) = setup(dir.path(), &["B03"]);

		let outcomes = stage.run(&registry, &NoProgress).await.unwrap();

		assert_eq!(outcomes[0].status, BandStatus::Written(dir.path().join("B02.tif")));
		match &outcomes[1].status {
			BandStatus::Failed(reason) => assert!(reason.contains("cutline does not intersect"), "{reason}"),
			other => panic!("unexpected {other:?}"),
		}
		assert!(!dir.path().join("B03.tif").exists());
		assert!(!dir.path().join("B03.vrt").exists());
	}

	#[tokio::test]
	async fn empty_registry_writes_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let (stage, _) = setup(dir.path(), &[]);
		let outcomes = stage.run(&AssetRegistry::new(), &NoProgress).await.unwrap();
		assert!(outcomes.is_empty());
	}
}
