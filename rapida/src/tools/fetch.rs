use anyhow::{Result, bail, ensure};
use clap::Args;
use rapida_core::{CancelSignal, ProgressSink, RunConfig, TerminalProgress};
use rapida_fetch::{FetchScheduler, MosaicBackend, MosaicStage, RunSummary, http::HttpAssetFetcher, http::Reprojector};
use std::{path::PathBuf, sync::Arc};

#[derive(Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// YAML run file
	#[arg(required = true)]
	config: PathBuf,

	/// directory for downloads and results, replaces project.output_dir
	#[arg(long, short)]
	output: Option<PathBuf>,

	/// stop after downloading, do not build the per-band mosaics
	#[arg(long)]
	download_only: bool,

	/// do not draw progress bars
	#[arg(long)]
	no_progress: bool,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let config = super::load_config(&arguments.config, arguments.output.as_ref())?;
	let cancel = CancelSignal::new();
	cancel_on_ctrl_c(cancel.clone());
	let progress: Arc<dyn ProgressSink> = Arc::new(TerminalProgress::new(!arguments.no_progress));

	let tasks = super::plan_tasks(&config).await?;
	let fetcher = HttpAssetFetcher::from_config(reprojector(&config), &config.fetch)?;
	let scheduler = FetchScheduler::from_config(Arc::new(fetcher), &config.fetch).with_progress(progress.clone());
	let (registry, outcomes) = scheduler.run(tasks, &cancel).await;
	let summary = RunSummary::new(outcomes);

	if cancel.is_cancelled() {
		eprint!("{summary}");
		bail!("run cancelled, downloads are kept in {:?}", config.project.output_dir);
	}
	if arguments.download_only {
		print!("{summary}");
		return Ok(());
	}

	let stage = MosaicStage::from_config(mosaic_backend(&config)?, &config.project);
	let bands = stage.run(&registry, progress.as_ref()).await?;
	let summary = summary.with_bands(bands, config.catalog.assets.values().map(String::as_str));
	print!("{summary}");
	ensure!(summary.written() > 0, "no band could be written");
	Ok(())
}

fn cancel_on_ctrl_c(cancel: CancelSignal) {
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			log::warn!("interrupted, cancelling running downloads");
			cancel.cancel();
		}
	});
}

#[cfg(feature = "gdal")]
fn reprojector(config: &RunConfig) -> Arc<dyn Reprojector> {
	let mut reprojector = rapida_fetch::gdal::GdalReprojector::new();
	if config.catalog.harmonize_baseline {
		reprojector = reprojector.with_baseline_offset(time::macros::date!(2022 - 01 - 25), 1000.0);
	}
	Arc::new(reprojector)
}

#[cfg(not(feature = "gdal"))]
fn reprojector(config: &RunConfig) -> Arc<dyn Reprojector> {
	log::warn!("built without gdal, downloads stay in their source projection");
	if config.catalog.harmonize_baseline {
		log::warn!("catalog.harmonize_baseline is ignored without gdal");
	}
	Arc::new(rapida_fetch::http::RenameReprojector)
}

#[cfg(feature = "gdal")]
fn mosaic_backend(_config: &RunConfig) -> Result<Arc<dyn MosaicBackend>> {
	Ok(Arc::new(rapida_fetch::gdal::GdalMosaicBackend))
}

#[cfg(not(feature = "gdal"))]
fn mosaic_backend(config: &RunConfig) -> Result<Arc<dyn MosaicBackend>> {
	bail!(
		"mosaicking needs the gdal feature, downloads are kept in {:?}; rerun with --download-only to skip this step",
		config.project.output_dir
	)
}
