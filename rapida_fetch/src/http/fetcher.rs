use crate::{AssetFetcher, FetchTask, StallMonitor, scheduler::with_suffix};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::StreamExt;
use rapida_core::{CancelSignal, FetchConfig, PipelineError, ProgressId, ProgressSink, ProgressUpdate};
use reqwest::Client;
use std::{
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};
use time::{Date, Month};
use tokio::{fs, io::AsyncWriteExt};

/// Converts a downloaded file into the final raster of a task.
///
/// Runs on the blocking thread pool.
pub trait Reprojector: Send + Sync {
	fn reproject(&self, download: &Path, output: &Path, task: &FetchTask) -> Result<()>;
}

/// Keeps the download as it is.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenameReprojector;

impl Reprojector for RenameReprojector {
	fn reproject(&self, download: &Path, output: &Path, _task: &FetchTask) -> Result<()> {
		std::fs::rename(download, output).with_context(|| format!("Failed to move {download:?} to {output:?}"))
	}
}

/// Downloads assets over HTTP(S) and reprojects them into the task's reference system.
///
/// Existing outputs are reused, so an interrupted run can be resumed.
pub struct HttpAssetFetcher {
	client: Client,
	reprojector: Arc<dyn Reprojector>,
	stall_timeout: Duration,
}

impl HttpAssetFetcher {
	pub fn new(reprojector: Arc<dyn Reprojector>, stall_timeout: Duration) -> Result<HttpAssetFetcher> {
		let client = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.connect_timeout(Duration::from_secs(30))
			.build()?;
		Ok(HttpAssetFetcher {
			client,
			reprojector,
			stall_timeout,
		})
	}

	pub fn from_config(reprojector: Arc<dyn Reprojector>, config: &FetchConfig) -> Result<HttpAssetFetcher> {
		Self::new(reprojector, config.stall_timeout())
	}

	async fn download(
		&self,
		task: &FetchTask,
		tmp: &Path,
		cancel: &CancelSignal,
		progress: &dyn ProgressSink,
	) -> Result<u64, PipelineError> {
		let monitor = StallMonitor::new(&task.name(), self.stall_timeout);
		let response = monitor
			.guard(self.client.get(&task.url).send())
			.await?
			.with_context(|| format!("GET {}", task.url))?;
		let status = response.status();
		if !status.is_success() {
			return Err(anyhow::anyhow!("GET {} returned {status}", task.url).into());
		}

		let id = progress.add(&format!("Downloading {}", task.url), response.content_length());
		let result = self.write_body(task, response, tmp, cancel, progress, id).await;
		progress.remove(id);
		result
	}

	async fn write_body(
		&self,
		task: &FetchTask,
		response: reqwest::Response,
		tmp: &Path,
		cancel: &CancelSignal,
		progress: &dyn ProgressSink,
		id: ProgressId,
	) -> Result<u64, PipelineError> {
		let mut file = fs::File::create(tmp)
			.await
			.with_context(|| format!("Failed to create {tmp:?}"))?;
		let mut monitor = StallMonitor::new(&task.name(), self.stall_timeout);
		let mut stream = response.bytes_stream();
		let mut written = 0u64;

		while let Some(chunk) = monitor.guard(stream.next()).await? {
			if cancel.is_cancelled() {
				return Err(PipelineError::cancelled(task.name()));
			}
			let chunk = chunk.with_context(|| format!("Failed to read body of {}", task.url))?;
			file.write_all(&chunk).await.context("Failed to write download")?;
			written += chunk.len() as u64;
			monitor.observe(written);
			progress.update(id, ProgressUpdate::advance(chunk.len() as u64));
		}
		file.flush().await.context("Failed to flush download")?;
		Ok(written)
	}
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
	async fn fetch(
		&self,
		task: &FetchTask,
		cancel: &CancelSignal,
		progress: &dyn ProgressSink,
	) -> Result<PathBuf, PipelineError> {
		let output = task.output_path();
		if fs::try_exists(&output).await.unwrap_or(false) {
			log::debug!("{output:?} exists, skipping {}", task.url);
			return Ok(output);
		}
		if let Some(dir) = task.target.parent() {
			fs::create_dir_all(dir)
				.await
				.with_context(|| format!("Failed to create {dir:?}"))?;
		}

		let tmp = with_suffix(&task.target, &format!("{}.tmp", url_extension(&task.url)));
		log::debug!("downloading {} to {tmp:?}", task.url);
		let result = self.download(task, &tmp, cancel, progress).await;
		let bytes = match result {
			Ok(bytes) => bytes,
			Err(err) => {
				let _ = fs::remove_file(&tmp).await;
				return Err(err);
			}
		};
		log::debug!("downloaded {bytes} bytes of {}", task.url);

		// the output only appears once reprojection has fully succeeded
		let part = with_suffix(&output, ".part");
		remove_if_exists(&part).await;
		let reprojector = Arc::clone(&self.reprojector);
		let owned = task.clone();
		let (download, target) = (tmp.clone(), part.clone());
		let reprojected = tokio::task::spawn_blocking(move || reprojector.reproject(&download, &target, &owned))
			.await
			.context("reprojection task panicked");
		remove_if_exists(&tmp).await;
		if let Err(err) = reprojected.and_then(|result| result) {
			remove_if_exists(&part).await;
			return Err(err.context(format!("Failed to reproject {}", task.name())).into());
		}
		fs::rename(&part, &output)
			.await
			.with_context(|| format!("Failed to move {part:?} to {output:?}"))?;

		log::debug!("saved {} to {output:?}", task.name());
		Ok(output)
	}
}

async fn remove_if_exists(path: &Path) {
	if fs::try_exists(path).await.unwrap_or(false)
		&& let Err(err) = fs::remove_file(path).await
	{
		log::warn!("Failed to remove {path:?}: {err}");
	}
}

/// `.ext` of the URL path, empty when there is none.
fn url_extension(url: &str) -> String {
	let path = url.split(['?', '#']).next().unwrap_or(url);
	let file = path.rsplit('/').next().unwrap_or(path);
	match file.rsplit_once('.') {
		Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!(".{ext}"),
		_ => String::new(),
	}
}

/// Acquisition date encoded as `/YYYY/M/D/` in an asset URL.
pub fn acquisition_date(url: &str) -> Result<Date> {
	let digits = |s: &str, min: usize, max: usize| (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit());
	let segments: Vec<&str> = url.split('/').collect();
	for window in segments.windows(3) {
		let (year, month, day) = (window[0], window[1], window[2]);
		if digits(year, 4, 4) && digits(month, 1, 2) && digits(day, 1, 2) {
			let month = Month::try_from(month.parse::<u8>()?)?;
			return Ok(Date::from_calendar_date(year.parse()?, month, day.parse()?)?);
		}
	}
	bail!("could not extract an acquisition date from {url}")
}
