//! Chunked concurrent download of the assets selected by discovery.
//!
//! Tasks are split into chunks of `chunk_size`. The tasks of one chunk run
//! concurrently, each wrapped in the retry executor; the next chunk starts once
//! every task of the current one is terminal. Results are merged into the
//! [`AssetRegistry`] by the scheduler alone, one at a time.
//!
//! When the cancellation signal is raised the running tasks are aborted and
//! drained, and no further chunk is started.

use crate::{AssetFetcher, AssetRegistry, RetryPolicy, retry};
use rapida_core::{CancelSignal, FetchConfig, NoProgress, PipelineError, ProgressSink, ProgressUpdate};
use std::{
	collections::HashMap,
	ffi::OsString,
	fmt,
	path::{Path, PathBuf},
	sync::Arc,
};
use tokio::task::{Id, JoinSet};

/// One asset of one tile to be downloaded and reprojected.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchTask {
	pub tile_id: String,
	pub asset_key: String,
	pub band: String,
	pub url: String,
	/// Local path without extension.
	pub target: PathBuf,
	pub nodata: Option<f64>,
	pub target_srs: String,
}

impl FetchTask {
	pub fn name(&self) -> String {
		format!("{}:{}", self.tile_id, self.band)
	}

	/// Where the finished download is stored: `<target>.tif`.
	pub fn output_path(&self) -> PathBuf {
		with_suffix(&self.target, ".tif")
	}
}

impl fmt::Display for FetchTask {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.tile_id, self.band)
	}
}

/// Appends `suffix` to the file name, keeping any existing extension.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
	let mut name = OsString::from(path.as_os_str());
	name.push(suffix);
	PathBuf::from(name)
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskStatus {
	Fetched(PathBuf),
	Failed(String),
	Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchOutcome {
	pub task: String,
	pub band: String,
	pub status: TaskStatus,
}

impl FetchOutcome {
	fn new(task: &FetchTask, status: TaskStatus) -> Self {
		Self {
			task: task.name(),
			band: task.band.clone(),
			status,
		}
	}
}

pub struct FetchScheduler {
	fetcher: Arc<dyn AssetFetcher>,
	policy: RetryPolicy,
	chunk_size: usize,
	progress: Arc<dyn ProgressSink>,
}

impl FetchScheduler {
	pub fn new(fetcher: Arc<dyn AssetFetcher>, policy: RetryPolicy, chunk_size: usize) -> Self {
		Self {
			fetcher,
			policy,
			chunk_size: chunk_size.max(1),
			progress: NoProgress::shared(),
		}
	}

	pub fn from_config(fetcher: Arc<dyn AssetFetcher>, config: &FetchConfig) -> Self {
		Self::new(fetcher, RetryPolicy::from_config(config), config.chunk_size)
	}

	#[must_use]
	pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
		self.progress = progress;
		self
	}

	/// Downloads every task and returns the registry of fetched files plus one outcome per task.
	///
	/// Failed and cancelled tasks do not end the run; they are reported in the outcomes.
	pub async fn run(&self, tasks: Vec<FetchTask>, cancel: &CancelSignal) -> (AssetRegistry, Vec<FetchOutcome>) {
		let mut registry = AssetRegistry::new();
		let mut outcomes = Vec::with_capacity(tasks.len());
		let progress_id = self
			.progress
			.add(&format!("Downloading {} assets", tasks.len()), Some(tasks.len() as u64));

		let chunk_count = tasks.len().div_ceil(self.chunk_size);
		for (index, chunk) in tasks.chunks(self.chunk_size).enumerate() {
			if cancel.is_cancelled() {
				for task in chunk {
					outcomes.push(FetchOutcome::new(task, TaskStatus::Cancelled));
				}
				continue;
			}
			log::debug!("starting chunk {}/{chunk_count} with {} tasks", index + 1, chunk.len());
			for (task, outcome) in self.run_chunk(chunk, cancel).await {
				if let TaskStatus::Fetched(path) = &outcome.status {
					registry.add(&task.band, path, task.nodata);
				}
				self.progress.update(progress_id, ProgressUpdate::advance(1));
				outcomes.push(outcome);
			}
		}

		self.progress.remove(progress_id);
		if cancel.is_cancelled() {
			log::warn!("download cancelled");
		}
		log::info!(
			"fetched {} of {} assets",
			outcomes
				.iter()
				.filter(|o| matches!(o.status, TaskStatus::Fetched(_)))
				.count(),
			outcomes.len()
		);
		(registry, outcomes)
	}

	/// Runs one chunk until every task is terminal. Outcomes are returned in completion order.
	async fn run_chunk(&self, chunk: &[FetchTask], cancel: &CancelSignal) -> Vec<(FetchTask, FetchOutcome)> {
		let mut join_set = JoinSet::new();
		let mut running: HashMap<Id, FetchTask> = HashMap::new();

		for task in chunk {
			let fetcher = Arc::clone(&self.fetcher);
			let progress = Arc::clone(&self.progress);
			let policy = self.policy.clone();
			let cancel = cancel.clone();
			let owned = task.clone();
			let handle = join_set.spawn(async move {
				let name = owned.name();
				retry(&policy, &cancel, &name, |_| fetcher.fetch(&owned, &cancel, progress.as_ref())).await
			});
			running.insert(handle.id(), task.clone());
		}

		let mut outcomes = Vec::with_capacity(chunk.len());
		let mut aborted = false;
		loop {
			tokio::select! {
				biased;
				() = cancel.cancelled(), if !aborted => {
					log::warn!("cancelling {} running downloads", join_set.len());
					join_set.abort_all();
					aborted = true;
				}
				joined = join_set.join_next_with_id() => {
					let Some(joined) = joined else { break };
					let (id, status) = match joined {
						Ok((id, Ok(path))) => {
							log::debug!("downloaded {} to {path:?}", running[&id]);
							(id, TaskStatus::Fetched(path))
						}
						Ok((id, Err(err))) => (id, failure_status(&running[&id], &err)),
						Err(err) if err.is_cancelled() => (err.id(), TaskStatus::Cancelled),
						Err(err) => {
							log::error!("download task panicked: {err}");
							(err.id(), TaskStatus::Failed(err.to_string()))
						}
					};
					if let Some(task) = running.remove(&id) {
						if status == TaskStatus::Cancelled {
							log::warn!("cancelled download of {task}");
						}
						let outcome = FetchOutcome::new(&task, status);
						outcomes.push((task, outcome));
					}
				}
			}
		}
		outcomes
	}
}

fn failure_status(task: &FetchTask, err: &PipelineError) -> TaskStatus {
	if err.is_cancelled() {
		return TaskStatus::Cancelled;
	}
	let err = PipelineError::Asset {
		task: task.name(),
		source: anyhow::anyhow!("{err}"),
	};
	log::error!("{err}");
	TaskStatus::Failed(err.to_string())
}
