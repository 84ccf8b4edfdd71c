use anyhow::{Result, ensure};
use serde::Deserialize;
use std::time::Duration;

/// Knobs of the concurrent fetch scheduler, the retry executor and the stall monitor.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct FetchConfig {
	/// Number of assets downloaded concurrently. Chunks run one after another.
	pub chunk_size: usize,

	/// Attempts per asset, stream or window before the error is surfaced.
	pub max_tries: u32,

	/// Pause between two attempts, in seconds.
	pub retry_backoff_secs: u64,

	/// Double the pause after every failed attempt.
	pub exponential_backoff: bool,

	/// A stream without progress for this long is aborted, in seconds.
	pub stall_timeout_secs: u64,

	/// Features per batch when streaming vector sources.
	pub batch_size: usize,

	/// Raster windows read concurrently.
	pub window_concurrency: usize,
}

impl Default for FetchConfig {
	fn default() -> Self {
		Self {
			chunk_size: 5,
			max_tries: 3,
			retry_backoff_secs: 1,
			exponential_backoff: false,
			stall_timeout_secs: 1800,
			batch_size: 5000,
			window_concurrency: num_cpus::get().max(1),
		}
	}
}

impl FetchConfig {
	pub fn retry_backoff(&self) -> Duration {
		Duration::from_secs(self.retry_backoff_secs)
	}

	pub fn stall_timeout(&self) -> Duration {
		Duration::from_secs(self.stall_timeout_secs)
	}

	pub fn validate(&self) -> Result<()> {
		ensure!(self.chunk_size > 0, "fetch.chunk_size must be > 0");
		ensure!(self.max_tries > 0, "fetch.max_tries must be > 0");
		ensure!(self.stall_timeout_secs > 0, "fetch.stall_timeout_secs must be > 0");
		ensure!(self.batch_size > 0, "fetch.batch_size must be > 0");
		ensure!(self.window_concurrency > 0, "fetch.window_concurrency must be > 0");
		Ok(())
	}
}
