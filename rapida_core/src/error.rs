use std::time::Duration;
use thiserror::Error;

/// Failure classes of the acquisition pipeline.
///
/// Only [`PipelineError::Source`] is transient and worth another attempt. The
/// remaining variants end the operation that raised them: a stalled stream is not
/// retried, a cancelled one is an aborted (not failed) result, and an empty
/// discovery aborts the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
	/// Network or remote source failure.
	#[error("source error: {0:#}")]
	Source(#[from] anyhow::Error),

	/// No progress within the deadline.
	#[error("no progress in {name} for {idle:?}")]
	Stalled { name: String, idle: Duration },

	/// The cancellation signal was observed.
	#[error("{name} was cancelled")]
	Cancelled { name: String },

	/// The catalog returned no usable items for the requested area and time.
	#[error("no assets found in collection {collection} for the target area")]
	DiscoveryEmpty { collection: String },

	/// One tile/band could not be obtained after all retries.
	#[error("failed to fetch {task}: {source:#}")]
	Asset {
		task: String,
		#[source]
		source: anyhow::Error,
	},
}

impl PipelineError {
	pub fn cancelled(name: impl Into<String>) -> Self {
		PipelineError::Cancelled { name: name.into() }
	}

	/// Terminal errors are returned to the caller right away instead of being retried.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, PipelineError::Source(_))
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, PipelineError::Cancelled { .. })
	}

	pub fn is_stalled(&self) -> bool {
		matches!(self, PipelineError::Stalled { .. })
	}
}
