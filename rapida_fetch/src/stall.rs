use rapida_core::PipelineError;
use std::time::Duration;
use tokio::time::Instant;

/// Detects a stream that stopped making progress.
///
/// The monitor is fed a monotonically increasing counter (rows, bytes). Every
/// time the counter grows, the deadline is pushed back.
#[derive(Debug)]
pub struct StallMonitor {
	name: String,
	deadline: Duration,
	last_count: u64,
	last_progress: Instant,
}

impl StallMonitor {
	pub fn new(name: &str, deadline: Duration) -> Self {
		Self {
			name: name.to_string(),
			deadline,
			last_count: 0,
			last_progress: Instant::now(),
		}
	}

	pub fn observe(&mut self, count: u64) {
		if count > self.last_count {
			self.last_count = count;
			self.last_progress = Instant::now();
		}
	}

	pub fn idle(&self) -> Duration {
		self.last_progress.elapsed()
	}

	/// Time left before the stream counts as stalled.
	pub fn remaining(&self) -> Duration {
		self.deadline.saturating_sub(self.idle())
	}

	pub fn check(&self) -> Result<(), PipelineError> {
		let idle = self.idle();
		if idle >= self.deadline {
			log::warn!("{}: no progress for {idle:?}", self.name);
			return Err(self.stalled());
		}
		Ok(())
	}

	pub fn stalled(&self) -> PipelineError {
		PipelineError::Stalled {
			name: self.name.clone(),
			idle: self.idle(),
		}
	}

	/// Waits for `future`, but no longer than the time left before the deadline.
	pub async fn guard<F: Future>(&self, future: F) -> Result<F::Output, PipelineError> {
		match tokio::time::timeout(self.remaining(), future).await {
			Ok(output) => Ok(output),
			Err(_) => Err(self.stalled()),
		}
	}
}
