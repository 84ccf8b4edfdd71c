use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgressId(pub u32);

/// Snapshot of one progress task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressState {
	pub id: ProgressId,
	pub description: String,
	pub position: u64,
	pub total: Option<u64>,
}

impl ProgressState {
	pub fn new(id: ProgressId, description: &str, total: Option<u64>) -> Self {
		Self {
			id,
			description: description.to_string(),
			position: 0,
			total,
		}
	}

	/// Applies an update. Explicit `completed` wins over `advance`; a known
	/// total clamps the position.
	pub fn apply(&mut self, update: ProgressUpdate) {
		if let Some(description) = update.description {
			self.description = description;
		}
		if let Some(total) = update.total {
			self.total = Some(total);
		}
		if let Some(completed) = update.completed {
			self.position = completed;
		} else if let Some(advance) = update.advance {
			self.position = self.position.saturating_add(advance);
		}
		if let Some(total) = self.total {
			self.position = self.position.min(total);
		}
	}
}

/// A partial change of a progress task. All fields are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
	pub advance: Option<u64>,
	pub completed: Option<u64>,
	pub description: Option<String>,
	pub total: Option<u64>,
}

impl ProgressUpdate {
	pub fn advance(delta: u64) -> Self {
		Self {
			advance: Some(delta),
			..Default::default()
		}
	}

	pub fn completed(position: u64) -> Self {
		Self {
			completed: Some(position),
			..Default::default()
		}
	}

	pub fn description(description: impl Into<String>) -> Self {
		Self {
			description: Some(description.into()),
			..Default::default()
		}
	}

	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn with_total(mut self, total: u64) -> Self {
		self.total = Some(total);
		self
	}
}

/// Receiver of progress updates from concurrent workers.
///
/// Implementations must tolerate unknown ids: a task may be removed while a
/// late update for it is still in flight.
pub trait ProgressSink: Send + Sync {
	fn add(&self, description: &str, total: Option<u64>) -> ProgressId;
	fn update(&self, id: ProgressId, update: ProgressUpdate);
	fn remove(&self, id: ProgressId);
}

/// Progress sink that ignores every call.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl NoProgress {
	pub fn shared() -> Arc<dyn ProgressSink> {
		Arc::new(NoProgress)
	}
}

impl ProgressSink for NoProgress {
	fn add(&self, _description: &str, _total: Option<u64>) -> ProgressId {
		ProgressId(0)
	}

	fn update(&self, _id: ProgressId, _update: ProgressUpdate) {}

	fn remove(&self, _id: ProgressId) {}
}
