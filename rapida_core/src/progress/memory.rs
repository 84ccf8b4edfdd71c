use super::{ProgressId, ProgressSink, ProgressState, ProgressUpdate};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Keeps progress state in memory, for embedding and for tests.
#[derive(Debug, Default)]
pub struct MemoryProgress {
	inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
	next_id: u32,
	active: BTreeMap<ProgressId, ProgressState>,
	added: usize,
	removed: usize,
}

impl MemoryProgress {
	pub fn new() -> Self {
		Self::default()
	}

	/// States of all tasks that were added and not yet removed.
	pub fn active(&self) -> Vec<ProgressState> {
		self.inner.lock().active.values().cloned().collect()
	}

	pub fn get(&self, id: ProgressId) -> Option<ProgressState> {
		self.inner.lock().active.get(&id).cloned()
	}

	/// Total number of tasks ever added.
	pub fn added(&self) -> usize {
		self.inner.lock().added
	}

	pub fn removed(&self) -> usize {
		self.inner.lock().removed
	}
}

impl ProgressSink for MemoryProgress {
	fn add(&self, description: &str, total: Option<u64>) -> ProgressId {
		let mut inner = self.inner.lock();
		inner.next_id = inner.next_id.wrapping_add(1);
		let id = ProgressId(inner.next_id);
		inner.active.insert(id, ProgressState::new(id, description, total));
		inner.added += 1;
		id
	}

	fn update(&self, id: ProgressId, update: ProgressUpdate) {
		if let Some(state) = self.inner.lock().active.get_mut(&id) {
			state.apply(update);
		}
	}

	fn remove(&self, id: ProgressId) {
		let mut inner = self.inner.lock();
		if inner.active.remove(&id).is_some() {
			inner.removed += 1;
		}
	}
}
