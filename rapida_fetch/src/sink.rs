use parking_lot::Mutex;
use std::sync::Arc;

/// Append-only collection shared between concurrent producers and one consumer.
///
/// Clones share the same storage. Producers only [`push`](Self::push); the
/// consumer reads with [`snapshot`](Self::snapshot) or drains with [`take`](Self::take)
/// once the producers are done.
#[derive(Debug)]
pub struct ResultSink<T> {
	items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for ResultSink<T> {
	fn clone(&self) -> Self {
		Self {
			items: Arc::clone(&self.items),
		}
	}
}

impl<T> Default for ResultSink<T> {
	fn default() -> Self {
		Self {
			items: Arc::new(Mutex::new(Vec::new())),
		}
	}
}

impl<T> ResultSink<T> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&self, item: T) {
		self.items.lock().push(item);
	}

	pub fn len(&self) -> usize {
		self.items.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.lock().is_empty()
	}

	pub fn take(&self) -> Vec<T> {
		std::mem::take(&mut *self.items.lock())
	}
}

impl<T: Clone> ResultSink<T> {
	pub fn snapshot(&self) -> Vec<T> {
		self.items.lock().clone()
	}
}
