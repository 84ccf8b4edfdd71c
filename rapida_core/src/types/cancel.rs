use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};
use tokio::sync::Notify;

/// Shared, level-triggered cancellation flag.
///
/// Cloning yields another handle to the same flag. Once [`cancel`](Self::cancel)
/// has been called the flag stays set; calling it again is a no-op. Workers poll
/// [`is_cancelled`](Self::is_cancelled) at batch and task boundaries, while
/// schedulers can `await` [`cancelled`](Self::cancelled).
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
	inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
	flag: AtomicBool,
	notify: Notify,
}

impl CancelSignal {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		if !self.inner.flag.swap(true, Ordering::SeqCst) {
			log::debug!("cancellation requested");
		}
		self.inner.notify.notify_waiters();
	}

	pub fn is_cancelled(&self) -> bool {
		self.inner.flag.load(Ordering::SeqCst)
	}

	/// Resolves once the signal is set. Resolves immediately if it already is.
	pub async fn cancelled(&self) {
		loop {
			let mut notified = std::pin::pin!(self.inner.notify.notified());
			// register before checking the flag, otherwise a cancel in between is lost
			notified.as_mut().enable();
			if self.is_cancelled() {
				return;
			}
			notified.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[test]
	fn cancel_is_idempotent_and_shared() {
		let signal = CancelSignal::new();
		let other = signal.clone();
		assert!(!other.is_cancelled());
		signal.cancel();
		signal.cancel();
		assert!(other.is_cancelled());
	}

	#[tokio::test]
	async fn cancelled_resolves_immediately_when_set() {
		let signal = CancelSignal::new();
		signal.cancel();
		tokio::time::timeout(Duration::from_millis(50), signal.cancelled())
			.await
			.expect("should resolve");
	}

	#[tokio::test]
	async fn cancelled_wakes_waiter() {
		let signal = CancelSignal::new();
		let waiter = {
			let signal = signal.clone();
			tokio::spawn(async move { signal.cancelled().await })
		};
		tokio::task::yield_now().await;
		signal.cancel();
		tokio::time::timeout(Duration::from_secs(1), waiter)
			.await
			.expect("waiter should finish")
			.unwrap();
	}
}
