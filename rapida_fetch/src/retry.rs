//! Bounded retry with backoff, shared by every remote read of the pipeline.
//!
//! Errors are classified through [`PipelineError::is_terminal`]: only transient
//! source failures are attempted again. Cancellation is checked before every
//! attempt and interrupts the backoff pause.

use rapida_core::{CancelSignal, FetchConfig, PipelineError};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
	pub max_tries: u32,
	pub backoff: Duration,
	pub exponential: bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_tries: 3,
			backoff: Duration::from_secs(1),
			exponential: false,
		}
	}
}

impl RetryPolicy {
	pub fn new(max_tries: u32, backoff: Duration) -> Self {
		Self {
			max_tries,
			backoff,
			exponential: false,
		}
	}

	pub fn from_config(config: &FetchConfig) -> Self {
		Self {
			max_tries: config.max_tries,
			backoff: config.retry_backoff(),
			exponential: config.exponential_backoff,
		}
	}

	#[must_use]
	pub fn exponential(mut self) -> Self {
		self.exponential = true;
		self
	}

	/// Pause after the failed `attempt` (1-based).
	pub fn delay(&self, attempt: u32) -> Duration {
		if self.exponential {
			let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
			self.backoff.saturating_mul(factor)
		} else {
			self.backoff
		}
	}
}

/// Runs `op` until it succeeds, fails terminally or the attempts are used up.
///
/// `op` receives the 1-based attempt number. When `cancel` is already set no
/// attempt is started and [`PipelineError::Cancelled`] is returned.
pub async fn retry<T, F, Fut>(
	policy: &RetryPolicy,
	cancel: &CancelSignal,
	name: &str,
	mut op: F,
) -> Result<T, PipelineError>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, PipelineError>>,
{
	let max_tries = policy.max_tries.max(1);
	let mut attempt = 0;
	loop {
		if cancel.is_cancelled() {
			return Err(PipelineError::cancelled(name));
		}
		attempt += 1;
		log::trace!("{name}: attempt {attempt}/{max_tries}");

		let err = match op(attempt).await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		if err.is_terminal() {
			return Err(err);
		}
		if attempt >= max_tries {
			log::debug!("{name}: giving up after {attempt} attempts: {err}");
			return Err(err);
		}

		let delay = policy.delay(attempt);
		log::info!("{name}: attempt {attempt}/{max_tries} failed: {err}. Retrying in {delay:?}");
		tokio::select! {
			() = tokio::time::sleep(delay) => {}
			() = cancel.cancelled() => return Err(PipelineError::cancelled(name)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::anyhow;
	use pretty_assertions::assert_eq;
	use rstest::rstest;
	use std::sync::atomic::{AtomicU32, Ordering};
	use tokio::time::Instant;

	fn failing_until(success_at: u32, calls: &AtomicU32) -> impl FnMut(u32) -> std::future::Ready<Result<u32, PipelineError>> {
		move |attempt| {
			calls.fetch_add(1, Ordering::SeqCst);
			std::future::ready(if attempt >= success_at {
				Ok(attempt)
			} else {
				Err(anyhow!("timeout on attempt {attempt}").into())
			})
		}
	}

	#[tokio::test(start_paused = true)]
	async fn succeeds_after_two_failures() {
		let calls = AtomicU32::new(0);
		let start = Instant::now();
		let result = retry(&RetryPolicy::default(), &CancelSignal::new(), "op", failing_until(3, &calls)).await;
		assert_eq!(result.unwrap(), 3);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		assert_eq!(start.elapsed(), Duration::from_secs(2));
	}

	#[rstest]
	#[case(1)]
	#[case(3)]
	#[case(5)]
	#[tokio::test(start_paused = true)]
	async fn always_failing_uses_exactly_max_tries(#[case] max_tries: u32) {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy::new(max_tries, Duration::from_millis(100));
		let err = retry(&policy, &CancelSignal::new(), "op", failing_until(u32::MAX, &calls))
			.await
			.unwrap_err();
		assert_eq!(calls.load(Ordering::SeqCst), max_tries);
		assert!(err.to_string().contains(&format!("attempt {max_tries}")), "{err}");
	}

	#[tokio::test(start_paused = true)]
	async fn exponential_backoff_doubles() {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy::new(4, Duration::from_secs(1)).exponential();
		let start = Instant::now();
		retry(&policy, &CancelSignal::new(), "op", failing_until(4, &calls))
			.await
			.unwrap();
		assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4));
	}

	#[tokio::test]
	async fn cancelled_before_start_makes_no_attempt() {
		let calls = AtomicU32::new(0);
		let cancel = CancelSignal::new();
		cancel.cancel();
		let err = retry(&RetryPolicy::default(), &cancel, "op", failing_until(1, &calls))
			.await
			.unwrap_err();
		assert!(err.is_cancelled());
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn terminal_errors_are_not_retried() {
		let calls = AtomicU32::new(0);
		let err = retry(&RetryPolicy::default(), &CancelSignal::new(), "op", |_| {
			calls.fetch_add(1, Ordering::SeqCst);
			async {
				Err::<(), _>(PipelineError::Stalled {
					name: "op".into(),
					idle: Duration::from_secs(1800),
				})
			}
		})
		.await
		.unwrap_err();
		assert!(err.is_stalled());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_interrupts_backoff() {
		let calls = AtomicU32::new(0);
		let cancel = CancelSignal::new();
		{
			let cancel = cancel.clone();
			tokio::spawn(async move {
				tokio::time::sleep(Duration::from_millis(500)).await;
				cancel.cancel();
			});
		}
		let start = Instant::now();
		let policy = RetryPolicy::new(3, Duration::from_secs(60));
		let err = retry(&policy, &cancel, "op", failing_until(u32::MAX, &calls))
			.await
			.unwrap_err();
		assert!(err.is_cancelled());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(start.elapsed() < Duration::from_secs(60));
	}

	#[rstest]
	#[case(false, 1, 2)]
	#[case(false, 3, 2)]
	#[case(true, 1, 2)]
	#[case(true, 3, 8)]
	fn delays(#[case] exponential: bool, #[case] attempt: u32, #[case] secs: u64) {
		let policy = RetryPolicy {
			max_tries: 3,
			backoff: Duration::from_secs(2),
			exponential,
		};
		assert_eq!(policy.delay(attempt), Duration::from_secs(secs));
	}
}
