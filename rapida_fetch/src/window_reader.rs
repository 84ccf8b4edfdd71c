use crate::{RasterArray, RasterSource, ResultSink, RetryPolicy, StallMonitor, retry};
use anyhow::Context;
use futures::{StreamExt, stream};
use rapida_core::{CancelSignal, FetchConfig, PipelineError, ProgressSink, ProgressUpdate, RasterWindow};
use std::time::Duration;

/// Reads one window of `band` and appends `(window_id, pixels)` to `sink`.
///
/// An attempt that does not finish within `stall_timeout` fails as stalled, and
/// a pending read is dropped as soon as `cancel` is set.
#[allow(clippy::too_many_arguments)]
pub async fn read_window(
	source: &dyn RasterSource,
	band: usize,
	window_id: usize,
	window: RasterWindow,
	cancel: &CancelSignal,
	sink: &ResultSink<(usize, RasterArray)>,
	policy: &RetryPolicy,
	stall_timeout: Duration,
) -> Result<usize, PipelineError> {
	let name = format!("window {window_id} {window:?}");
	let pixels = retry(policy, cancel, &name, |attempt| {
		log::debug!("attempt {attempt} at {name}");
		let name = name.clone();
		async move {
			let monitor = StallMonitor::new(&name, stall_timeout);
			tokio::select! {
				biased;
				() = cancel.cancelled() => Err(PipelineError::cancelled(name)),
				read = monitor.guard(source.read_window(band, window)) => read?
					.with_context(|| format!("Failed to read band {band} {window:?} of {source:?}"))
					.map_err(PipelineError::from),
			}
		}
	})
	.await?;
	sink.push((window_id, pixels));
	Ok(window_id)
}

/// Reads many windows of one band with bounded concurrency.
#[derive(Clone, Debug)]
pub struct WindowReader {
	policy: RetryPolicy,
	concurrency: usize,
	stall_timeout: Duration,
}

impl Default for WindowReader {
	fn default() -> Self {
		Self::from_config(&FetchConfig::default())
	}
}

impl WindowReader {
	pub fn new(policy: RetryPolicy, concurrency: usize) -> Self {
		Self {
			policy,
			concurrency: concurrency.max(1),
			stall_timeout: FetchConfig::default().stall_timeout(),
		}
	}

	pub fn from_config(config: &FetchConfig) -> Self {
		Self::new(RetryPolicy::from_config(config), config.window_concurrency).with_stall_timeout(config.stall_timeout())
	}

	#[must_use]
	pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
		self.stall_timeout = stall_timeout;
		self
	}

	/// Reads every window, ids are the positions in `windows`.
	///
	/// All started reads are awaited before returning. The first failure (other
	/// than cancellation) is returned; when the signal was set the result is
	/// [`PipelineError::Cancelled`] and the sink holds the windows read so far.
	pub async fn read_windows(
		&self,
		source: &dyn RasterSource,
		band: usize,
		windows: Vec<RasterWindow>,
		cancel: &CancelSignal,
		sink: &ResultSink<(usize, RasterArray)>,
		progress: &dyn ProgressSink,
	) -> Result<usize, PipelineError> {
		let id = progress.add(&format!("Reading band {band}"), Some(windows.len() as u64));
		let results: Vec<Result<usize, PipelineError>> = stream::iter(windows.into_iter().enumerate())
			.map(|(window_id, window)| async move {
				let result = read_window(source, band, window_id, window, cancel, sink, &self.policy, self.stall_timeout).await;
				if result.is_ok() {
					progress.update(id, ProgressUpdate::advance(1));
				}
				result
			})
			.buffer_unordered(self.concurrency)
			.collect()
			.await;
		progress.remove(id);

		let mut read = 0;
		let mut cancelled = None;
		for result in results {
			match result {
				Ok(_) => read += 1,
				Err(err) if err.is_cancelled() => cancelled = Some(err),
				Err(err) => return Err(err),
			}
		}
		match cancelled {
			Some(err) => Err(err),
			None => Ok(read),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::{Result, bail};
	use async_trait::async_trait;
	use parking_lot::Mutex;
	use rapida_core::{MemoryProgress, NoProgress};
	use std::{collections::HashMap, time::Duration};

	/// A `width x height` raster whose pixel value is `row * width + col`.
	#[derive(Debug, Default)]
	struct GridSource {
		width: usize,
		failures: Mutex<HashMap<RasterWindow, u32>>,
	}

	impl GridSource {
		fn new(width: usize) -> Self {
			Self {
				width,
				..Default::default()
			}
		}

		fn fail(self, window: RasterWindow, times: u32) -> Self {
			self.failures.lock().insert(window, times);
			self
		}
	}

	#[async_trait]
	impl RasterSource for GridSource {
		async fn read_window(&self, _band: usize, window: RasterWindow) -> Result<RasterArray> {
			if let Some(left) = self.failures.lock().get_mut(&window)
				&& *left > 0
			{
				*left -= 1;
				bail!("read timed out");
			}
			let data = window
				.rows()
				.flat_map(|row| window.cols().map(move |col| (row * self.width + col) as f64))
				.collect();
			RasterArray::new(window.col_size, window.row_size, data)
		}
	}

	const STALL: Duration = Duration::from_secs(1800);

	/// Never answers.
	#[derive(Debug)]
	struct SilentSource;

	#[async_trait]
	impl RasterSource for SilentSource {
		async fn read_window(&self, _band: usize, _window: RasterWindow) -> Result<RasterArray> {
			std::future::pending().await
		}
	}

	fn policy() -> RetryPolicy {
		RetryPolicy::new(3, Duration::from_millis(10))
	}

	#[tokio::test(start_paused = true)]
	async fn reads_one_window_with_retry() {
		let window = RasterWindow::new(2, 1, 2, 2);
		let source = GridSource::new(4).fail(window, 2);
		let sink = ResultSink::new();
		let id = read_window(&source, 1, 7, window, &CancelSignal::new(), &sink, &policy(), STALL)
			.await
			.unwrap();
		assert_eq!(id, 7);
		let (window_id, pixels) = sink.take().remove(0);
		assert_eq!(window_id, 7);
		assert_eq!(pixels.data, vec![6.0, 7.0, 10.0, 11.0]);
	}

	#[tokio::test(start_paused = true)]
	async fn reads_whole_grid() {
		let source = GridSource::new(5);
		let windows: Vec<_> = RasterWindow::grid(5, 3, 2, 2, None).unwrap().collect();
		let count = windows.len();
		let sink = ResultSink::new();
		let progress = MemoryProgress::default();
		let read = WindowReader::new(policy(), 3)
			.read_windows(&source, 1, windows.clone(), &CancelSignal::new(), &sink, &progress)
			.await
			.unwrap();
		assert_eq!(read, count);

		let mut total = 0.0;
		for (id, pixels) in sink.take() {
			assert_eq!(pixels.width * pixels.height, windows[id].pixel_count());
			total += pixels.data.iter().sum::<f64>();
		}
		assert_eq!(total, (0..15).sum::<i32>() as f64);
		assert!(progress.active().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn persistent_failure_is_returned() {
		let bad = RasterWindow::new(0, 0, 2, 2);
		let source = GridSource::new(4).fail(bad, 10);
		let windows: Vec<_> = RasterWindow::grid(4, 4, 2, 2, None).unwrap().collect();
		let sink = ResultSink::new();
		let err = WindowReader::new(policy(), 2)
			.read_windows(&source, 1, windows, &CancelSignal::new(), &sink, &NoProgress)
			.await
			.unwrap_err();
		assert!(err.to_string().contains("read timed out"), "{err}");
		assert_eq!(sink.len(), 3);
	}

	#[tokio::test]
	async fn cancelled_reader_reads_nothing() {
		let cancel = CancelSignal::new();
		cancel.cancel();
		let sink = ResultSink::new();
		let windows: Vec<_> = RasterWindow::grid(4, 4, 2, 2, None).unwrap().collect();
		let err = WindowReader::new(policy(), 2)
			.read_windows(&GridSource::new(4), 1, windows, &cancel, &sink, &NoProgress)
			.await
			.unwrap_err();
		assert!(err.is_cancelled());
		assert!(sink.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn silent_source_stalls() {
		let sink = ResultSink::new();
		let start = tokio::time::Instant::now();
		let err = read_window(
			&SilentSource,
			1,
			0,
			RasterWindow::new(0, 0, 2, 2),
			&CancelSignal::new(),
			&sink,
			&policy(),
			Duration::from_secs(600),
		)
		.await
		.unwrap_err();
		assert!(err.is_stalled(), "{err}");
		assert_eq!(start.elapsed(), Duration::from_secs(600));
		assert!(sink.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn cancel_interrupts_pending_reads() {
		let cancel = CancelSignal::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(60)).await;
			trigger.cancel();
		});
		let start = tokio::time::Instant::now();
		let windows: Vec<_> = RasterWindow::grid(4, 4, 2, 2, None).unwrap().collect();
		let sink = ResultSink::new();
		let err = WindowReader::new(policy(), 2)
			.read_windows(&SilentSource, 1, windows, &cancel, &sink, &NoProgress)
			.await
			.unwrap_err();
		assert!(err.is_cancelled(), "{err}");
		assert_eq!(start.elapsed(), Duration::from_secs(60));
		assert!(sink.is_empty());
	}
}
