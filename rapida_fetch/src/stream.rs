//! Batched streaming of remote vector sources.

use crate::{FieldValue, ResultSink, RetryPolicy, StallMonitor, StreamBatch, VectorSource, retry};
use anyhow::Context;
use futures::StreamExt;
use rapida_core::{CancelSignal, FetchConfig, GeoBBox, PipelineError, ProgressId, ProgressSink, ProgressUpdate};
use std::{
	sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
	time::Duration,
};

/// Name of the column holding the region id when [`StreamRequest::add_region_column`] is set.
pub const REGION_COLUMN: &str = "polyid";

/// Restricts the features read from a source.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SpatialFilter {
	#[default]
	None,
	/// Bounding box in the source projection.
	BBox(GeoBBox),
	/// WKB polygon in the source projection.
	Mask(Vec<u8>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
	/// Identifies the area being read. Used for logging, progress and the region column.
	pub region_id: String,
	/// Layer name, `None` reads the first layer.
	pub layer: Option<String>,
	pub filter: SpatialFilter,
	pub batch_size: usize,
	pub add_region_column: bool,
}

impl StreamRequest {
	pub fn new(region_id: &str) -> Self {
		Self::from_config(region_id, &FetchConfig::default())
	}

	/// Request reading batches of `config.batch_size` features.
	pub fn from_config(region_id: &str, config: &FetchConfig) -> Self {
		Self {
			region_id: region_id.to_string(),
			layer: None,
			filter: SpatialFilter::None,
			batch_size: config.batch_size,
			add_region_column: false,
		}
	}

	#[must_use]
	pub fn with_layer(mut self, layer: &str) -> Self {
		self.layer = Some(layer.to_string());
		self
	}

	#[must_use]
	pub fn with_filter(mut self, filter: SpatialFilter) -> Self {
		self.filter = filter;
		self
	}

	#[must_use]
	pub fn with_batch_size(mut self, batch_size: usize) -> Self {
		self.batch_size = batch_size;
		self
	}

	#[must_use]
	pub fn with_region_column(mut self) -> Self {
		self.add_region_column = true;
		self
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamOutcome {
	pub region_id: String,
	/// Batches pushed into the sink over all attempts.
	pub batches: usize,
	/// Features pushed into the sink over all attempts.
	pub rows: u64,
	pub attempts: u32,
	pub cancelled: bool,
}

#[derive(Default)]
struct Totals {
	batches: AtomicUsize,
	rows: AtomicU64,
	attempts: AtomicU32,
}

/// Pulls a [`VectorSource`] batch by batch into a [`ResultSink`].
///
/// A failing attempt restarts the read from the beginning. Batches pushed by
/// the failed attempt stay in the sink; feature ids allow deduplication.
#[derive(Clone, Debug)]
pub struct BatchStreamer {
	policy: RetryPolicy,
	stall_timeout: Duration,
}

impl Default for BatchStreamer {
	fn default() -> Self {
		Self::from_config(&FetchConfig::default())
	}
}

impl BatchStreamer {
	pub fn new(policy: RetryPolicy, stall_timeout: Duration) -> Self {
		Self { policy, stall_timeout }
	}

	pub fn from_config(config: &FetchConfig) -> Self {
		Self::new(RetryPolicy::from_config(config), config.stall_timeout())
	}

	/// Streams every batch selected by `request` into `sink`, tagged with the region id.
	///
	/// Cancellation is not an error: the outcome is flagged `cancelled` and holds
	/// whatever was sunk before the signal was seen.
	pub async fn stream(
		&self,
		source: &dyn VectorSource,
		request: &StreamRequest,
		cancel: &CancelSignal,
		sink: &ResultSink<(String, StreamBatch)>,
		progress: &dyn ProgressSink,
	) -> Result<StreamOutcome, PipelineError> {
		let totals = Totals::default();
		let result = retry(&self.policy, cancel, &request.region_id, |attempt| {
			totals.attempts.store(attempt, Ordering::SeqCst);
			self.attempt(source, request, cancel, sink, progress, &totals)
		})
		.await;

		let cancelled = match result {
			Ok(cancelled) => cancelled,
			Err(PipelineError::Cancelled { .. }) => true,
			Err(err) => return Err(err),
		};
		if cancelled {
			log::info!("Cancelled download in {}", request.region_id);
		}
		Ok(StreamOutcome {
			region_id: request.region_id.clone(),
			batches: totals.batches.load(Ordering::SeqCst),
			rows: totals.rows.load(Ordering::SeqCst),
			attempts: totals.attempts.load(Ordering::SeqCst),
			cancelled,
		})
	}

	async fn attempt(
		&self,
		source: &dyn VectorSource,
		request: &StreamRequest,
		cancel: &CancelSignal,
		sink: &ResultSink<(String, StreamBatch)>,
		progress: &dyn ProgressSink,
		totals: &Totals,
	) -> Result<bool, PipelineError> {
		log::debug!(
			"attempt {} at {}",
			totals.attempts.load(Ordering::SeqCst),
			request.region_id
		);
		let id = progress.add(&format!("Downloading data in {}", request.region_id), None);
		let result = self.read_all(source, request, cancel, sink, progress, id, totals).await;
		progress.remove(id);
		result
	}

	/// Returns `true` when the read stopped because of cancellation.
	#[allow(clippy::too_many_arguments)]
	async fn read_all(
		&self,
		source: &dyn VectorSource,
		request: &StreamRequest,
		cancel: &CancelSignal,
		sink: &ResultSink<(String, StreamBatch)>,
		progress: &dyn ProgressSink,
		id: ProgressId,
		totals: &Totals,
	) -> Result<bool, PipelineError> {
		let region = &request.region_id;
		let mut monitor = StallMonitor::new(region, self.stall_timeout);
		let mut stream = monitor
			.guard(source.open(request))
			.await?
			.with_context(|| format!("Failed to open {source:?} for {region}"))?;
		log::trace!("opened {source:?} for {region}");

		let mut rows = 0u64;
		while let Some(batch) = monitor.guard(stream.next()).await? {
			if cancel.is_cancelled() {
				return Ok(true);
			}
			let batch = batch.with_context(|| format!("Failed to read batch in {region}"))?;
			if !batch.is_empty() {
				let batch = if request.add_region_column {
					batch.with_constant_column(REGION_COLUMN, FieldValue::Text(region.clone()))
				} else {
					batch
				};
				let n = batch.num_rows() as u64;
				rows += n;
				totals.rows.fetch_add(n, Ordering::SeqCst);
				totals.batches.fetch_add(1, Ordering::SeqCst);
				sink.push((region.clone(), batch));
				progress.update(
					id,
					ProgressUpdate::completed(rows).with_description(format!("Downloaded {rows} features in {region}")),
				);
			}
			monitor.observe(rows);
			monitor.check()?;
		}
		Ok(false)
	}
}
