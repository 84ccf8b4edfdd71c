//! Interfaces to the remote systems the pipeline depends on, plus the data they exchange.

use crate::{CatalogQuery, FetchTask, StreamRequest};
use anyhow::{Result, ensure};
use async_trait::async_trait;
use futures::stream::BoxStream;
use rapida_core::{CancelSignal, PipelineError, ProgressSink, RasterWindow};
use std::{collections::BTreeMap, fmt::Debug, path::PathBuf};
use time::OffsetDateTime;

/// One attribute value of a feature.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
	Null,
	Integer(i64),
	Real(f64),
	Text(String),
}

impl From<&str> for FieldValue {
	fn from(value: &str) -> Self {
		FieldValue::Text(value.to_string())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
	pub name: String,
	pub values: Vec<FieldValue>,
}

/// A block of features read from a vector source in one read cycle.
///
/// All columns have one value per feature. Feature ids are stable across reads
/// of the same source, so a consumer can drop duplicates after a restarted stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamBatch {
	pub fids: Vec<i64>,
	/// Geometries as WKB.
	pub geometries: Vec<Vec<u8>>,
	pub columns: Vec<Column>,
}

impl StreamBatch {
	pub fn new(fids: Vec<i64>, geometries: Vec<Vec<u8>>, columns: Vec<Column>) -> Result<StreamBatch> {
		ensure!(
			fids.len() == geometries.len(),
			"batch has {} fids but {} geometries",
			fids.len(),
			geometries.len()
		);
		for column in &columns {
			ensure!(
				column.values.len() == fids.len(),
				"column {} has {} values, expected {}",
				column.name,
				column.values.len(),
				fids.len()
			);
		}
		Ok(StreamBatch {
			fids,
			geometries,
			columns,
		})
	}

	pub fn num_rows(&self) -> usize {
		self.fids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fids.is_empty()
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|c| c.name == name)
	}

	/// Appends a column holding `value` for every feature.
	#[must_use]
	pub fn with_constant_column(mut self, name: &str, value: FieldValue) -> StreamBatch {
		let values = vec![value; self.num_rows()];
		self.columns.push(Column {
			name: name.to_string(),
			values,
		});
		self
	}
}

pub type BatchStream = BoxStream<'static, Result<StreamBatch>>;

/// A remote vector dataset that can be read in batches.
#[async_trait]
pub trait VectorSource: Send + Sync + Debug {
	/// Opens the source for one pass over the features selected by `request`.
	/// A stream that fails is reopened from scratch by the caller.
	async fn open(&self, request: &StreamRequest) -> Result<BatchStream>;
}

/// Pixel values of one window, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterArray {
	pub width: usize,
	pub height: usize,
	pub data: Vec<f64>,
}

impl RasterArray {
	pub fn new(width: usize, height: usize, data: Vec<f64>) -> Result<RasterArray> {
		ensure!(
			data.len() == width * height,
			"raster array of {width}x{height} needs {} values, got {}",
			width * height,
			data.len()
		);
		Ok(RasterArray { width, height, data })
	}

	pub fn get(&self, col: usize, row: usize) -> Option<f64> {
		if col >= self.width || row >= self.height {
			return None;
		}
		self.data.get(row * self.width + col).copied()
	}
}

/// A raster dataset that can be read window by window.
#[async_trait]
pub trait RasterSource: Send + Sync + Debug {
	/// Reads `window` of the 1-based `band`.
	async fn read_window(&self, band: usize, window: RasterWindow) -> Result<RasterArray>;
}

/// A downloadable file attached to a catalog item.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogAsset {
	pub href: String,
	pub nodata: Option<f64>,
}

/// One search result of a remote catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogItem {
	pub id: String,
	/// Grid tile the item belongs to. Items without a tile are ignored.
	pub tile_id: Option<String>,
	pub datetime: OffsetDateTime,
	pub assets: BTreeMap<String, CatalogAsset>,
}

#[async_trait]
pub trait CatalogSearch: Send + Sync {
	async fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>>;
}

/// Downloads one asset and leaves it, in the task's destination projection, at a local path.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
	async fn fetch(
		&self,
		task: &FetchTask,
		cancel: &CancelSignal,
		progress: &dyn ProgressSink,
	) -> Result<PathBuf, PipelineError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn constant_column_matches_row_count() {
		let batch = StreamBatch::new(vec![1, 2, 3], vec![vec![]; 3], vec![])
			.unwrap()
			.with_constant_column("polyid", "region-7".into());
		let column = batch.column("polyid").unwrap();
		assert_eq!(column.values, vec![FieldValue::Text("region-7".into()); 3]);
	}

	#[test]
	fn mismatched_columns_are_rejected() {
		let column = Column {
			name: "name".into(),
			values: vec![FieldValue::Null],
		};
		assert!(StreamBatch::new(vec![1, 2], vec![vec![], vec![]], vec![column]).is_err());
		assert!(StreamBatch::new(vec![1, 2], vec![vec![]], vec![]).is_err());
	}

	#[test]
	fn raster_array_access() {
		let array = RasterArray::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
		assert_eq!(array.get(1, 0), Some(2.0));
		assert_eq!(array.get(0, 1), Some(3.0));
		assert_eq!(array.get(2, 0), None);
		assert!(RasterArray::new(2, 2, vec![0.0; 3]).is_err());
	}
}
