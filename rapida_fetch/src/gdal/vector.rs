use crate::{BatchStream, Column, FieldValue, SpatialFilter, StreamBatch, StreamRequest, VectorSource};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use gdal::{
	Dataset,
	spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef},
	vector::{FieldValue as GdalValue, Geometry, Layer, LayerAccess},
};
use rapida_core::GeoBBox;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Batches a vector layer GDAL can open, local or remote (`/vsicurl/...`).
///
/// Features are read on a blocking thread and handed over through a bounded
/// channel; dropping the stream stops the reader after the batch in flight.
#[derive(Clone, Debug)]
pub struct GdalVectorSource {
	path: PathBuf,
}

impl GdalVectorSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

fn convert(value: Option<GdalValue>) -> FieldValue {
	match value {
		None => FieldValue::Null,
		Some(GdalValue::IntegerValue(v)) => FieldValue::Integer(v.into()),
		Some(GdalValue::Integer64Value(v)) => FieldValue::Integer(v),
		Some(GdalValue::RealValue(v)) => FieldValue::Real(v),
		Some(GdalValue::StringValue(v)) => FieldValue::Text(v),
		Some(other) => FieldValue::Text(format!("{other:?}")),
	}
}

fn select_layer<'a>(dataset: &'a Dataset, request: &StreamRequest) -> Result<Layer<'a>> {
	let mut layer = match &request.layer {
		Some(name) => dataset.layer_by_name(name)?,
		None => dataset.layer(0)?,
	};
	match &request.filter {
		SpatialFilter::None => {}
		SpatialFilter::BBox(bbox) => layer.set_spatial_filter_rect(bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max),
		SpatialFilter::Mask(wkb) => layer.set_spatial_filter(&Geometry::from_wkb(wkb)?),
	}
	Ok(layer)
}

fn read_batches(path: &Path, request: &StreamRequest, tx: &mpsc::Sender<Result<StreamBatch>>) -> Result<()> {
	let dataset = Dataset::open(path).with_context(|| format!("Failed to open {path:?}"))?;
	let mut layer = select_layer(&dataset, request)?;
	let names: Vec<String> = layer.defn().fields().map(|f| f.name()).collect();

	let mut fids = Vec::new();
	let mut geometries = Vec::new();
	let mut values: Vec<Vec<FieldValue>> = vec![Vec::new(); names.len()];
	for feature in layer.features() {
		let Some(fid) = feature.fid() else {
			bail!("feature without id in {path:?}");
		};
		fids.push(fid as i64);
		geometries.push(match feature.geometry() {
			Some(geometry) => geometry.wkb()?,
			None => Vec::new(),
		});
		for (index, column) in values.iter_mut().enumerate() {
			column.push(convert(feature.field(index)?));
		}

		if fids.len() >= request.batch_size {
			let full = std::mem::replace(&mut values, vec![Vec::new(); names.len()]);
			if !send(tx, std::mem::take(&mut fids), std::mem::take(&mut geometries), full, &names)? {
				return Ok(());
			}
		}
	}
	if !fids.is_empty() {
		send(tx, fids, geometries, values, &names)?;
	}
	Ok(())
}

/// Returns `false` when the receiver is gone.
fn send(
	tx: &mpsc::Sender<Result<StreamBatch>>,
	fids: Vec<i64>,
	geometries: Vec<Vec<u8>>,
	values: Vec<Vec<FieldValue>>,
	names: &[String],
) -> Result<bool> {
	let columns = names
		.iter()
		.zip(values)
		.map(|(name, values)| Column {
			name: name.clone(),
			values,
		})
		.collect();
	let batch = StreamBatch::new(fids, geometries, columns)?;
	Ok(tx.blocking_send(Ok(batch)).is_ok())
}

/// Extent of `layer` in WGS84 degrees, used as catalog search area.
pub fn boundary_bbox(path: &Path, layer: &str) -> Result<GeoBBox> {
	let dataset = Dataset::open(path).with_context(|| format!("Failed to open boundary {path:?}"))?;
	let layer = dataset
		.layer_by_name(layer)
		.with_context(|| format!("boundary {path:?} has no layer {layer}"))?;
	let extent = layer.get_extent()?;
	let mut source = layer
		.spatial_ref()
		.with_context(|| format!("boundary {path:?} has no spatial reference"))?;
	source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
	let mut wgs84 = SpatialRef::from_epsg(4326)?;
	wgs84.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

	let transform = CoordTransform::new(&source, &wgs84).context("Failed to create coordinate transform to EPSG:4326")?;
	let bounds = transform.transform_bounds(&[extent.MinX, extent.MinY, extent.MaxX, extent.MaxY], 21)?;
	GeoBBox::new(bounds[0], bounds[1], bounds[2], bounds[3])
}

#[async_trait]
impl VectorSource for GdalVectorSource {
	async fn open(&self, request: &StreamRequest) -> Result<BatchStream> {
		let (tx, rx) = mpsc::channel(2);
		let path = self.path.clone();
		let request = request.clone();
		tokio::task::spawn_blocking(move || {
			if let Err(err) = read_batches(&path, &request, &tx) {
				let _ = tx.blocking_send(Err(err));
			}
		});
		Ok(stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed())
	}
}
