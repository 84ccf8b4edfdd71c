//! Resilient concurrent acquisition and mosaicking of remote geospatial assets.
//!
//! The crate is organised along the data flow:
//! - [`retry`] and [`stall`]: the resilience contract shared by every remote read,
//! - [`stream`] and [`window_reader`]: batched vector streaming and windowed raster reads,
//! - [`discovery`] and [`scheduler`]: catalog search and chunked concurrent downloads
//!   into an [`AssetRegistry`],
//! - [`mosaic`]: per-band virtual mosaic, reprojection and crop,
//! - [`http`]: STAC search and HTTP download collaborators,
//! - `gdal` (feature `gdal`): GDAL backed sources, reprojection and mosaic backend.
//!
//! Remote systems are only reached through the traits in [`sources`], so every
//! stage runs against in-memory fakes in tests.

pub mod discovery;
pub mod http;
pub mod mosaic;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod sink;
pub mod sources;
pub mod stall;
pub mod stream;
pub mod summary;
pub mod window_reader;

#[cfg(feature = "gdal")]
pub mod gdal;

pub use discovery::{CatalogQuery, discover, s3_to_http};
pub use mosaic::{BandOutcome, BandStatus, CropMask, MosaicBackend, MosaicSpec, MosaicStage, RasterInfo};
pub use registry::AssetRegistry;
pub use retry::{RetryPolicy, retry};
pub use scheduler::{FetchOutcome, FetchScheduler, FetchTask, TaskStatus};
pub use sink::ResultSink;
pub use sources::*;
pub use stall::StallMonitor;
pub use stream::{BatchStreamer, SpatialFilter, StreamOutcome, StreamRequest};
pub use summary::RunSummary;
pub use window_reader::{WindowReader, read_window};
