//! HTTP collaborators: STAC search and asset download.

mod fetcher;
mod stac;

pub use fetcher::{HttpAssetFetcher, RenameReprojector, Reprojector, acquisition_date};
pub use stac::StacClient;
