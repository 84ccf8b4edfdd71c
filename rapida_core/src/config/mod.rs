//! YAML run configuration.
//!
//! - [`RunConfig`]: top-level loader
//! - [`FetchConfig`]: concurrency, retry and stall knobs
//! - [`CatalogConfig`]: which remote collection to search and which assets to keep
//! - [`ProjectConfig`]: boundary layer, target projection and output directory

mod catalog;
mod fetch;
mod main;
mod project;

pub use catalog::CatalogConfig;
pub use fetch::FetchConfig;
pub use main::RunConfig;
pub use project::ProjectConfig;
