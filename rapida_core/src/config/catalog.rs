use crate::GeoBBox;
use anyhow::{Result, ensure};
use serde::Deserialize;
use std::collections::BTreeMap;

/// STAC search parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CatalogConfig {
	/// Root URL of the STAC API.
	pub url: String,

	/// Collection id, e.g. `sentinel-2-l2a`.
	pub collection: String,

	/// Items acquired during this year are searched. The range ends today for the current year.
	pub year: i32,

	/// Only items with `eo:cloud_cover` below this value are kept.
	pub max_cloud_cover: f64,

	/// Search area in WGS84 degrees. Usually derived from the project boundary.
	pub bbox: Option<GeoBBox>,

	/// Asset key in the catalog → band name of the output raster.
	pub assets: BTreeMap<String, String>,

	/// Shift acquisitions of the 2022 processing baseline back onto the older radiometric offset.
	pub harmonize_baseline: bool,
}

impl Default for CatalogConfig {
	fn default() -> Self {
		Self {
			url: "https://earth-search.aws.element84.com/v1".to_string(),
			collection: "sentinel-2-l2a".to_string(),
			year: 2024,
			max_cloud_cover: 5.0,
			bbox: None,
			assets: BTreeMap::new(),
			harmonize_baseline: false,
		}
	}
}

impl CatalogConfig {
	pub fn validate(&self) -> Result<()> {
		ensure!(!self.url.is_empty(), "catalog.url must not be empty");
		ensure!(!self.collection.is_empty(), "catalog.collection must not be empty");
		ensure!(!self.assets.is_empty(), "catalog.assets must name at least one asset");
		ensure!(
			(0.0..=100.0).contains(&self.max_cloud_cover),
			"catalog.max_cloud_cover must be within 0..=100"
		);
		Ok(())
	}
}
