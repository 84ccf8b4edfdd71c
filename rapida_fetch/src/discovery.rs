//! Catalog search and selection of the assets to download.

use crate::{CatalogItem, CatalogSearch, FetchTask};
use anyhow::{Context, Result, ensure};
use rapida_core::{CatalogConfig, GeoBBox, PipelineError};
use std::{collections::BTreeMap, path::Path};
use time::{Date, Month, macros::format_description};

/// One catalog search.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogQuery {
	pub collection: String,
	pub bbox: Option<GeoBBox>,
	/// `start/end` date range, ISO 8601.
	pub datetime: String,
	pub max_cloud_cover: f64,
	/// Asset key → band name. Items must carry every key.
	pub assets: BTreeMap<String, String>,
}

impl CatalogQuery {
	pub fn from_config(config: &CatalogConfig, today: Date) -> Result<Self> {
		Ok(Self {
			collection: config.collection.clone(),
			bbox: config.bbox,
			datetime: date_range_for_year(config.year, today)?,
			max_cloud_cover: config.max_cloud_cover,
			assets: config.assets.clone(),
		})
	}
}

/// `YYYY-01-01/YYYY-12-31`, ending today for the current year.
pub fn date_range_for_year(year: i32, today: Date) -> Result<String> {
	let start = Date::from_calendar_date(year, Month::January, 1).with_context(|| format!("invalid year {year}"))?;
	let end_of_year = Date::from_calendar_date(year, Month::December, 31)?;
	ensure!(start <= today, "year {year} lies in the future");
	let end = end_of_year.min(today);

	let format = format_description!("[year]-[month]-[day]");
	Ok(format!("{}/{}", start.format(&format)?, end.format(&format)?))
}

/// Rewrites `s3://bucket/key` to the public HTTPS endpoint of the bucket. Other URLs pass through.
pub fn s3_to_http(url: &str) -> String {
	match url.strip_prefix("s3://") {
		Some(path) => {
			let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
			format!("https://{bucket}.s3.amazonaws.com/{key}")
		}
		None => url.to_string(),
	}
}

/// Keeps the most recent item per tile among the items carrying every required asset.
pub fn latest_per_tile<'a>(
	items: impl IntoIterator<Item = CatalogItem>,
	required: impl IntoIterator<Item = &'a String> + Clone,
) -> BTreeMap<String, CatalogItem> {
	let mut latest: BTreeMap<String, CatalogItem> = BTreeMap::new();
	for item in items {
		let Some(tile_id) = item.tile_id.clone() else {
			log::trace!("ignoring item {} without tile", item.id);
			continue;
		};
		if !required.clone().into_iter().all(|key| item.assets.contains_key(key)) {
			log::trace!("ignoring item {} with missing assets", item.id);
			continue;
		}
		match latest.get(&tile_id) {
			Some(current) if current.datetime >= item.datetime => {}
			_ => {
				latest.insert(tile_id, item);
			}
		}
	}
	latest
}

/// Searches the catalog and turns the selected items into one [`FetchTask`] per tile and asset.
///
/// Tasks download into `<output_dir>/<tile>/<band>`. Fails with
/// [`PipelineError::DiscoveryEmpty`] when no task results.
pub async fn discover(
	search: &dyn CatalogSearch,
	query: &CatalogQuery,
	output_dir: &Path,
	target_srs: &str,
) -> Result<Vec<FetchTask>, PipelineError> {
	log::info!("searching {} for {}", query.collection, query.datetime);
	let items = search
		.search(query)
		.await
		.with_context(|| format!("Failed to search collection {}", query.collection))?;
	log::info!("found {} items", items.len());

	let selected = latest_per_tile(items, query.assets.keys());
	let mut tasks = Vec::new();
	for (tile_id, item) in selected {
		for (key, band) in &query.assets {
			let Some(asset) = item.assets.get(key) else {
				continue;
			};
			tasks.push(FetchTask {
				tile_id: tile_id.clone(),
				asset_key: key.clone(),
				band: band.clone(),
				url: s3_to_http(&asset.href),
				target: output_dir.join(&tile_id).join(band),
				nodata: asset.nodata,
				target_srs: target_srs.to_string(),
			});
		}
	}

	if tasks.is_empty() {
		return Err(PipelineError::DiscoveryEmpty {
			collection: query.collection.clone(),
		});
	}
	log::info!("selected {} assets", tasks.len());
	Ok(tasks)
}
