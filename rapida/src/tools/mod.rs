pub mod fetch;
pub mod plan;

use anyhow::{Context, Result};
use rapida_core::{GeoBBox, RunConfig};
use rapida_fetch::{CatalogQuery, FetchTask, http::StacClient};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Loads and validates the run file. `output` replaces `project.output_dir`.
pub fn load_config(path: &Path, output: Option<&PathBuf>) -> Result<RunConfig> {
	let mut config = RunConfig::from_path(path)?;
	if let Some(output) = output {
		config.project.output_dir.clone_from(output);
	}
	config.validate().with_context(|| format!("Invalid config file {path:?}"))?;
	Ok(config)
}

/// Searches the catalog and returns one task per tile and band.
pub async fn plan_tasks(config: &RunConfig) -> Result<Vec<FetchTask>> {
	let mut query = CatalogQuery::from_config(&config.catalog, OffsetDateTime::now_utc().date())?;
	if query.bbox.is_none() {
		query.bbox = Some(boundary_area(config)?);
	}
	let client = StacClient::new(&config.catalog.url)?;
	let tasks = rapida_fetch::discover(&client, &query, &config.project.output_dir, &config.project.target_srs).await?;
	Ok(tasks)
}

#[cfg(feature = "gdal")]
fn boundary_area(config: &RunConfig) -> Result<GeoBBox> {
	rapida_fetch::gdal::boundary_bbox(&config.project.boundary, &config.project.layer)
}

#[cfg(not(feature = "gdal"))]
fn boundary_area(_config: &RunConfig) -> Result<GeoBBox> {
	anyhow::bail!("catalog.bbox is required, reading the project boundary needs the gdal feature")
}
