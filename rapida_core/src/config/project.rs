use anyhow::{Result, ensure};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Where the results go and what they are cropped to.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ProjectConfig {
	/// Vector file holding the project boundary polygons.
	pub boundary: PathBuf,

	/// Layer of `boundary` used as crop mask.
	pub layer: String,

	/// Spatial reference of every output raster, anything GDAL understands.
	pub target_srs: String,

	/// Directory receiving per-tile downloads and per-band outputs.
	pub output_dir: PathBuf,
}

impl Default for ProjectConfig {
	fn default() -> Self {
		Self {
			boundary: PathBuf::from("project.gpkg"),
			layer: "polygons".to_string(),
			target_srs: "EPSG:3857".to_string(),
			output_dir: PathBuf::from("data"),
		}
	}
}

impl ProjectConfig {
	pub(crate) fn resolve_paths(&mut self, base: &Path) {
		if self.boundary.is_relative() {
			self.boundary = base.join(&self.boundary);
		}
		if self.output_dir.is_relative() {
			self.output_dir = base.join(&self.output_dir);
		}
	}

	pub fn validate(&self) -> Result<()> {
		ensure!(!self.layer.is_empty(), "project.layer must not be empty");
		ensure!(!self.target_srs.is_empty(), "project.target_srs must not be empty");
		Ok(())
	}
}
