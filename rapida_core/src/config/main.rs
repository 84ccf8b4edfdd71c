use super::{CatalogConfig, FetchConfig, ProjectConfig};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
	fs::File,
	io::{BufReader, Read},
	path::Path,
};

#[derive(Default, Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
	#[serde(default)]
	pub fetch: FetchConfig,

	#[serde(default)]
	pub catalog: CatalogConfig,

	#[serde(default)]
	pub project: ProjectConfig,
}

impl RunConfig {
	pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
		Ok(serde_yaml_ng::from_reader(reader)?)
	}

	pub fn from_string(text: &str) -> Result<Self> {
		Ok(serde_yaml_ng::from_str(text)?)
	}

	/// Parses a file and resolves relative project paths against its directory.
	pub fn from_path(path: &Path) -> Result<Self> {
		let file = File::open(path).with_context(|| format!("Failed to open config file {path:?}"))?;
		let mut cfg =
			RunConfig::from_reader(BufReader::new(file)).with_context(|| format!("Failed to parse config file {path:?}"))?;
		if let Some(base) = path.parent() {
			cfg.project.resolve_paths(base);
		}
		Ok(cfg)
	}

	pub fn validate(&self) -> Result<()> {
		self.fetch.validate()?;
		self.catalog.validate()?;
		self.project.validate()?;
		Ok(())
	}
}
