use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

/// Local files per band, collected from the successful downloads.
///
/// A band is present only once at least one file was added for it. The no-data
/// value of a band is the first non-empty value reported for it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssetRegistry {
	bands: BTreeMap<String, BandEntry>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct BandEntry {
	files: Vec<PathBuf>,
	nodata: Option<f64>,
}

impl AssetRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, band: &str, path: &Path, nodata: Option<f64>) {
		let entry = self.bands.entry(band.to_string()).or_default();
		if !entry.files.iter().any(|f| f == path) {
			entry.files.push(path.to_path_buf());
		}
		if entry.nodata.is_none() {
			entry.nodata = nodata;
		}
	}

	/// Band names in sorted order.
	pub fn bands(&self) -> impl Iterator<Item = &str> {
		self.bands.keys().map(String::as_str)
	}

	pub fn files(&self, band: &str) -> &[PathBuf] {
		self.bands.get(band).map_or(&[], |entry| entry.files.as_slice())
	}

	pub fn nodata(&self, band: &str) -> Option<f64> {
		self.bands.get(band).and_then(|entry| entry.nodata)
	}

	pub fn contains(&self, band: &str) -> bool {
		self.bands.contains_key(band)
	}

	pub fn len(&self) -> usize {
		self.bands.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bands.is_empty()
	}

	pub fn file_count(&self) -> usize {
		self.bands.values().map(|entry| entry.files.len()).sum()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &[PathBuf])> {
		self.bands.iter().map(|(band, entry)| (band.as_str(), entry.files.as_slice()))
	}
}
