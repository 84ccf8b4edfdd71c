use crate::{BandOutcome, BandStatus, FetchOutcome, TaskStatus};
use std::fmt;

/// What a run achieved, per downloaded asset and per output band.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
	pub fetches: Vec<FetchOutcome>,
	pub bands: Vec<BandOutcome>,
}

impl RunSummary {
	pub fn new(fetches: Vec<FetchOutcome>) -> Self {
		Self {
			fetches,
			bands: Vec::new(),
		}
	}

	/// Adds the mosaic outcomes and a `Skipped` entry for every expected band that produced none.
	pub fn with_bands<'a>(mut self, bands: Vec<BandOutcome>, expected: impl IntoIterator<Item = &'a str>) -> Self {
		self.bands = bands;
		for band in expected {
			if !self.bands.iter().any(|b| b.band == band) {
				self.bands.push(BandOutcome {
					band: band.to_string(),
					status: BandStatus::Skipped,
				});
			}
		}
		self.bands.sort_by(|a, b| a.band.cmp(&b.band));
		self
	}

	pub fn fetched(&self) -> usize {
		self.count_fetches(|s| matches!(s, TaskStatus::Fetched(_)))
	}

	pub fn failed(&self) -> usize {
		self.count_fetches(|s| matches!(s, TaskStatus::Failed(_)))
	}

	pub fn cancelled(&self) -> usize {
		self.count_fetches(|s| matches!(s, TaskStatus::Cancelled))
	}

	pub fn written(&self) -> usize {
		self.bands
			.iter()
			.filter(|b| matches!(b.status, BandStatus::Written(_)))
			.count()
	}

	/// True when every asset was fetched and every band written.
	pub fn is_complete(&self) -> bool {
		self.fetched() == self.fetches.len() && self.written() == self.bands.len()
	}

	fn count_fetches(&self, filter: impl Fn(&TaskStatus) -> bool) -> usize {
		self.fetches.iter().filter(|f| filter(&f.status)).count()
	}
}

impl fmt::Display for RunSummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(
			f,
			"assets: {} fetched, {} failed, {} cancelled",
			self.fetched(),
			self.failed(),
			self.cancelled()
		)?;
		for fetch in &self.fetches {
			match &fetch.status {
				TaskStatus::Fetched(_) => {}
				TaskStatus::Failed(reason) => writeln!(f, "  {}: failed: {reason}", fetch.task)?,
				TaskStatus::Cancelled => writeln!(f, "  {}: cancelled", fetch.task)?,
			}
		}
		if !self.bands.is_empty() {
			writeln!(f, "bands:")?;
		}
		for band in &self.bands {
			match &band.status {
				BandStatus::Written(path) => writeln!(f, "  {}: {}", band.band, path.display())?,
				BandStatus::Failed(reason) => writeln!(f, "  {}: failed: {reason}", band.band)?,
				BandStatus::Skipped => writeln!(f, "  {}: skipped, no tile available", band.band)?,
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use std::path::PathBuf;

	fn fetch(task: &str, status: TaskStatus) -> FetchOutcome {
		FetchOutcome {
			task: task.into(),
			band: task.split(':').nth(1).unwrap().into(),
			status,
		}
	}

	#[test]
	fn display_lists_problems_and_bands() {
		let summary = RunSummary::new(vec![
			fetch("T1:B02", TaskStatus::Fetched(PathBuf::from("out/T1/B02.tif"))),
			fetch("T1:B04", TaskStatus::Failed("HTTP 503".into())),
			fetch("T2:B02", TaskStatus::Cancelled),
		])
		.with_bands(
			vec![BandOutcome {
				band: "B02".into(),
				status: BandStatus::Written(PathBuf::from("out/B02.tif")),
			}],
			["B04", "B02"],
		);

		assert_eq!(
			summary.to_string(),
			"assets: 1 fetched, 1 failed, 1 cancelled\n  T1:B04: failed: HTTP 503\n  T2:B02: cancelled\nbands:\n  B02: out/B02.tif\n  B04: skipped, no tile available\n"
		);
		assert!(!summary.is_complete());
		assert_eq!(summary.written(), 1);
	}

	#[test]
	fn complete_run() {
		let summary = RunSummary::new(vec![fetch("T1:B02", TaskStatus::Fetched(PathBuf::from("a")))]).with_bands(
			vec![BandOutcome {
				band: "B02".into(),
				status: BandStatus::Written(PathBuf::from("b")),
			}],
			["B02"],
		);
		assert!(summary.is_complete());
	}
}
