//! Pixel windows used to split raster reads into independent units of work.
//!
//! [`RasterWindow::grid`] walks a raster in blocks of `block_width x block_height`
//! pixels (usually the native block size of the band) and yields one window per
//! block. Windows of the last column and row are clipped to the raster size, and
//! an optional [`PixelRect`] restricts the grid to a sub-rectangle, so the windows
//! always cover the requested area exactly once.

use anyhow::{Result, ensure};
use itertools::Itertools;
use std::ops::Range;

/// A rectangular read window, `(col_start, row_start, col_size, row_size)` in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterWindow {
	pub col_start: usize,
	pub row_start: usize,
	pub col_size: usize,
	pub row_size: usize,
}

/// Half-open pixel rectangle `[col_min, col_max) x [row_min, row_max)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
	pub col_min: usize,
	pub row_min: usize,
	pub col_max: usize,
	pub row_max: usize,
}

impl PixelRect {
	pub fn new(col_min: usize, row_min: usize, col_max: usize, row_max: usize) -> Result<PixelRect> {
		ensure!(col_min <= col_max, "col_min ({col_min}) must be <= col_max ({col_max})");
		ensure!(row_min <= row_max, "row_min ({row_min}) must be <= row_max ({row_max})");
		Ok(PixelRect {
			col_min,
			row_min,
			col_max,
			row_max,
		})
	}

	pub fn full(width: usize, height: usize) -> PixelRect {
		PixelRect {
			col_min: 0,
			row_min: 0,
			col_max: width,
			row_max: height,
		}
	}

	#[must_use]
	pub fn intersected(&self, other: &PixelRect) -> PixelRect {
		let col_min = self.col_min.max(other.col_min);
		let row_min = self.row_min.max(other.row_min);
		PixelRect {
			col_min,
			row_min,
			col_max: self.col_max.min(other.col_max).max(col_min),
			row_max: self.row_max.min(other.row_max).max(row_min),
		}
	}

	pub fn area(&self) -> usize {
		(self.col_max - self.col_min) * (self.row_max - self.row_min)
	}

	pub fn is_empty(&self) -> bool {
		self.area() == 0
	}
}

impl RasterWindow {
	pub fn new(col_start: usize, row_start: usize, col_size: usize, row_size: usize) -> RasterWindow {
		RasterWindow {
			col_start,
			row_start,
			col_size,
			row_size,
		}
	}

	pub fn pixel_count(&self) -> usize {
		self.col_size * self.row_size
	}

	pub fn cols(&self) -> Range<usize> {
		self.col_start..self.col_start + self.col_size
	}

	pub fn rows(&self) -> Range<usize> {
		self.row_start..self.row_start + self.row_size
	}

	/// Splits a `width x height` raster into block windows, optionally limited to `clip`.
	///
	/// Iteration is column-major: every row block of the first column block, then
	/// the next column block. The clip rectangle is first limited to the raster.
	pub fn grid(
		width: usize,
		height: usize,
		block_width: usize,
		block_height: usize,
		clip: Option<PixelRect>,
	) -> Result<impl Iterator<Item = RasterWindow>> {
		ensure!(
			block_width > 0 && block_height > 0,
			"block size must be > 0, got {block_width}x{block_height}"
		);

		let area = clip.map_or(PixelRect::full(width, height), |clip| {
			clip.intersected(&PixelRect::full(width, height))
		});

		let cols = block_spans(area.col_min, area.col_max, block_width);
		let rows = block_spans(area.row_min, area.row_max, block_height);

		Ok(cols
			.cartesian_product(rows.collect::<Vec<_>>())
			.map(|(cols, rows)| RasterWindow::new(cols.start, rows.start, cols.len(), rows.len())))
	}
}

/// Block-aligned spans of `[min, max)`: every block of size `block` that overlaps
/// the range, cut to the range.
fn block_spans(min: usize, max: usize, block: usize) -> impl Iterator<Item = Range<usize>> + Clone {
	let first_block = min / block;
	let end_block = max.div_ceil(block);
	(first_block..end_block)
		.map(move |b| (b * block).max(min)..((b + 1) * block).min(max))
		.filter(|span| !span.is_empty())
}
