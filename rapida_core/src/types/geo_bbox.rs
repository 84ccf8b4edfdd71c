use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::fmt::Debug;

/// A rectangular area in the coordinate system of whatever dataset it came from,
/// defined by its minimum and maximum x and y coordinates.
///
/// Unlike a tile-pyramid bbox this is not restricted to WGS84 degrees: raster
/// bounds in projected meters are stored the same way. The only invariant is
/// `x_min <= x_max` and `y_min <= y_max`.
///
/// # Examples
///
/// ```
/// use rapida_core::GeoBBox;
///
/// let mut bbox1 = GeoBBox::new(-10.0, -5.0, 10.0, 5.0).unwrap();
/// let bbox2 = GeoBBox::new(-12.0, -3.0, 8.0, 6.0).unwrap();
/// bbox1.extend(&bbox2);
/// assert_eq!(bbox1.as_tuple(), (-12.0, -5.0, 10.0, 6.0));
/// ```
#[derive(Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct GeoBBox {
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

impl GeoBBox {
	/// Creates a new `GeoBBox` from `x_min, y_min, x_max, y_max`.
	pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<GeoBBox> {
		GeoBBox {
			x_min,
			y_min,
			x_max,
			y_max,
		}
		.checked()
	}

	/// Builds the smallest bbox covering every bbox of `iter`.
	///
	/// Returns `None` for an empty iterator.
	///
	/// ```
	/// use rapida_core::GeoBBox;
	///
	/// let a = GeoBBox::new(0.0, 0.0, 10.0, 10.0).unwrap();
	/// let b = GeoBBox::new(5.0, -5.0, 20.0, 5.0).unwrap();
	/// let union = GeoBBox::union_of([a, b]).unwrap();
	/// assert_eq!(union.as_tuple(), (0.0, -5.0, 20.0, 10.0));
	/// ```
	pub fn union_of(iter: impl IntoIterator<Item = GeoBBox>) -> Option<GeoBBox> {
		iter.into_iter().reduce(|acc, bbox| acc.extended(&bbox))
	}

	#[must_use]
	pub fn as_array(&self) -> [f64; 4] {
		[self.x_min, self.y_min, self.x_max, self.y_max]
	}

	#[must_use]
	pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
		(self.x_min, self.y_min, self.x_max, self.y_max)
	}

	#[must_use]
	pub fn width(&self) -> f64 {
		self.x_max - self.x_min
	}

	#[must_use]
	pub fn height(&self) -> f64 {
		self.y_max - self.y_min
	}

	/// Expands the current bounding box in place so that it includes the area
	/// covered by `other`.
	pub fn extend(&mut self, other: &GeoBBox) {
		self.x_min = self.x_min.min(other.x_min);
		self.y_min = self.y_min.min(other.y_min);
		self.x_max = self.x_max.max(other.x_max);
		self.y_max = self.y_max.max(other.y_max);
	}

	/// Non-mutating version of [`extend`](Self::extend).
	#[must_use]
	pub fn extended(mut self, other: &GeoBBox) -> GeoBBox {
		self.extend(other);
		self
	}

	fn checked(self) -> Result<Self> {
		ensure!(
			self.as_array().iter().all(|v| v.is_finite()),
			"bbox coordinates must be finite, got {self:?}"
		);
		ensure!(
			self.x_min <= self.x_max,
			"x_min ({}) must be <= x_max ({})",
			self.x_min,
			self.x_max
		);
		ensure!(
			self.y_min <= self.y_max,
			"y_min ({}) must be <= y_max ({})",
			self.y_min,
			self.y_max
		);
		Ok(self)
	}
}

impl Debug for GeoBBox {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"GeoBBox({}, {}, {}, {})",
			self.x_min, self.y_min, self.x_max, self.y_max
		)
	}
}

impl TryFrom<Vec<f64>> for GeoBBox {
	type Error = anyhow::Error;

	fn try_from(input: Vec<f64>) -> Result<Self> {
		ensure!(
			input.len() == 4,
			"GeoBBox must have 4 elements (x_min, y_min, x_max, y_max), got {}",
			input.len()
		);
		GeoBBox::new(input[0], input[1], input[2], input[3]).with_context(|| format!("Failed to convert {input:?} to GeoBBox"))
	}
}

impl TryFrom<[f64; 4]> for GeoBBox {
	type Error = anyhow::Error;

	fn try_from(input: [f64; 4]) -> Result<Self> {
		GeoBBox::new(input[0], input[1], input[2], input[3])
	}
}
