use anyhow::{Result, ensure};
use std::fmt::Display;

/// Pixel size of a raster along both axes, always stored as positive values
/// in the units of the raster's spatial reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
	pub x: f64,
	pub y: f64,
}

impl Resolution {
	pub fn new(x: f64, y: f64) -> Result<Resolution> {
		ensure!(
			x.is_finite() && y.is_finite() && x != 0.0 && y != 0.0,
			"resolution must be finite and non-zero, got ({x}, {y})"
		);
		Ok(Resolution { x: x.abs(), y: y.abs() })
	}

	/// Builds a resolution from a GDAL style affine geo transform
	/// `[origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height]`.
	pub fn from_geo_transform(gt: &[f64; 6]) -> Result<Resolution> {
		ensure!(gt[2] == 0.0 && gt[4] == 0.0, "rotated rasters are not supported");
		Resolution::new(gt[1], gt[5])
	}

	/// The finer of both resolutions, per axis.
	#[must_use]
	pub fn finest(self, other: Resolution) -> Resolution {
		Resolution {
			x: self.x.min(other.x),
			y: self.y.min(other.y),
		}
	}

	/// Reduces many resolutions to the per-axis minimum.
	pub fn finest_of(iter: impl IntoIterator<Item = Resolution>) -> Option<Resolution> {
		iter.into_iter().reduce(Resolution::finest)
	}
}

impl Display for Resolution {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}x{}", self.x, self.y)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn negative_pixel_height_is_normalised() {
		let res = Resolution::from_geo_transform(&[500_000.0, 10.0, 0.0, 4_200_000.0, 0.0, -10.0]).unwrap();
		assert_eq!(res, Resolution { x: 10.0, y: 10.0 });
	}

	#[test]
	fn rotated_transform_is_rejected() {
		assert!(Resolution::from_geo_transform(&[0.0, 10.0, 0.5, 0.0, 0.0, -10.0]).is_err());
	}

	#[test]
	fn zero_is_rejected() {
		assert!(Resolution::new(0.0, 1.0).is_err());
		assert!(Resolution::new(1.0, f64::INFINITY).is_err());
	}

	#[test]
	fn finest_is_per_axis() {
		let a = Resolution::new(10.0, 30.0).unwrap();
		let b = Resolution::new(20.0, 15.0).unwrap();
		assert_eq!(Resolution::finest_of([a, b]), Some(Resolution { x: 10.0, y: 15.0 }));
		assert_eq!(Resolution::finest_of(Vec::new()), None);
		assert_eq!(a.to_string(), "10x30");
	}
}
