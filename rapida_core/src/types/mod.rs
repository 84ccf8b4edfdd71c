mod cancel;
mod geo_bbox;
mod resolution;
mod window;

pub use cancel::CancelSignal;
pub use geo_bbox::GeoBBox;
pub use resolution::Resolution;
pub use window::{PixelRect, RasterWindow};
