//! Shared building blocks for the rapida acquisition pipeline.
//!
//! This crate holds everything the pipeline stages agree on:
//! - spatial primitives: [`GeoBBox`], [`Resolution`], [`RasterWindow`] and the window grid generator,
//! - the cooperative [`CancelSignal`],
//! - the [`ProgressSink`] capability with a no-op and a terminal implementation,
//! - the [`PipelineError`] taxonomy,
//! - YAML run configuration ([`RunConfig`]).

pub mod config;
pub use config::*;

mod error;
pub use error::*;

pub mod progress;
pub use progress::*;

pub mod types;
pub use types::*;
