//! Progress reporting as an explicit capability.
//!
//! Every pipeline stage receives an `Arc<dyn ProgressSink>` instead of reaching for
//! global state. [`NoProgress`] ignores everything, [`MemoryProgress`] keeps the
//! reported state in memory, and [`TerminalProgress`] draws bars on stderr.

mod format;
mod memory;
mod terminal;
mod traits;

pub use memory::MemoryProgress;
pub use terminal::TerminalProgress;
pub use traits::{NoProgress, ProgressId, ProgressSink, ProgressState, ProgressUpdate};
