//! Worker process supervision: launch, orphan recovery, log streaming,
//! and exit monitoring.

mod reaper;
mod runner;
mod state;
mod streamer;

pub use reaper::*;
pub use runner::*;
pub use state::*;
pub use streamer::{BATCH_CAPACITY, FLUSH_INTERVAL, LINE_QUEUE_CAPACITY};
