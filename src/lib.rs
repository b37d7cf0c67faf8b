//! Corekeeper - single-instance child process supervisor.

pub mod config;
pub mod display;
pub mod events;
pub mod paths;
pub mod platform;
pub mod supervisor;
