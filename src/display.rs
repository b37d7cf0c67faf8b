//! Colored CLI display utilities for worker output.
//!
//! Used by the `corekeeper` binary to render supervisor notifications
//! on the terminal.

use owo_colors::OwoColorize;

use crate::events::CoreEvent;

/// Print a launch confirmation.
pub fn print_launched(pid: u32) {
    println!("{} pid={pid}", "[LAUNCHED]".green().bold());
}

/// Print a supervisor notification.
pub fn print_event(event: &CoreEvent) {
    match event {
        CoreEvent::Ready => {
            println!("{} worker is operational", "[READY]".green().bold());
        }
        CoreEvent::LogBatch(batch) => {
            for line in batch.split('\n') {
                println!("{} {line}", "[CORE]".blue());
            }
        }
        CoreEvent::Stopped { error: None } => {
            println!("{} worker stopped", "[STOPPED]".yellow().bold());
        }
        CoreEvent::Stopped { error: Some(msg) } => {
            println!("{} {msg}", "[STOPPED]".red().bold());
        }
    }
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("{} {msg}", "[ERROR]".red().bold());
}
