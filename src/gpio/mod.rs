//! GPIO subsystem for limit switch input handling
//!
//! Implements the input side of the curtain pipeline:
//!
//! 1. [`watcher`] - Multiplexed edge watching over a dynamic set of inputs
//! 2. [`debounce`] - Per-input filter for contact bounce
//! 3. [`sysfs`] - Kernel pseudo-file backend for the watcher
//! 4. [`rpi`] - Pull resistor and output setup through `rppal`
//!
//! # Architecture
//!
//! ```text
//! gpioN/value ──► PollLoop ──► PinEdges ──► Debouncer
//!                 (thread)     (bounded, drop-newest)
//! ```

pub mod debounce;
pub mod rpi;
pub mod sysfs;
pub mod watcher;

pub use rppal::gpio::Level;

pub use debounce::Debouncer;
pub use sysfs::SysfsGpio;
pub use watcher::{EdgeBackend, PinEdge, PinEdges, PinWatcher, ValueSource, WatcherError, WatcherSettings};

/// BCM pin number of a watched input.
pub type PinId = u8;

/// Maps the single ASCII character of a value file to a level.
pub fn parse_level(byte: u8) -> Option<Level> {
    match byte {
        b'0' => Some(Level::Low),
        b'1' => Some(Level::High),
        _ => None,
    }
}
