//! Curtain subsystem: motion control around two limit switches
//!
//! Implements the control side of the pipeline:
//!
//! 1. [`translate`] - Debounced switch presses become hard-stop events
//! 2. [`motion`] - Idle/Moving typestate machine, direction and timing rules
//! 3. [`controller`] - Single task owning the position, serving move requests
//! 4. [`service`] - Wiring of watcher, translator and controller
//!
//! # Architecture
//!
//! ```text
//! PinEdges ──► SwitchTranslator ──► CurtainController ──► MotorDriver
//!              (Debouncer/pin)      ▲ (position owner)
//!                                   └── CurtainHandle::move_to
//! ```

pub mod controller;
pub mod motion;
pub mod service;
pub mod translate;

pub use controller::{ControllerSettings, CurtainController, CurtainHandle, CurtainStatus};
pub use motion::{move_direction, move_duration, LimitSwitch, MoveOutcome, StopReason, TravelSettings};
pub use service::CurtainService;
pub use translate::SwitchTranslator;

use crate::gpio::{PinId, WatcherError};

#[derive(Debug, thiserror::Error)]
pub enum CurtainError {
    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),

    /// An edge from a pin that is neither limit switch reached the
    /// hard-stop step
    #[error("Unrecognized hard stop on gpio {0}")]
    UnknownHardStop(PinId),

    #[error("Target position {0} is outside [0, 1]")]
    InvalidTarget(f64),

    #[error("Curtain controller is closed")]
    Closed,

    #[error("Task failed: {0}")]
    Task(String),
}
