//! Two-terminal motor bridge driver
//!
//! The bridge has a left and a right input. Stop parks both on the inactive
//! level; a rotation drives exactly one of them active.

use std::fmt;

use rppal::gpio::Level;
use tracing::debug;

/// A digital output driving one bridge terminal.
pub trait OutputLine: Send {
    fn set_level(&mut self, level: Level);
}

impl OutputLine for rppal::gpio::OutputPin {
    fn set_level(&mut self, level: Level) {
        self.write(level);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Stop,
    Clockwise,
    Counterclockwise,
}

pub struct MotorDriver {
    left: Box<dyn OutputLine>,
    right: Box<dyn OutputLine>,
    active: Level,
    direction: Direction,
}

impl fmt::Debug for MotorDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorDriver")
            .field("active", &self.active)
            .field("direction", &self.direction)
            .finish()
    }
}

impl MotorDriver {
    /// Builds the driver and parks the bridge in the stop state.
    pub fn new(left: Box<dyn OutputLine>, right: Box<dyn OutputLine>, active: Level) -> Self {
        let mut driver = Self {
            left,
            right,
            active,
            direction: Direction::Stop,
        };
        driver.drive(Direction::Stop);
        driver
    }

    /// Last commanded direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn drive(&mut self, direction: Direction) {
        let active = self.active;
        let inactive = match active {
            Level::Low => Level::High,
            Level::High => Level::Low,
        };

        let (left, right) = match direction {
            Direction::Stop => (inactive, inactive),
            Direction::Clockwise => (active, inactive),
            Direction::Counterclockwise => (inactive, active),
        };

        self.left.set_level(left);
        self.right.set_level(right);
        self.direction = direction;
        debug!("Motor {:?} (left={:?}, right={:?})", direction, left, right);
    }

    pub fn stop(&mut self) {
        self.drive(Direction::Stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Probe(Arc<Mutex<Vec<Level>>>);

    impl OutputLine for Probe {
        fn set_level(&mut self, level: Level) {
            self.0.lock().unwrap().push(level);
        }
    }

    impl Probe {
        fn last(&self) -> Option<Level> {
            self.0.lock().unwrap().last().copied()
        }
    }

    #[test]
    fn test_new_driver_starts_stopped() {
        let (left, right) = (Probe::default(), Probe::default());
        let motor = MotorDriver::new(Box::new(left.clone()), Box::new(right.clone()), Level::Low);

        assert_eq!(motor.direction(), Direction::Stop);
        assert_eq!(left.last(), Some(Level::High));
        assert_eq!(right.last(), Some(Level::High));
    }

    #[test]
    fn test_active_low_bridge() {
        let (left, right) = (Probe::default(), Probe::default());
        let mut motor = MotorDriver::new(Box::new(left.clone()), Box::new(right.clone()), Level::Low);

        motor.drive(Direction::Clockwise);
        assert_eq!((left.last(), right.last()), (Some(Level::Low), Some(Level::High)));

        motor.drive(Direction::Counterclockwise);
        assert_eq!((left.last(), right.last()), (Some(Level::High), Some(Level::Low)));

        motor.stop();
        assert_eq!((left.last(), right.last()), (Some(Level::High), Some(Level::High)));
        assert_eq!(motor.direction(), Direction::Stop);
    }

    #[test]
    fn test_active_high_bridge_and_repeated_command() {
        let (left, right) = (Probe::default(), Probe::default());
        let mut motor = MotorDriver::new(Box::new(left.clone()), Box::new(right.clone()), Level::High);
        assert_eq!(left.last(), Some(Level::Low));

        motor.drive(Direction::Clockwise);
        motor.drive(Direction::Clockwise);
        assert_eq!((left.last(), right.last()), (Some(Level::High), Some(Level::Low)));
        assert_eq!(left.0.lock().unwrap().len(), 3);
        assert_eq!(motor.direction(), Direction::Clockwise);
    }
}
