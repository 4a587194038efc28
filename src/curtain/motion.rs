use statum::{machine, state};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::motor::{Direction, MotorDriver};

/// The two ends of the curtain's travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitSwitch {
    /// Left switch, fully closed
    Closed,
    /// Right switch, fully open
    Open,
}

impl LimitSwitch {
    /// The exact position at which this switch sits.
    pub fn position(self) -> f64 {
        match self {
            LimitSwitch::Closed => 0.0,
            LimitSwitch::Open => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// The travel timer ran out before any switch fired
    Timeout,
    HardStop(LimitSwitch),
}

/// Result reported back to a `move_to` caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub position: f64,
    pub stopped_by: StopReason,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct TravelSettings {
    pub full_travel: Duration,
    pub settle: Duration,
}

impl Default for TravelSettings {
    fn default() -> Self {
        Self {
            full_travel: Duration::from_secs(30),
            settle: Duration::from_millis(500),
        }
    }
}

/// Motion currently being executed.
#[derive(Debug, Clone)]
pub struct ActiveMove {
    pub target: f64,
    pub direction: Direction,
    pub timeout: Duration,
    pub started: Instant,
}

/// Picks the rotation for a move from `position` towards `target`.
///
/// At either limit the rotation is fixed regardless of `target`: clockwise
/// when sitting on the open limit, counterclockwise on the closed limit.
pub fn move_direction(position: f64, target: f64) -> Direction {
    if position == 1.0 {
        return Direction::Clockwise;
    }
    if position == 0.0 {
        return Direction::Counterclockwise;
    }
    if target > position {
        Direction::Clockwise
    } else {
        Direction::Counterclockwise
    }
}

/// Open-loop travel time budget for a move.
pub fn move_duration(position: f64, target: f64, full_travel: Duration) -> Duration {
    full_travel.mul_f64((target - position).abs())
}

#[state]
#[derive(Debug, Clone)]
pub enum MotionState {
    Idle,
    Moving(ActiveMove),
}

#[machine]
#[derive(Debug)]
pub struct Motion<S: MotionState> {
    motor: MotorDriver,

    // Open-loop estimate, exact only right after a hard stop
    position: f64,

    travel: TravelSettings,
}

impl<S: MotionState> Motion<S> {
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn motor_direction(&self) -> Direction {
        self.motor.direction()
    }

    pub fn settle_delay(&self) -> Duration {
        self.travel.settle
    }
}

impl Motion<Idle> {
    pub fn create(mut motor: MotorDriver, travel: TravelSettings, position: f64) -> Self {
        motor.stop();
        debug!("Motion created at position {:.3} with {:?}", position, travel);
        Self::new(motor, position, travel)
    }

    /// Hard stop while no motion is in flight, e.g. a switch pressed by hand.
    pub fn correct(&mut self, limit: LimitSwitch) {
        self.position = limit.position();
        info!("Position updated from idle hard stop {:?}, new position = {:.3}", limit, self.position);
    }

    /// Starts the motor towards `target` and arms the travel budget.
    pub fn begin(mut self, target: f64) -> Motion<Moving> {
        let direction = move_direction(self.position, target);
        let timeout = move_duration(self.position, target, self.travel.full_travel);

        info!(
            "Moving {:?} from {:.3} to {:.3}, budget {:?}",
            direction, self.position, target, timeout
        );
        self.motor.drive(direction);

        self.transition_with(ActiveMove {
            target,
            direction,
            timeout,
            started: Instant::now(),
        })
    }

    /// Parks the motor, used on shutdown.
    pub fn halt(&mut self) {
        self.motor.stop();
    }
}

impl Motion<Moving> {
    pub fn active(&self) -> Option<&ActiveMove> {
        self.get_state_data()
    }

    pub fn timeout(&self) -> Duration {
        self.active().map(|active| active.timeout).unwrap_or_default()
    }

    /// Stops the motor and reckons the position.
    ///
    /// A hard stop pins the position to its limit; a timeout leaves the
    /// estimate where it was.
    pub fn finish(mut self, reached: Option<LimitSwitch>) -> (Motion<Idle>, MoveOutcome) {
        self.motor.stop();

        let elapsed = self
            .active()
            .map(|active| active.started.elapsed())
            .unwrap_or_default();

        let stopped_by = match reached {
            Some(limit) => {
                self.position = limit.position();
                info!("Position updated from hard stop {:?}, new position = {:.3}", limit, self.position);
                StopReason::HardStop(limit)
            }
            None => {
                warn!("Travel budget ran out after {:?}, position stays {:.3}", elapsed, self.position);
                StopReason::Timeout
            }
        };

        let outcome = MoveOutcome {
            position: self.position,
            stopped_by,
            elapsed,
        };
        (self.transition(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::OutputLine;
    use rppal::gpio::Level;

    struct Sink;

    impl OutputLine for Sink {
        fn set_level(&mut self, _level: Level) {}
    }

    fn motion(position: f64) -> Motion<Idle> {
        let motor = MotorDriver::new(Box::new(Sink), Box::new(Sink), Level::Low);
        Motion::create(motor, TravelSettings::default(), position)
    }

    #[test]
    fn test_direction_at_limits_ignores_target() {
        assert_eq!(move_direction(1.0, 0.0), Direction::Clockwise);
        assert_eq!(move_direction(1.0, 1.0), Direction::Clockwise);
        assert_eq!(move_direction(0.0, 1.0), Direction::Counterclockwise);
        assert_eq!(move_direction(0.0, 0.0), Direction::Counterclockwise);
    }

    #[test]
    fn test_direction_between_limits_follows_target() {
        assert_eq!(move_direction(0.4, 0.9), Direction::Clockwise);
        assert_eq!(move_direction(0.4, 0.1), Direction::Counterclockwise);
        assert_eq!(move_direction(0.4, 0.4), Direction::Counterclockwise);
    }

    #[test]
    fn test_duration_scales_with_distance() {
        let full = Duration::from_secs(30);
        assert_eq!(move_duration(0.0, 1.0, full), full);
        assert_eq!(move_duration(1.0, 0.0, full), full);
        assert_eq!(move_duration(0.25, 0.75, full), Duration::from_secs(15));
        assert_eq!(move_duration(0.5, 0.5, full), Duration::ZERO);
    }

    #[test]
    fn test_timeout_keeps_position() {
        let moving = motion(0.0).begin(1.0);
        assert_eq!(moving.motor_direction(), Direction::Counterclockwise);
        assert_eq!(moving.timeout(), Duration::from_secs(30));

        let (idle, outcome) = moving.finish(None);
        assert_eq!(outcome.stopped_by, StopReason::Timeout);
        assert_eq!(outcome.position, 0.0);
        assert_eq!(idle.position(), 0.0);
        assert_eq!(idle.motor_direction(), Direction::Stop);
    }

    #[test]
    fn test_hard_stop_pins_position() {
        let (idle, outcome) = motion(0.3).begin(1.0).finish(Some(LimitSwitch::Open));
        assert_eq!(outcome.stopped_by, StopReason::HardStop(LimitSwitch::Open));
        assert_eq!(idle.position(), 1.0);
        assert_eq!(idle.motor_direction(), Direction::Stop);
    }

    #[test]
    fn test_idle_correction() {
        let mut idle = motion(0.6);
        idle.correct(LimitSwitch::Closed);
        assert_eq!(idle.position(), 0.0);
        assert_eq!(idle.motor_direction(), Direction::Stop);
    }
}
