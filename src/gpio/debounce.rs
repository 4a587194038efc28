use rppal::gpio::Level;
use tokio::time::{Duration, Instant};

/// Suppresses contact bounce on a single input.
///
/// The first level pushed always passes and becomes the baseline. A level
/// equal to the baseline never passes. A different level passes only once the
/// quiet window has elapsed since the last emission; suppressed pushes leave
/// the baseline untouched.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet_window: Duration,
    last_emit: Option<(Instant, Level)>,
}

impl Debouncer {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            last_emit: None,
        }
    }

    pub fn quiet_window(&self) -> Duration {
        self.quiet_window
    }

    /// Level of the last emission, if any.
    pub fn baseline(&self) -> Option<Level> {
        self.last_emit.map(|(_, level)| level)
    }

    pub fn push(&mut self, level: Level) -> bool {
        self.push_at(level, Instant::now())
    }

    pub fn push_at(&mut self, level: Level, now: Instant) -> bool {
        match self.last_emit {
            None => {
                self.last_emit = Some((now, level));
                true
            }
            Some((_, last_level)) if last_level == level => false,
            Some((last_time, _)) => {
                if now.saturating_duration_since(last_time) > self.quiet_window {
                    self.last_emit = Some((now, level));
                    true
                } else {
                    false
                }
            }
        }
    }
}
