#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use curtaind::gpio::{EdgeBackend, Level, PinId, ValueSource, WatcherError, WatcherSettings};
use curtaind::motor::{Direction, MotorDriver, OutputLine};

#[derive(Default)]
struct FakeState {
    /// Current value byte per pin, `None` once unplugged
    values: HashMap<PinId, Option<u8>>,
    pending: HashSet<PinId>,
    failing: HashSet<PinId>,
    open_handles: usize,
}

/// In-memory stand-in for the sysfs tree. Every level change marks the pin
/// ready for the next multiplexed wait, like a kernel edge interrupt.
#[derive(Clone, Default)]
pub struct FakeGpio {
    shared: Arc<(Mutex<FakeState>, Condvar)>,
}

impl FakeGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&self, pin: PinId, level: Level) {
        let byte = match level {
            Level::Low => b'0',
            Level::High => b'1',
        };
        self.set_raw(pin, Some(byte));
    }

    pub fn set_raw(&self, pin: PinId, byte: Option<u8>) {
        let (state, ready) = &*self.shared;
        let mut state = state.lock().unwrap();
        state.values.insert(pin, byte);
        state.pending.insert(pin);
        ready.notify_all();
    }

    /// The value file starts reporting end-of-stream.
    pub fn unplug(&self, pin: PinId) {
        self.set_raw(pin, None);
    }

    pub fn fail_pin(&self, pin: PinId) {
        self.shared.0.lock().unwrap().failing.insert(pin);
    }

    pub fn open_handles(&self) -> usize {
        self.shared.0.lock().unwrap().open_handles
    }

    /// Polls until the open handle count reaches `expected`.
    pub async fn wait_for_handles(&self, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.open_handles() != expected {
            assert!(Instant::now() < deadline, "open handles stuck at {}", self.open_handles());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub struct FakeValue {
    pin: PinId,
    shared: Arc<(Mutex<FakeState>, Condvar)>,
}

impl ValueSource for FakeValue {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut state = self.shared.0.lock().unwrap();
        state.pending.remove(&self.pin);
        Ok(state.values.get(&self.pin).copied().flatten())
    }
}

impl Drop for FakeValue {
    fn drop(&mut self) {
        let mut state = self.shared.0.lock().unwrap();
        state.open_handles -= 1;
    }
}

impl EdgeBackend for FakeGpio {
    type Value = FakeValue;

    fn open(&self, pin: PinId) -> Result<FakeValue, WatcherError> {
        let (state, ready) = &*self.shared;
        let mut state = state.lock().unwrap();
        if state.failing.contains(&pin) {
            return Err(WatcherError::Open {
                pin,
                source: io::Error::new(io::ErrorKind::NotFound, "no such gpio"),
            });
        }
        // inputs idle high behind their pull-ups
        state.values.entry(pin).or_insert(Some(b'1'));
        state.pending.insert(pin);
        state.open_handles += 1;
        ready.notify_all();
        Ok(FakeValue {
            pin,
            shared: self.shared.clone(),
        })
    }

    fn wait(&self, values: &[&FakeValue], timeout: Duration) -> Result<Vec<usize>, WatcherError> {
        let (state, ready) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut state = state.lock().unwrap();
        loop {
            let hits: Vec<usize> = values
                .iter()
                .enumerate()
                .filter(|(_, value)| state.pending.contains(&value.pin))
                .map(|(index, _)| index)
                .collect();
            if !hits.is_empty() {
                return Ok(hits);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            state = ready.wait_timeout(state, deadline - now).unwrap().0;
        }
    }
}

pub fn fast_settings() -> WatcherSettings {
    WatcherSettings {
        wake_interval: Duration::from_millis(20),
        ..WatcherSettings::default()
    }
}

/// Motor output that appends `(time, level)` to a log shared by both
/// terminals. The driver always writes left then right.
#[derive(Clone)]
pub struct RecordingLine {
    log: Arc<Mutex<Vec<(tokio::time::Instant, Level)>>>,
}

impl OutputLine for RecordingLine {
    fn set_level(&mut self, level: Level) {
        self.log.lock().unwrap().push((tokio::time::Instant::now(), level));
    }
}

#[derive(Clone)]
pub struct MotorLog {
    log: Arc<Mutex<Vec<(tokio::time::Instant, Level)>>>,
}

impl MotorLog {
    /// Commands issued to an active-low bridge, decoded per left/right pair.
    pub fn commands(&self) -> Vec<(tokio::time::Instant, Direction)> {
        self.log
            .lock()
            .unwrap()
            .chunks(2)
            .map(|pair| {
                let direction = match (pair[0].1, pair[1].1) {
                    (Level::High, Level::High) => Direction::Stop,
                    (Level::Low, Level::High) => Direction::Clockwise,
                    (Level::High, Level::Low) => Direction::Counterclockwise,
                    (Level::Low, Level::Low) => panic!("both bridge terminals active"),
                };
                (pair[0].0, direction)
            })
            .collect()
    }

    /// Rotations only, without the stop commands in between.
    pub fn rotations(&self) -> Vec<(tokio::time::Instant, Direction)> {
        self.commands()
            .into_iter()
            .filter(|(_, direction)| *direction != Direction::Stop)
            .collect()
    }

    pub fn last(&self) -> Option<Direction> {
        self.commands().last().map(|(_, direction)| *direction)
    }
}

pub fn recording_motor() -> (MotorDriver, MotorLog) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let line = RecordingLine { log: log.clone() };
    let motor = MotorDriver::new(Box::new(line.clone()), Box::new(line), Level::Low);
    (motor, MotorLog { log })
}
