//! Pin Edge Watcher - multiplexed level watching over a dynamic set of inputs
//!
//! A dedicated poll thread owns every watched input. It blocks on a
//! multiplexed wait bounded by the wake interval, reads the inputs flagged
//! ready and forwards `(pin, level)` pairs to a single consumer. Registration
//! changes are queued as commands and drained between wait cycles, so the wake
//! interval bounds how long an `add_pin`/`remove_pin`/`close` call can take.
//!
//! # Overflow policy
//!
//! The edge queue is bounded and filled with `try_send`. When the consumer
//! lags, the newest edges are dropped instead of stalling the poll loop. The
//! debouncer downstream only cares about the latest stable level, and the next
//! physical edge re-reads the value file anyway.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use rppal::gpio::Level;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::{parse_level, PinId};

/// Source of a single input's current level.
pub trait ValueSource: Send + 'static {
    /// Rewinds and reads one byte. `Ok(None)` signals end-of-stream.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
}

/// Opens inputs and waits for activity across several of them at once.
///
/// `open` runs on the caller's task so resource failures surface from
/// [`PinWatcher::add_pin`]; `wait` runs on the poll thread.
pub trait EdgeBackend: Send + Sync + 'static {
    type Value: ValueSource;

    /// Exports and configures `pin`, then opens its value source.
    fn open(&self, pin: PinId) -> Result<Self::Value, WatcherError>;

    /// Blocks until at least one of `values` has a pending edge or `timeout`
    /// elapses. Returns indices into `values`.
    fn wait(&self, values: &[&Self::Value], timeout: Duration) -> Result<Vec<usize>, WatcherError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("Failed to export gpio {pin}: {source}")]
    Export { pin: PinId, source: io::Error },

    #[error("Failed to write gpio {pin} {file}: {source}")]
    Configure {
        pin: PinId,
        file: &'static str,
        source: io::Error,
    },

    #[error("Failed to open gpio {pin} value file: {source}")]
    Open { pin: PinId, source: io::Error },

    #[error("Failed to read gpio {pin} value file: {source}")]
    Read { pin: PinId, source: io::Error },

    #[error("Multiplexed wait failed: {0}")]
    Poll(io::Error),

    #[error("Read inconsistent value {byte:#04x} from gpio {pin}")]
    InvalidLevel { pin: PinId, byte: u8 },

    #[error("Failed to spawn poll thread: {0}")]
    Spawn(io::Error),

    #[error("Watcher is closed")]
    Closed,
}

/// A level observed on a watched input.
#[derive(Debug, Clone, PartialEq)]
pub struct PinEdge {
    pub pin: PinId,
    pub level: Level,
    pub timestamp: DateTime<Local>,
}

#[derive(Clone, Debug)]
pub struct WatcherSettings {
    /// Upper bound for one multiplexed wait (and the idle sleep)
    pub wake_interval: Duration,
    /// Capacity of the edge queue towards the consumer
    pub edge_capacity: usize,
    /// Capacity of the command queue towards the poll thread
    pub command_capacity: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            wake_interval: Duration::from_secs(1),
            edge_capacity: 32,
            command_capacity: 32,
        }
    }
}

enum WatcherCommand<V> {
    Add {
        pin: PinId,
        value: V,
        ack: oneshot::Sender<()>,
    },
    Remove {
        pin: PinId,
        ack: oneshot::Sender<bool>,
    },
    Close {
        ack: oneshot::Sender<()>,
    },
}

/// Command side of the watcher. Cheap to clone.
pub struct PinWatcher<B: EdgeBackend> {
    backend: Arc<B>,
    commands: mpsc::Sender<WatcherCommand<B::Value>>,
}

impl<B: EdgeBackend> Clone for PinWatcher<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            commands: self.commands.clone(),
        }
    }
}

/// Consumer side of the watcher. There is exactly one per watcher.
#[derive(Debug)]
pub struct PinEdges {
    edges: mpsc::Receiver<Result<PinEdge, WatcherError>>,
}

impl PinEdges {
    /// Next observed level. `Ok(None)` once the poll loop has stopped,
    /// `Err` if it died on a fatal error.
    pub async fn watch(&mut self) -> Result<Option<PinEdge>, WatcherError> {
        self.edges.recv().await.transpose()
    }
}

impl<B: EdgeBackend> PinWatcher<B> {
    /// Spawns the poll thread with an empty watched set.
    pub fn spawn(backend: B, settings: WatcherSettings) -> Result<(Self, PinEdges), WatcherError> {
        info!("Spawning pin watcher with settings: {:?}", settings);

        let backend = Arc::new(backend);
        let (command_tx, command_rx) = mpsc::channel(settings.command_capacity.max(1));
        let (edge_tx, edge_rx) = mpsc::channel(settings.edge_capacity.max(1));

        let poll_loop = PollLoop {
            backend: backend.clone(),
            watched: BTreeMap::new(),
            commands: command_rx,
            edges: edge_tx,
            wake_interval: settings.wake_interval,
        };

        thread::Builder::new()
            .name("pin-watcher".to_string())
            .spawn(move || poll_loop.run())
            .map_err(WatcherError::Spawn)?;

        debug!("Pin watcher thread started");
        Ok((
            Self {
                backend,
                commands: command_tx,
            },
            PinEdges { edges: edge_rx },
        ))
    }

    /// Exports, configures and opens `pin`, then registers it with the poll
    /// loop. Returns once the loop has taken ownership of the input.
    pub async fn add_pin(&self, pin: PinId) -> Result<(), WatcherError> {
        if self.commands.is_closed() {
            return Err(WatcherError::Closed);
        }
        let value = self.backend.open(pin)?;
        let (ack, done) = oneshot::channel();
        self.commands
            .send(WatcherCommand::Add { pin, value, ack })
            .await
            .map_err(|_| WatcherError::Closed)?;
        done.await.map_err(|_| WatcherError::Closed)?;
        info!("Watching gpio {}", pin);
        Ok(())
    }

    /// Deregisters and releases `pin`. Returns whether it was registered.
    pub async fn remove_pin(&self, pin: PinId) -> Result<bool, WatcherError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(WatcherCommand::Remove { pin, ack })
            .await
            .map_err(|_| WatcherError::Closed)?;
        done.await.map_err(|_| WatcherError::Closed)
    }

    /// Stops the poll loop and releases every watched input.
    pub async fn close(&self) -> Result<(), WatcherError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(WatcherCommand::Close { ack })
            .await
            .map_err(|_| WatcherError::Closed)?;
        done.await.map_err(|_| WatcherError::Closed)?;
        info!("Pin watcher closed");
        Ok(())
    }
}

struct WatchedInput<V> {
    value: V,
    last_level: Option<Level>,
}

struct PollLoop<B: EdgeBackend> {
    backend: Arc<B>,
    watched: BTreeMap<PinId, WatchedInput<B::Value>>,
    commands: mpsc::Receiver<WatcherCommand<B::Value>>,
    edges: mpsc::Sender<Result<PinEdge, WatcherError>>,
    wake_interval: Duration,
}

impl<B: EdgeBackend> PollLoop<B> {
    fn run(mut self) {
        debug!("Entering pin watcher poll loop");
        loop {
            let cycle = if self.watched.is_empty() {
                thread::sleep(self.wake_interval);
                Ok(())
            } else {
                self.wait_and_read()
            };

            if let Err(e) = cycle {
                error!("Pin watcher terminated: {}", e);
                self.release_all();
                // the consumer must learn why the stream ended
                if self.edges.blocking_send(Err(e)).is_err() {
                    warn!("Edge consumer is gone, dropping fatal watcher error");
                }
                return;
            }

            if !self.drain_commands() {
                debug!("Leaving pin watcher poll loop");
                return;
            }
        }
    }

    fn wait_and_read(&mut self) -> Result<(), WatcherError> {
        let ready: Vec<PinId> = {
            let (pins, values): (Vec<PinId>, Vec<&B::Value>) = self
                .watched
                .iter()
                .map(|(pin, input)| (*pin, &input.value))
                .unzip();
            self.backend
                .wait(&values, self.wake_interval)?
                .into_iter()
                .filter_map(|index| pins.get(index).copied())
                .collect()
        };

        for pin in ready {
            self.read_pin(pin)?;
        }
        Ok(())
    }

    fn read_pin(&mut self, pin: PinId) -> Result<(), WatcherError> {
        let Some(input) = self.watched.get_mut(&pin) else {
            return Ok(());
        };

        let byte = match input.value.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => {
                info!("gpio {} value file reached end-of-stream, removing it", pin);
                self.watched.remove(&pin);
                return Ok(());
            }
            Err(source) => return Err(WatcherError::Read { pin, source }),
        };

        let level = parse_level(byte).ok_or(WatcherError::InvalidLevel { pin, byte })?;
        debug!("gpio {} read {:?} (was {:?})", pin, level, input.last_level);
        input.last_level = Some(level);

        let edge = PinEdge {
            pin,
            level,
            timestamp: Local::now(),
        };
        match self.edges.try_send(Ok(edge)) {
            Ok(_) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Edge queue full, dropping gpio {} level {:?}", pin, level);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Edge consumer is gone, dropping gpio {} level {:?}", pin, level);
            }
        }
        Ok(())
    }

    /// Applies queued commands. Returns false once the loop should stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(WatcherCommand::Add { pin, value, ack }) => {
                    let input = WatchedInput {
                        value,
                        last_level: None,
                    };
                    if let Some(old) = self.watched.insert(pin, input) {
                        warn!("gpio {} was already watched, replaced its handle", pin);
                        drop(old);
                    }
                    let _ = ack.send(());
                }
                Ok(WatcherCommand::Remove { pin, ack }) => {
                    let removed = self.watched.remove(&pin).is_some();
                    debug!("Remove gpio {}: registered={}", pin, removed);
                    let _ = ack.send(removed);
                }
                Ok(WatcherCommand::Close { ack }) => {
                    self.commands.close();
                    self.release_all();
                    let _ = ack.send(());
                    return false;
                }
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    info!("All watcher handles dropped, shutting down poll loop");
                    self.release_all();
                    return false;
                }
            }
        }
    }

    fn release_all(&mut self) {
        let count = self.watched.len();
        self.watched.clear();
        debug!("Released {} watched inputs", count);
    }
}
