//! Curtain Service - wiring and lifecycle of the curtain pipeline
//!
//! Starts the pin watcher, registers both limit switches, and spawns the
//! switch translator and the controller. Every task reports how it ended on a
//! shared exit channel so [`CurtainService::wait`] can surface the first
//! fatal error.
//!
//! Shutdown runs back to front: the controller finishes any motion in flight
//! while hard stops still flow, then the translator stops, then the watcher
//! releases its inputs.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CurtainController, CurtainError, CurtainHandle, SwitchTranslator};
use crate::config::CurtainConfig;
use crate::gpio::{EdgeBackend, PinWatcher, WatcherError};
use crate::motor::MotorDriver;

const HARD_STOP_CAPACITY: usize = 16;

type TaskExit = (&'static str, Result<(), CurtainError>);

pub struct CurtainService<B: EdgeBackend> {
    handle: CurtainHandle,
    watcher: PinWatcher<B>,
    controller_cancel: CancellationToken,
    translator_cancel: CancellationToken,
    controller_task: JoinHandle<()>,
    translator_task: JoinHandle<()>,
    exits: mpsc::Receiver<TaskExit>,
}

impl<B: EdgeBackend> CurtainService<B> {
    pub async fn start(config: &CurtainConfig, backend: B, motor: MotorDriver) -> Result<Self, CurtainError> {
        info!("Starting curtain service");

        let (watcher, edges) = PinWatcher::spawn(backend, config.watcher.settings())?;
        for pin in [config.pins.switch_left, config.pins.switch_right] {
            if let Err(e) = watcher.add_pin(pin).await {
                error!("Failed to watch limit switch on gpio {}: {}", pin, e);
                let _ = watcher.close().await;
                return Err(e.into());
            }
        }

        let (exit_tx, exits) = mpsc::channel(2);
        let (stop_tx, stop_rx) = mpsc::channel(HARD_STOP_CAPACITY);

        let translator = SwitchTranslator::new(
            config.pins.switch_left,
            config.pins.switch_right,
            config.switches.active_level.level(),
            Duration::from_millis(config.switches.debounce_ms),
            stop_tx,
        );
        let translator_cancel = CancellationToken::new();
        let translator_task = spawn_reporting("translator", exit_tx.clone(), {
            let cancel = translator_cancel.clone();
            async move { translator.run(edges, cancel).await }
        });

        let controller_cancel = CancellationToken::new();
        let (controller, handle) = CurtainController::new(
            motor,
            config.motion.controller_settings(),
            stop_rx,
            controller_cancel.clone(),
        );
        let controller_task = spawn_reporting("controller", exit_tx, controller.run());

        info!("Curtain service running");
        Ok(Self {
            handle,
            watcher,
            controller_cancel,
            translator_cancel,
            controller_task,
            translator_task,
            exits,
        })
    }

    pub fn handle(&self) -> CurtainHandle {
        self.handle.clone()
    }

    /// Waits until any task of the service ends and returns how it ended.
    pub async fn wait(&mut self) -> Result<(), CurtainError> {
        match self.exits.recv().await {
            Some((name, Ok(()))) => {
                warn!("Curtain {} task finished", name);
                Ok(())
            }
            Some((name, Err(e))) => {
                error!("Curtain {} task failed: {}", name, e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Stops every task, parks the motor and releases all watched inputs.
    /// Later `move_to` calls fail with [`CurtainError::Closed`].
    pub async fn close(mut self) -> Result<(), CurtainError> {
        info!("Closing curtain service");

        self.controller_cancel.cancel();
        if let Err(e) = (&mut self.controller_task).await {
            error!("Controller task panicked: {}", e);
        }
        self.translator_cancel.cancel();
        if let Err(e) = (&mut self.translator_task).await {
            error!("Translator task panicked: {}", e);
        }

        match self.watcher.close().await {
            Ok(()) | Err(WatcherError::Closed) => {}
            Err(e) => return Err(e.into()),
        }

        let mut result = Ok(());
        while let Ok((name, exit)) = self.exits.try_recv() {
            debug!("Curtain {} task exit: {:?}", name, exit);
            if let (Err(e), true) = (exit, result.is_ok()) {
                result = Err(e);
            }
        }
        info!("Curtain service closed");
        result
    }
}

fn spawn_reporting<F>(name: &'static str, exits: mpsc::Sender<TaskExit>, task: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = Result<(), CurtainError>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = task.await;
        if exits.send((name, result)).await.is_err() {
            debug!("Curtain service dropped before {} task exit", name);
        }
    })
}
