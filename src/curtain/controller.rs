//! Curtain Controller - single owner of the position estimate
//!
//! The controller runs as one tokio task that multiplexes move requests from
//! [`CurtainHandle`]s and hard-stop events from the switch translator. Motions
//! are served strictly one at a time; while a motion is running the loop only
//! listens for hard stops and the travel timer. A reply is sent after the
//! motor stopped, the position was reckoned and the settle delay passed.
//!
//! ```text
//! CurtainHandle ─[MoveCommand]──┐
//!                               ├─► controller task ─► MotorDriver
//! SwitchTranslator ─[LimitSwitch]┘         │
//!                                          └─[CurtainStatus]─► watch subscribers
//! ```

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::motion::{Idle, LimitSwitch, Motion, MoveOutcome, TravelSettings};
use super::CurtainError;
use crate::motor::{Direction, MotorDriver};

#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub travel: TravelSettings,
    /// Position assumed at startup
    pub initial_position: f64,
    pub request_capacity: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            travel: TravelSettings::default(),
            initial_position: 0.0,
            request_capacity: 8,
        }
    }
}

/// Snapshot published by the controller after every state change.
#[derive(Clone, Debug, PartialEq)]
pub struct CurtainStatus {
    pub position: f64,
    /// Rotation in progress, `None` while idle
    pub moving: Option<Direction>,
    pub target: Option<f64>,
    pub last_hard_stop: Option<(LimitSwitch, DateTime<Local>)>,
}

#[derive(Debug)]
struct MoveCommand {
    target: f64,
    respond: oneshot::Sender<MoveOutcome>,
}

/// Caller side of the controller. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CurtainHandle {
    requests: mpsc::Sender<MoveCommand>,
    status: watch::Receiver<CurtainStatus>,
}

impl CurtainHandle {
    /// Moves the curtain to `target` (0 closed, 1 open) and waits until the
    /// controller has finished the whole motion cycle.
    pub async fn move_to(&self, target: f64) -> Result<MoveOutcome, CurtainError> {
        if !(0.0..=1.0).contains(&target) {
            return Err(CurtainError::InvalidTarget(target));
        }

        let (respond, outcome) = oneshot::channel();
        self.requests
            .send(MoveCommand { target, respond })
            .await
            .map_err(|_| CurtainError::Closed)?;
        outcome.await.map_err(|_| CurtainError::Closed)
    }

    pub fn status(&self) -> CurtainStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CurtainStatus> {
        self.status.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

pub struct CurtainController {
    motion: Motion<Idle>,
    inbox: Inbox,
}

struct Inbox {
    requests: mpsc::Receiver<MoveCommand>,
    hard_stops: mpsc::Receiver<LimitSwitch>,
    status: watch::Sender<CurtainStatus>,
    cancel: CancellationToken,
}

impl CurtainController {
    /// Builds the controller and the handle used to reach it. Hard stops
    /// arrive on `hard_stops`; `cancel` ends the loop between motions.
    pub fn new(
        motor: MotorDriver,
        settings: ControllerSettings,
        hard_stops: mpsc::Receiver<LimitSwitch>,
        cancel: CancellationToken,
    ) -> (Self, CurtainHandle) {
        info!("Creating curtain controller with settings: {:?}", settings);

        let (request_tx, request_rx) = mpsc::channel(settings.request_capacity.max(1));
        let (status_tx, status_rx) = watch::channel(CurtainStatus {
            position: settings.initial_position,
            moving: None,
            target: None,
            last_hard_stop: None,
        });

        let controller = Self {
            motion: Motion::create(motor, settings.travel, settings.initial_position),
            inbox: Inbox {
                requests: request_rx,
                hard_stops,
                status: status_tx,
                cancel,
            },
        };
        let handle = CurtainHandle {
            requests: request_tx,
            status: status_rx,
        };
        (controller, handle)
    }

    /// Creates the controller and runs it on its own tokio task.
    pub fn spawn(
        motor: MotorDriver,
        settings: ControllerSettings,
        hard_stops: mpsc::Receiver<LimitSwitch>,
        cancel: CancellationToken,
    ) -> (CurtainHandle, JoinHandle<Result<(), CurtainError>>) {
        let (controller, handle) = Self::new(motor, settings, hard_stops, cancel);
        let task = tokio::spawn(async move {
            let result = controller.run().await;
            if let Err(e) = &result {
                error!("Curtain controller terminated with error: {}", e);
            }
            result
        });
        debug!("Curtain controller task spawned");
        (handle, task)
    }

    pub async fn run(self) -> Result<(), CurtainError> {
        let Self { mut motion, mut inbox } = self;

        info!("Curtain controller started at position {:.3}", motion.position());
        loop {
            tokio::select! {
                biased;
                _ = inbox.cancel.cancelled() => break,
                Some(limit) = inbox.hard_stops.recv() => {
                    motion.correct(limit);
                    inbox.publish_idle(motion.position(), Some(limit));
                }
                request = inbox.requests.recv() => match request {
                    Some(request) => motion = inbox.serve(motion, request).await,
                    None => {
                        debug!("All curtain handles dropped");
                        break;
                    }
                },
            }
        }

        inbox.requests.close();
        motion.halt();
        info!("Curtain controller stopped at position {:.3}", motion.position());
        Ok(())
    }
}

impl Inbox {
    /// Runs one full motion cycle and replies to the caller.
    async fn serve(&mut self, motion: Motion<Idle>, request: MoveCommand) -> Motion<Idle> {
        let MoveCommand { target, respond } = request;

        let moving = motion.begin(target);
        let direction = moving.motor_direction();
        self.status.send_modify(|status| {
            status.moving = Some(direction);
            status.target = Some(target);
        });

        let reached = tokio::select! {
            _ = sleep(moving.timeout()) => None,
            limit = next_hard_stop(&mut self.hard_stops) => Some(limit),
        };

        let (idle, outcome) = moving.finish(reached);
        self.publish_idle(idle.position(), reached);

        sleep(idle.settle_delay()).await;

        if respond.send(outcome).is_err() {
            debug!("Move caller went away before the outcome was ready");
        }
        idle
    }

    fn publish_idle(&self, position: f64, hard_stop: Option<LimitSwitch>) {
        self.status.send_modify(|status| {
            status.position = position;
            status.moving = None;
            status.target = None;
            if let Some(limit) = hard_stop {
                status.last_hard_stop = Some((limit, Local::now()));
            }
        });
    }
}

/// Waits for the next hard stop. A closed channel never yields, so the travel
/// timer stays in charge.
async fn next_hard_stop(hard_stops: &mut mpsc::Receiver<LimitSwitch>) -> LimitSwitch {
    match hard_stops.recv().await {
        Some(limit) => limit,
        None => std::future::pending().await,
    }
}
