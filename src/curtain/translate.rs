use std::collections::HashMap;

use rppal::gpio::Level;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CurtainError, LimitSwitch};
use crate::gpio::{Debouncer, PinEdge, PinEdges, PinId};

/// Turns raw pin edges into hard-stop events.
///
/// Each switch pin gets its own debouncer. Only a debounced transition to the
/// active level is forwarded; releases are swallowed.
pub struct SwitchTranslator {
    switches: HashMap<PinId, (LimitSwitch, Debouncer)>,
    active_level: Level,
    hard_stops: mpsc::Sender<LimitSwitch>,
}

impl SwitchTranslator {
    pub fn new(
        closed_pin: PinId,
        open_pin: PinId,
        active_level: Level,
        debounce: Duration,
        hard_stops: mpsc::Sender<LimitSwitch>,
    ) -> Self {
        let mut switches = HashMap::new();
        switches.insert(closed_pin, (LimitSwitch::Closed, Debouncer::new(debounce)));
        switches.insert(open_pin, (LimitSwitch::Open, Debouncer::new(debounce)));
        Self {
            switches,
            active_level,
            hard_stops,
        }
    }

    /// Filters one edge. An edge from a pin that is not a limit switch is an
    /// invariant violation.
    pub fn translate_at(&mut self, edge: &PinEdge, now: Instant) -> Result<Option<LimitSwitch>, CurtainError> {
        let (limit, debouncer) = self
            .switches
            .get_mut(&edge.pin)
            .ok_or(CurtainError::UnknownHardStop(edge.pin))?;

        if !debouncer.push_at(edge.level, now) {
            debug!("gpio {} level {:?} suppressed by debouncer", edge.pin, edge.level);
            return Ok(None);
        }
        if edge.level != self.active_level {
            debug!("{:?} switch released at {}", limit, edge.timestamp.format("%H:%M:%S.%3f"));
            return Ok(None);
        }

        info!("{:?} switch hit at {}", limit, edge.timestamp.format("%H:%M:%S.%3f"));
        Ok(Some(*limit))
    }

    pub async fn run(mut self, mut edges: PinEdges, cancel: CancellationToken) -> Result<(), CurtainError> {
        info!("Switch translator started");
        loop {
            let edge = tokio::select! {
                _ = cancel.cancelled() => break,
                edge = edges.watch() => edge?,
            };
            let Some(edge) = edge else {
                warn!("Edge stream ended, switch translator stopping");
                break;
            };

            if let Some(limit) = self.translate_at(&edge, Instant::now())? {
                if self.hard_stops.send(limit).await.is_err() {
                    debug!("Controller is gone, switch translator stopping");
                    break;
                }
            }
        }
        info!("Switch translator finished");
        Ok(())
    }
}
