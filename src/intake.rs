use std::sync::Arc;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backoff::{sleep_or_cancelled, Backoff};
use crate::config::{BackoffConfig, EngineConfig};
use crate::controlplane::{ControlPlane, RawEventStream, WorkUnitFilter};
use crate::engine::WorkSender;
use crate::error::Result;
use crate::model::{EventKind, RawEvent, WorkUnit};

enum IntakeTurn {
    Cancelled,
    Dropped,
    QueueClosed,
}

/// Subscribes to work-unit notifications and feeds eligible units into the
/// bounded intake queue.
///
/// The watch is scoped server-side by [`WorkUnitFilter`]; the eligibility
/// predicate is re-checked here before a unit is queued. Pushing into a
/// full queue blocks this task — backpressure, never a silent drop.
/// Malformed payloads and non-ADD notifications are discarded.
pub struct EventIntake {
    control_plane: Arc<dyn ControlPlane>,
    filter: WorkUnitFilter,
    queue: WorkSender,
    backoff: BackoffConfig,
}

impl EventIntake {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        config: &EngineConfig,
        queue: WorkSender,
    ) -> Self {
        Self {
            control_plane,
            filter: WorkUnitFilter::for_engine(config.engine_name.as_str()),
            queue,
            backoff: config.backoff.clone(),
        }
    }

    /// Run the subscription until cancelled or the consumer goes away.
    ///
    /// As with the node mirror, only the initial subscription failure is
    /// fatal; later drops resubscribe with backoff.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut backoff = Backoff::new(self.backoff.clone());
        let mut established = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let stream = match self.control_plane.watch_work_units(&self.filter).await {
                Ok(stream) => stream,
                Err(err) if !established => {
                    tracing::error!(error = %err, "initial work unit subscription failed");
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!(error = %err, "work unit resubscription failed, backing off");
                    if sleep_or_cancelled(backoff.next_delay(), &cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };
            established = true;
            backoff.reset();
            tracing::info!(engine = %self.filter.engine, "work unit watch established");

            match self.consume(stream, &cancel).await {
                IntakeTurn::Cancelled | IntakeTurn::QueueClosed => return Ok(()),
                IntakeTurn::Dropped => {
                    tracing::warn!("work unit watch dropped, resubscribing");
                    if sleep_or_cancelled(backoff.next_delay(), &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn consume(&self, mut stream: RawEventStream, cancel: &CancellationToken) -> IntakeTurn {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return IntakeTurn::Cancelled,
                event = stream.next() => match event {
                    None => return IntakeTurn::Dropped,
                    Some(event) => {
                        if let Some(turn) = self.admit(event, cancel).await {
                            return turn;
                        }
                    }
                },
            }
        }
    }

    /// Returns Some when the intake loop should stop.
    async fn admit(&self, event: RawEvent, cancel: &CancellationToken) -> Option<IntakeTurn> {
        if event.kind != EventKind::Added {
            tracing::trace!(kind = %event.kind, "ignoring non-add notification");
            return None;
        }

        let unit: WorkUnit = match event.decode() {
            Ok(unit) => unit,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed work unit notification");
                return None;
            }
        };

        if !self.filter.matches(&unit) {
            tracing::debug!(
                unit = %unit.qualified_name(),
                engine = %unit.engine,
                placed = unit.is_placed(),
                "notification fails eligibility, discarding"
            );
            return None;
        }

        tracing::info!(unit = %unit.qualified_name(), "observed work unit awaiting placement");
        tokio::select! {
            _ = cancel.cancelled() => Some(IntakeTurn::Cancelled),
            pushed = self.queue.push(unit) => match pushed {
                Ok(()) => None,
                Err(_) => {
                    tracing::info!("intake queue closed, stopping intake");
                    Some(IntakeTurn::QueueClosed)
                }
            },
        }
    }
}
