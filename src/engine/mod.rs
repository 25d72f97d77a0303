mod committer;
mod policy;
mod queue;
mod recorder;

pub use committer::Committer;
pub use policy::{SelectionPolicy, UniformRandom};
pub use queue::{QueueClosed, WorkQueue, WorkReceiver, WorkSender};
pub use recorder::{Recorder, REASON_SCHEDULED};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::controlplane::ControlPlane;
use crate::error::BindError;
use crate::mirror::NodeMirror;
use crate::model::WorkUnit;

#[derive(Default)]
struct StatsInner {
    observed: AtomicU64,
    bound: AtomicU64,
    no_fit: AtomicU64,
    bind_conflicts: AtomicU64,
    bind_failures: AtomicU64,
    record_failures: AtomicU64,
}

/// Shared counters over the engine's per-unit outcomes. Cheap to clone and
/// safe to read while the loop runs.
#[derive(Clone, Default)]
pub struct EngineStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub observed: u64,
    pub bound: u64,
    pub no_fit: u64,
    pub bind_conflicts: u64,
    pub bind_failures: u64,
    pub record_failures: u64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            observed: self.inner.observed.load(Ordering::Relaxed),
            bound: self.inner.bound.load(Ordering::Relaxed),
            no_fit: self.inner.no_fit.load(Ordering::Relaxed),
            bind_conflicts: self.inner.bind_conflicts.load(Ordering::Relaxed),
            bind_failures: self.inner.bind_failures.load(Ordering::Relaxed),
            record_failures: self.inner.record_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The single sequential consumer of the intake queue.
///
/// One unit at a time: snapshot the node view, let the policy pick a
/// target, commit the binding, record the outcome. Every per-unit failure
/// is terminal for that unit in this pass — logged, counted, and the loop
/// moves on. Nothing is requeued.
pub struct AssignmentEngine {
    mirror: NodeMirror,
    policy: Box<dyn SelectionPolicy>,
    committer: Committer,
    recorder: Recorder,
    stats: EngineStats,
}

impl AssignmentEngine {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        mirror: NodeMirror,
        config: &EngineConfig,
    ) -> Self {
        Self {
            mirror,
            policy: Box::new(UniformRandom),
            committer: Committer::new(control_plane.clone()),
            recorder: Recorder::new(control_plane, config.engine_name.clone()),
            stats: EngineStats::new(),
        }
    }

    /// Swap the selection strategy; used by tests and future policies.
    pub fn with_policy(mut self, policy: Box<dyn SelectionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Handle to the outcome counters, valid before and during `run`.
    pub fn stats(&self) -> EngineStats {
        self.stats.clone()
    }

    /// Consume the queue until cancelled or until every producer is gone.
    pub async fn run(mut self, mut queue: WorkReceiver, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("assignment loop stopping");
                    return;
                }
                unit = queue.pop() => match unit {
                    None => {
                        tracing::info!("intake queue closed, assignment loop stopping");
                        return;
                    }
                    Some(unit) => self.process(unit).await,
                },
            }
        }
    }

    /// One pass for one unit: Observed → Selecting → Binding → Recording.
    async fn process(&mut self, unit: WorkUnit) {
        EngineStats::bump(&self.stats.inner.observed);
        tracing::info!(unit = %unit.qualified_name(), "processing work unit");

        let nodes = self.mirror.snapshot().await;
        let Some(index) = self.policy.select(&nodes) else {
            tracing::warn!(
                unit = %unit.qualified_name(),
                nodes = nodes.len(),
                "no node fits, dropping unit for this pass"
            );
            EngineStats::bump(&self.stats.inner.no_fit);
            return;
        };
        let node = &nodes[index];

        match self.committer.bind(&unit, node).await {
            Err(BindError::AlreadyBound { .. }) => {
                tracing::warn!(
                    unit = %unit.qualified_name(),
                    "unit already bound by another actor, dropping"
                );
                EngineStats::bump(&self.stats.inner.bind_conflicts);
            }
            Err(err) => {
                tracing::warn!(
                    unit = %unit.qualified_name(),
                    node = %node.name,
                    error = %err,
                    "bind failed, dropping unit without retry"
                );
                EngineStats::bump(&self.stats.inner.bind_failures);
            }
            Ok(binding) => {
                EngineStats::bump(&self.stats.inner.bound);
                if let Err(err) = self.recorder.record(&unit, node).await {
                    // The binding stands; only the audit trail is missing.
                    tracing::warn!(
                        unit = %unit.qualified_name(),
                        error = %err,
                        "audit event creation failed"
                    );
                    EngineStats::bump(&self.stats.inner.record_failures);
                }
                tracing::info!(
                    unit = %unit.qualified_name(),
                    node = %binding.node_name,
                    "work unit placed"
                );
            }
        }
    }
}
