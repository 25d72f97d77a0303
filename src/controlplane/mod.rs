//! The seam between this engine and the cluster control plane.
//!
//! Everything the assignment loop needs from the outside world goes through
//! the [`ControlPlane`] trait: list/watch for nodes, a filtered watch for
//! work units, the create-only binding request, and audit event creation.
//! The control plane owns every object; this engine only observes and
//! submits create requests.

mod memory;

pub use memory::{BindFault, InMemoryControlPlane};

use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::error::{BindError, TransportError};
use crate::model::{AuditEvent, Binding, Node, RawEvent, WorkUnit};

/// A watch subscription. Termination of the stream means the subscription
/// was dropped; the consumer decides whether and how to resubscribe.
pub type RawEventStream = Pin<Box<dyn Stream<Item = RawEvent> + Send>>;

/// Server-side scoping for the work-unit watch: units that ask for this
/// engine by name and, usually, have no placement yet.
#[derive(Debug, Clone)]
pub struct WorkUnitFilter {
    pub engine: String,
    pub unplaced_only: bool,
}

impl WorkUnitFilter {
    pub fn for_engine(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            unplaced_only: true,
        }
    }

    /// The eligibility predicate. Applied server-side where the transport
    /// supports it, and re-checked client-side by the intake.
    pub fn matches(&self, unit: &WorkUnit) -> bool {
        unit.wants_engine(&self.engine) && (!self.unplaced_only || !unit.is_placed())
    }
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, TransportError>;

    async fn watch_nodes(&self) -> Result<RawEventStream, TransportError>;

    async fn watch_work_units(
        &self,
        filter: &WorkUnitFilter,
    ) -> Result<RawEventStream, TransportError>;

    /// Create-only: must fail with `AlreadyBound` if the unit already has a
    /// placement, never overwrite one.
    async fn create_binding(&self, binding: &Binding) -> Result<(), BindError>;

    async fn create_event(&self, event: &AuditEvent) -> Result<(), TransportError>;
}
