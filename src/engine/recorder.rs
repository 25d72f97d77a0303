use std::sync::Arc;

use chrono::Utc;

use crate::controlplane::ControlPlane;
use crate::error::{PlacedError, Result};
use crate::model::{AuditEvent, Node, WorkUnit};

pub const REASON_SCHEDULED: &str = "Scheduled";

/// Emits the audit trail for committed placements.
///
/// Best-effort by contract: the binding is already authoritative when this
/// runs, so a failed event is logged by the caller and nothing is rolled
/// back.
pub struct Recorder {
    control_plane: Arc<dyn ControlPlane>,
    source: String,
}

impl Recorder {
    pub fn new(control_plane: Arc<dyn ControlPlane>, source: impl Into<String>) -> Self {
        Self {
            control_plane,
            source: source.into(),
        }
    }

    pub async fn record(&self, unit: &WorkUnit, node: &Node) -> Result<()> {
        let now = Utc::now();
        let event = AuditEvent {
            involved: unit.reference(),
            reason: REASON_SCHEDULED.to_string(),
            message: format!(
                "Placed work unit [{}] on {}",
                unit.qualified_name(),
                node.name
            ),
            first_timestamp: now,
            last_timestamp: now,
            kind: "Normal".to_string(),
            source: self.source.clone(),
        };
        self.control_plane
            .create_event(&event)
            .await
            .map_err(|err| PlacedError::Record(err.to_string()))
    }
}
