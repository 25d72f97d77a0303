use std::sync::Arc;

use crate::controlplane::ControlPlane;
use crate::error::BindError;
use crate::model::{Binding, Node, WorkUnit};

/// Commits placements through the create-only binding request.
///
/// Success is authoritative and owned by the control plane; this side never
/// retries and never overwrites. A unit bound concurrently by another actor
/// surfaces as `AlreadyBound`.
pub struct Committer {
    control_plane: Arc<dyn ControlPlane>,
}

impl Committer {
    pub fn new(control_plane: Arc<dyn ControlPlane>) -> Self {
        Self { control_plane }
    }

    pub async fn bind(&self, unit: &WorkUnit, node: &Node) -> Result<Binding, BindError> {
        let binding = Binding {
            namespace: unit.namespace.clone(),
            unit_name: unit.name.clone(),
            unit_uid: unit.uid,
            node_name: node.name.clone(),
        };
        self.control_plane.create_binding(&binding).await?;
        Ok(binding)
    }
}
