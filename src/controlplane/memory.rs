use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;

use super::{ControlPlane, RawEventStream, WorkUnitFilter};
use crate::error::{BindError, TransportError};
use crate::model::{AuditEvent, Binding, EventKind, Node, RawEvent, WorkUnit};

const WATCH_BUFFER: usize = 256;
const FORWARD_BUFFER: usize = 64;

/// Fault to inject into the next `create_binding` call.
#[derive(Debug, Clone)]
pub enum BindFault {
    AlreadyBound,
    Transient(String),
}

struct ClusterState {
    nodes: HashMap<String, Node>,
    units: HashMap<(String, String), WorkUnit>,
    bindings: Vec<Binding>,
    events: Vec<AuditEvent>,
    node_watch: broadcast::Sender<RawEvent>,
    unit_watch: broadcast::Sender<RawEvent>,
    bind_attempts: u64,
    bind_fault: Option<BindFault>,
    fail_node_sync: bool,
    fail_unit_watch: bool,
    fail_events: bool,
}

/// An in-process control plane.
///
/// Backs the local runtime (`placed run`) and the integration tests. It
/// enforces the same contracts the engine relies on from a real control
/// plane: create-only bindings (`AlreadyBound` on a placed unit, `NotFound`
/// on an unknown one), server-side work-unit filtering, and watch fan-out
/// to any number of subscribers. Fault hooks let tests sever watches and
/// fail binds or event creation.
pub struct InMemoryControlPlane {
    state: RwLock<ClusterState>,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        let (node_watch, _) = broadcast::channel(WATCH_BUFFER);
        let (unit_watch, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            state: RwLock::new(ClusterState {
                nodes: HashMap::new(),
                units: HashMap::new(),
                bindings: Vec::new(),
                events: Vec::new(),
                node_watch,
                unit_watch,
                bind_attempts: 0,
                bind_fault: None,
                fail_node_sync: false,
                fail_unit_watch: false,
                fail_events: false,
            }),
        }
    }

    /// Register or update a node. Watchers see ADDED for a new name and
    /// MODIFIED for an existing one.
    pub async fn add_node(&self, node: Node) {
        let mut state = self.state.write().await;
        let kind = if state.nodes.contains_key(&node.name) {
            EventKind::Modified
        } else {
            EventKind::Added
        };
        state.nodes.insert(node.name.clone(), node.clone());
        emit(&state.node_watch, kind, &node);
    }

    /// Returns false if no node with that name existed.
    pub async fn remove_node(&self, name: &str) -> bool {
        let mut state = self.state.write().await;
        match state.nodes.remove(name) {
            Some(node) => {
                emit(&state.node_watch, EventKind::Deleted, &node);
                true
            }
            None => false,
        }
    }

    /// Returns false if a unit with the same namespace/name already exists.
    pub async fn submit_work_unit(&self, unit: WorkUnit) -> bool {
        let mut state = self.state.write().await;
        let key = (unit.namespace.clone(), unit.name.clone());
        if state.units.contains_key(&key) {
            return false;
        }
        state.units.insert(key, unit.clone());
        emit(&state.unit_watch, EventKind::Added, &unit);
        true
    }

    /// Push an arbitrary notification at work-unit watchers, bypassing the
    /// store. For exercising malformed and duplicate notification paths.
    pub async fn inject_raw_unit_event(&self, event: RawEvent) {
        let state = self.state.read().await;
        let _ = state.unit_watch.send(event);
    }

    /// Push an arbitrary notification at node watchers, bypassing the store.
    pub async fn inject_raw_node_event(&self, event: RawEvent) {
        let state = self.state.read().await;
        let _ = state.node_watch.send(event);
    }

    /// Terminate every open watch stream. Subscribers observe end-of-stream
    /// and must resubscribe; new subscriptions attach to fresh channels.
    pub async fn sever_watches(&self) {
        let mut state = self.state.write().await;
        let (node_watch, _) = broadcast::channel(WATCH_BUFFER);
        let (unit_watch, _) = broadcast::channel(WATCH_BUFFER);
        state.node_watch = node_watch;
        state.unit_watch = unit_watch;
    }

    pub async fn nodes(&self) -> Vec<Node> {
        let state = self.state.read().await;
        let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    pub async fn work_units(&self) -> Vec<WorkUnit> {
        let state = self.state.read().await;
        let mut units: Vec<WorkUnit> = state.units.values().cloned().collect();
        units.sort_by_key(|u| (u.namespace.clone(), u.name.clone()));
        units
    }

    pub async fn work_unit(&self, namespace: &str, name: &str) -> Option<WorkUnit> {
        let state = self.state.read().await;
        state
            .units
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub async fn bindings(&self) -> Vec<Binding> {
        self.state.read().await.bindings.clone()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.state.read().await.events.clone()
    }

    /// Total `create_binding` calls received, successful or not.
    pub async fn bind_attempts(&self) -> u64 {
        self.state.read().await.bind_attempts
    }

    /// Make the next `create_binding` call fail with the given fault.
    pub async fn fail_next_bind(&self, fault: BindFault) {
        self.state.write().await.bind_fault = Some(fault);
    }

    /// While set, `list_nodes` and `watch_nodes` are refused.
    pub async fn set_node_sync_failure(&self, fail: bool) {
        self.state.write().await.fail_node_sync = fail;
    }

    /// While set, `watch_work_units` is refused.
    pub async fn set_unit_watch_failure(&self, fail: bool) {
        self.state.write().await.fail_unit_watch = fail;
    }

    /// While set, `create_event` is rejected.
    pub async fn set_fail_events(&self, fail: bool) {
        self.state.write().await.fail_events = fail;
    }

    /// Number of live node watch subscriptions.
    pub async fn node_watchers(&self) -> usize {
        self.state.read().await.node_watch.receiver_count()
    }

    /// Number of live work-unit watch subscriptions.
    pub async fn unit_watchers(&self) -> usize {
        self.state.read().await.unit_watch.receiver_count()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn list_nodes(&self) -> Result<Vec<Node>, TransportError> {
        let state = self.state.read().await;
        if state.fail_node_sync {
            return Err(TransportError::Unavailable("node list refused".to_string()));
        }
        Ok(state.nodes.values().cloned().collect())
    }

    async fn watch_nodes(&self) -> Result<RawEventStream, TransportError> {
        let state = self.state.read().await;
        if state.fail_node_sync {
            return Err(TransportError::Unavailable(
                "node watch refused".to_string(),
            ));
        }
        Ok(forward(state.node_watch.subscribe(), None))
    }

    async fn watch_work_units(
        &self,
        filter: &WorkUnitFilter,
    ) -> Result<RawEventStream, TransportError> {
        let state = self.state.read().await;
        if state.fail_unit_watch {
            return Err(TransportError::Unavailable(
                "work unit watch refused".to_string(),
            ));
        }
        Ok(forward(state.unit_watch.subscribe(), Some(filter.clone())))
    }

    async fn create_binding(&self, binding: &Binding) -> Result<(), BindError> {
        let mut state = self.state.write().await;
        state.bind_attempts += 1;

        let unit_name = format!("{}/{}", binding.namespace, binding.unit_name);
        if let Some(fault) = state.bind_fault.take() {
            return Err(match fault {
                BindFault::AlreadyBound => BindError::AlreadyBound { unit: unit_name },
                BindFault::Transient(reason) => BindError::Transient {
                    unit: unit_name,
                    reason,
                },
            });
        }

        let key = (binding.namespace.clone(), binding.unit_name.clone());
        let unit = state
            .units
            .get_mut(&key)
            .ok_or(BindError::NotFound { unit: unit_name })?;
        if unit.is_placed() {
            return Err(BindError::AlreadyBound {
                unit: unit.qualified_name(),
            });
        }
        unit.node_name = Some(binding.node_name.clone());
        let updated = unit.clone();

        state.bindings.push(binding.clone());
        emit(&state.unit_watch, EventKind::Modified, &updated);
        Ok(())
    }

    async fn create_event(&self, event: &AuditEvent) -> Result<(), TransportError> {
        let mut state = self.state.write().await;
        if state.fail_events {
            return Err(TransportError::Rejected(
                "event creation refused".to_string(),
            ));
        }
        state.events.push(event.clone());
        Ok(())
    }
}

fn emit<T: Serialize>(tx: &broadcast::Sender<RawEvent>, kind: EventKind, object: &T) {
    let object = serde_json::to_value(object).unwrap_or(serde_json::Value::Null);
    let _ = tx.send(RawEvent { kind, object });
}

/// Bridge a broadcast subscription into an owned stream. The task exits
/// when the sender is replaced (severed watch) or the stream is dropped.
fn forward(
    mut source: broadcast::Receiver<RawEvent>,
    filter: Option<WorkUnitFilter>,
) -> RawEventStream {
    let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
    tokio::spawn(async move {
        loop {
            match source.recv().await {
                Ok(event) => {
                    let matches = match &filter {
                        None => true,
                        Some(filter) => match event.decode::<WorkUnit>() {
                            Ok(unit) => filter.matches(&unit),
                            // Opaque payloads pass through; the consumer
                            // owns malformed-notification handling.
                            Err(_) => true,
                        },
                    };
                    if matches && tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "watch subscriber lagging, notifications lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Box::pin(ReceiverStream::new(rx))
}
