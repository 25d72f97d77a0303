use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A schedulable unit of work that may request a named placement engine.
///
/// Owned by the control plane; this engine only holds transient, read-only
/// copies while a unit moves through the assignment loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub namespace: String,
    pub name: String,
    pub uid: Uuid,
    /// Name of the placement engine this unit asks for.
    pub engine: String,
    /// Target node once bound; `None` until a binding is committed.
    #[serde(default)]
    pub node_name: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl WorkUnit {
    pub fn new(namespace: &str, name: &str, engine: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            uid: Uuid::new_v4(),
            engine: engine.to_string(),
            node_name: None,
            created_at: Utc::now(),
            labels: BTreeMap::new(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn is_placed(&self) -> bool {
        self.node_name.is_some()
    }

    pub fn wants_engine(&self, engine: &str) -> bool {
        self.engine == engine
    }

    pub fn reference(&self) -> ObjectRef {
        ObjectRef {
            kind: "WorkUnit".to_string(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            uid: self.uid,
        }
    }
}

/// An execution host the engine may target. Labels and conditions are
/// mirrored but not consulted by the placeholder selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
            conditions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCondition {
    pub kind: String,
    pub status: String,
}

/// The immutable, create-only association of a WorkUnit with a Node.
/// Once the control plane accepts it, this engine cannot alter it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub namespace: String,
    pub unit_name: String,
    pub unit_uid: Uuid,
    pub node_name: String,
}

/// Reference to a control-plane object, attached to audit events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Uuid,
}

/// Append-only audit record for a placement decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub involved: ObjectRef,
    pub reason: String,
    pub message: String,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    pub kind: String,
    /// Identity of the engine that emitted the event.
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Added => write!(f, "ADDED"),
            EventKind::Modified => write!(f, "MODIFIED"),
            EventKind::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A transport-level watch notification. The payload stays opaque until a
/// consumer decodes it for the resource it expects; a failed decode is a
/// malformed notification, logged and discarded by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    pub object: serde_json::Value,
}

impl RawEvent {
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.object.clone())
    }
}
