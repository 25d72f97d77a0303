use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backoff::{sleep_or_cancelled, Backoff};
use crate::config::EngineConfig;
use crate::controlplane::{ControlPlane, RawEventStream};
use crate::error::Result;
use crate::model::{EventKind, Node, RawEvent};

enum SyncTurn {
    Cancelled,
    ResyncDue,
    Dropped,
}

/// A materialized view of the schedulable node set.
///
/// One writer (the `sync` task) keeps the map current via list-then-watch;
/// any number of readers take immutable copies through `snapshot()`. The
/// view is eventually consistent: staleness is bounded by notification
/// latency and the resync interval, and `last_sync()` exposes how fresh it
/// is. During a watch outage the last known state keeps being served.
#[derive(Clone, Default)]
pub struct NodeMirror {
    nodes: Arc<RwLock<HashMap<String, Node>>>,
    last_sync: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl NodeMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Immutable copy of the current node set, ordered by name.
    pub async fn snapshot(&self) -> Vec<Node> {
        let map = self.nodes.read().await;
        let mut nodes: Vec<Node> = map.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// When the view last absorbed a list or a notification.
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read().await
    }

    /// Run the subscription until cancelled.
    ///
    /// Failure to establish the initial list+watch is fatal and returned to
    /// the caller; once established, dropped subscriptions resubscribe with
    /// backoff and a full re-list happens every `resync_interval`.
    pub async fn sync(
        &self,
        control_plane: Arc<dyn ControlPlane>,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut backoff = Backoff::new(config.backoff.clone());
        let mut established = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let stream = match self.relist(control_plane.as_ref()).await {
                Ok(stream) => stream,
                Err(err) if !established => {
                    tracing::error!(error = %err, "initial node sync failed");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "node resync failed, backing off");
                    if sleep_or_cancelled(backoff.next_delay(), &cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };
            established = true;
            backoff.reset();

            match self.consume(stream, &config, &cancel).await {
                SyncTurn::Cancelled => return Ok(()),
                SyncTurn::ResyncDue => continue,
                SyncTurn::Dropped => {
                    tracing::warn!("node watch dropped, resubscribing");
                    if sleep_or_cancelled(backoff.next_delay(), &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// List the full node set, then open the watch that continues from it.
    async fn relist(&self, control_plane: &dyn ControlPlane) -> Result<RawEventStream> {
        let nodes = control_plane.list_nodes().await?;
        let stream = control_plane.watch_nodes().await?;

        let count = nodes.len();
        {
            let mut map = self.nodes.write().await;
            map.clear();
            for node in nodes {
                map.insert(node.name.clone(), node);
            }
        }
        *self.last_sync.write().await = Some(Utc::now());
        tracing::debug!(nodes = count, "node mirror resynced");

        Ok(stream)
    }

    async fn consume(
        &self,
        mut stream: RawEventStream,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> SyncTurn {
        let resync_due = tokio::time::sleep(config.resync_interval);
        tokio::pin!(resync_due);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SyncTurn::Cancelled,
                _ = &mut resync_due => return SyncTurn::ResyncDue,
                event = stream.next() => match event {
                    None => return SyncTurn::Dropped,
                    Some(event) => self.apply(event).await,
                },
            }
        }
    }

    async fn apply(&self, event: RawEvent) {
        let node: Node = match event.decode() {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    kind = %event.kind,
                    "discarding malformed node notification"
                );
                return;
            }
        };

        {
            let mut map = self.nodes.write().await;
            match event.kind {
                EventKind::Added | EventKind::Modified => {
                    map.insert(node.name.clone(), node);
                }
                EventKind::Deleted => {
                    map.remove(&node.name);
                }
            }
        }
        *self.last_sync.write().await = Some(Utc::now());
    }
}
