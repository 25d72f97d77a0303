use rand::Rng;

use crate::model::Node;

/// Strategy for picking a target node from a snapshot.
///
/// Injected into the assignment engine so tests can substitute a fixed or
/// seeded selector without rewiring anything. Policies may keep state
/// (round-robin cursors, seeded RNGs), hence `&mut self`.
pub trait SelectionPolicy: Send {
    /// Index into `nodes` of the chosen target, or None when nothing is
    /// selectable.
    fn select(&mut self, nodes: &[Node]) -> Option<usize>;
}

/// The placeholder policy: every known node is equally likely. No
/// feasibility checks of any kind — labels, capacity and conditions are
/// ignored. Meant to be replaced by an informed policy behind the same
/// trait.
#[derive(Debug, Default)]
pub struct UniformRandom;

impl SelectionPolicy for UniformRandom {
    fn select(&mut self, nodes: &[Node]) -> Option<usize> {
        if nodes.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..nodes.len()))
    }
}
