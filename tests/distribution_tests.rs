//! Distribution tests for the uniform-random selection policy.
//!
//! Verifies that over many independent selections every node is chosen at
//! rate 1/N. Uses a chi-square goodness-of-fit test at 99.99% confidence so
//! a correct implementation fails roughly one run in ten thousand.

use placed::engine::{SelectionPolicy, UniformRandom};
use placed::model::Node;

fn nodes(count: usize) -> Vec<Node> {
    (0..count)
        .map(|i| Node::new(&format!("node-{}", i)))
        .collect()
}

#[test]
fn test_selection_is_uniform_within_chi_square_tolerance() {
    const NODES: usize = 5;
    const DRAWS: usize = 20_000;
    // Critical value for chi-square with 4 degrees of freedom at p=0.0001.
    const CRITICAL: f64 = 23.51;

    let nodes = nodes(NODES);
    let mut policy = UniformRandom;
    let mut counts = [0u64; NODES];

    for _ in 0..DRAWS {
        let index = policy.select(&nodes).expect("nodes are non-empty");
        counts[index] += 1;
    }

    let expected = DRAWS as f64 / NODES as f64;
    let chi_square: f64 = counts
        .iter()
        .map(|&observed| {
            let delta = observed as f64 - expected;
            delta * delta / expected
        })
        .sum();

    assert!(
        chi_square < CRITICAL,
        "selection distribution is skewed: chi-square {:.2} (critical {}), counts {:?}",
        chi_square,
        CRITICAL,
        counts
    );
}

#[test]
fn test_every_node_is_reachable() {
    let nodes = nodes(4);
    let mut policy = UniformRandom;
    let mut seen = [false; 4];

    for _ in 0..1_000 {
        let index = policy.select(&nodes).expect("nodes are non-empty");
        seen[index] = true;
    }

    assert!(
        seen.iter().all(|&s| s),
        "every node should be selected at least once in 1000 draws: {:?}",
        seen
    );
}

#[test]
fn test_empty_snapshot_selects_nothing() {
    let mut policy = UniformRandom;
    assert!(policy.select(&[]).is_none());
}

#[test]
fn test_single_node_is_always_selected() {
    let nodes = nodes(1);
    let mut policy = UniformRandom;
    for _ in 0..100 {
        assert_eq!(policy.select(&nodes), Some(0));
    }
}
