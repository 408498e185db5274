//! Integration tests for the follow graph rules
//!
//! These tests verify the contract of the social graph as a model:
//! - Each directed pair has exactly two states: not-following / following
//! - Subscribe and unsubscribe are the only transitions, and both are
//!   idempotent
//! - An edge is always visible from both sides at once (no torn edge)
//! - Edges are directed and never self-referential

use std::collections::BTreeSet;

/// Outcome of a subscribe transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subscribe {
    Subscribed,
    AlreadyFollowing,
}

/// Outcome of an unsubscribe transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unsubscribe {
    Unsubscribed,
    NotFollowing,
}

/// Reference model of the follow graph: one set of directed edges, exactly
/// like the edge table. Both projections are reads of the same set.
#[derive(Debug, Default)]
struct Graph {
    edges: BTreeSet<(u64, u64)>,
}

impl Graph {
    fn subscribe(&mut self, follower: u64, followee: u64) -> Subscribe {
        assert_ne!(follower, followee, "self-follow must be rejected upstream");
        if self.edges.insert((follower, followee)) {
            Subscribe::Subscribed
        } else {
            Subscribe::AlreadyFollowing
        }
    }

    fn unsubscribe(&mut self, follower: u64, followee: u64) -> Unsubscribe {
        if self.edges.remove(&(follower, followee)) {
            Unsubscribe::Unsubscribed
        } else {
            Unsubscribe::NotFollowing
        }
    }

    fn subscriptions(&self, user: u64) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|(f, _)| *f == user)
            .map(|(_, t)| *t)
            .collect()
    }

    fn followers(&self, user: u64) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|(_, t)| *t == user)
            .map(|(f, _)| *f)
            .collect()
    }
}

// ============================================================================
// Pair-visibility invariant
// ============================================================================

#[test]
fn subscribe_shows_on_both_sides() {
    let mut graph = Graph::default();
    assert_eq!(graph.subscribe(5, 9), Subscribe::Subscribed);

    assert_eq!(graph.subscriptions(5), vec![9]);
    assert_eq!(graph.followers(9), vec![5]);
}

#[test]
fn unsubscribe_clears_both_sides() {
    let mut graph = Graph::default();
    graph.subscribe(5, 9);
    assert_eq!(graph.unsubscribe(5, 9), Unsubscribe::Unsubscribed);

    assert!(graph.subscriptions(5).is_empty());
    assert!(graph.followers(9).is_empty());
}

#[test]
fn edges_are_directed() {
    let mut graph = Graph::default();
    graph.subscribe(5, 9);

    // The reverse projections stay empty.
    assert!(graph.subscriptions(9).is_empty());
    assert!(graph.followers(5).is_empty());

    // The reverse edge is independent.
    assert_eq!(graph.subscribe(9, 5), Subscribe::Subscribed);
    assert_eq!(graph.subscriptions(9), vec![5]);
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn repeated_subscribe_is_a_noop() {
    let mut graph = Graph::default();
    assert_eq!(graph.subscribe(5, 9), Subscribe::Subscribed);
    assert_eq!(graph.subscribe(5, 9), Subscribe::AlreadyFollowing);

    // Exactly one edge, no duplicate.
    assert_eq!(graph.subscriptions(5), vec![9]);
    assert_eq!(graph.followers(9), vec![5]);
}

#[test]
fn unsubscribe_without_edge_is_a_noop() {
    let mut graph = Graph::default();
    assert_eq!(graph.unsubscribe(5, 9), Unsubscribe::NotFollowing);
    assert!(graph.subscriptions(5).is_empty());

    graph.subscribe(5, 9);
    graph.unsubscribe(5, 9);
    assert_eq!(graph.unsubscribe(5, 9), Unsubscribe::NotFollowing);
}

// ============================================================================
// State machine
// ============================================================================

#[test]
fn each_pair_cycles_between_two_states() {
    let mut graph = Graph::default();

    for _ in 0..3 {
        assert_eq!(graph.subscribe(1, 2), Subscribe::Subscribed);
        assert_eq!(graph.subscribe(1, 2), Subscribe::AlreadyFollowing);
        assert_eq!(graph.unsubscribe(1, 2), Unsubscribe::Unsubscribed);
        assert_eq!(graph.unsubscribe(1, 2), Unsubscribe::NotFollowing);
    }
}

#[test]
fn pairs_are_independent() {
    let mut graph = Graph::default();
    graph.subscribe(1, 2);
    graph.subscribe(1, 3);
    graph.subscribe(2, 3);

    assert_eq!(graph.unsubscribe(1, 2), Unsubscribe::Unsubscribed);

    // Other edges are untouched.
    assert_eq!(graph.subscriptions(1), vec![3]);
    assert_eq!(graph.followers(3), vec![1, 2]);
}

#[test]
#[should_panic(expected = "self-follow")]
fn self_follow_is_rejected() {
    let mut graph = Graph::default();
    graph.subscribe(7, 7);
}
