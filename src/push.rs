// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The push propagator (spec section 4.3): an iterative, explicit-stack
//! depth-first walk over a producer's outgoing edges, marking every
//! reachable, not-yet-invalidated consumer as `Invalidated` and handing
//! schedulable nodes (effects) to the caller to enqueue.
//!
//! The teacher's closest analogue is `InnerGraph::invalidate_from_roots`
//! (`lib.rs`), which walks dependents via a `Walk` iterator (itself
//! iterative, backed by an explicit `VecDeque` plus a visited bitset) to
//! avoid recursion over a potentially large build graph. This module
//! applies the same "no recursion" discipline the spec demands explicitly
//! (chains of length >= 10,000 must not overflow the stack).

use crate::edge::{Edge, EdgeArena, EdgeId};
use crate::node::{NodeArena, NodeId};
use crate::state::Lifecycle;

/// Marks every consumer reachable from `root`'s outgoing edges as
/// `Invalidated`, pushing any reached effect onto `scheduled` for the
/// caller to enqueue (spec 4.3). `root` itself is never revisited or
/// marked — it is the producer that just changed, not a consumer of
/// itself. Aborts the walk once the explicit stack exceeds `max_depth`
/// frames (spec section 6's optional `maxDepth` config: "guard against
/// pathological graphs"). Returns `false` if the walk was aborted early;
/// `true` if every reachable consumer was visited. `max_depth` of `None`
/// means unbounded, matching the spec's "default none".
pub(crate) fn invalidate_reachable_bounded(
    nodes: &mut NodeArena,
    edges: &EdgeArena,
    root: NodeId,
    scheduled: &mut Vec<NodeId>,
    max_depth: Option<usize>,
) -> bool {
    // Each stack frame is "the next outgoing edge to process at this
    // level". Pushing a new frame == descending into a producer's
    // children; popping == all siblings at this level are exhausted.
    let mut stack: Vec<Option<EdgeId>> = vec![nodes.header(root).lists.outgoing_head];

    while let Some(frame) = stack.last_mut() {
        let Some(edge_id) = *frame else {
            stack.pop();
            continue;
        };

        let Edge {
            consumer: target,
            next_out,
            ..
        } = *edges.get(edge_id);
        *frame = next_out;

        // Clean is the only one of the four mutually exclusive lifecycle
        // states from which a node can still be invalidated by this walk:
        // Disposed stays inert, Running is already on the call stack, and
        // Invalidated has already been visited by an earlier path in this
        // same push (the dedup that keeps diamonds glitch-free).
        if !nodes.header(target).status.is_clean() {
            continue;
        }
        nodes.header_mut(target).status.set_state(Lifecycle::Invalidated);

        let kind = nodes.kind(target);
        if kind.has_outgoing() {
            if let Some(limit) = max_depth {
                if stack.len() >= limit {
                    return false;
                }
            }
            stack.push(nodes.header(target).lists.outgoing_head);
        } else if kind.is_schedulable() {
            scheduled.push(target);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeLists;

    fn producer_only(nodes: &mut NodeArena) -> NodeId {
        nodes.push(crate::node::NodeData::Signal(crate::node::SignalData {
            value: Box::new(0i32),
            equality: crate::node::default_equality::<i32>(),
        }))
    }

    fn derived(nodes: &mut NodeArena) -> NodeId {
        nodes.push(crate::node::NodeData::Derived(crate::node::DerivedData {
            compute: None,
            value: None,
            equality: crate::node::default_equality::<i32>(),
        }))
    }

    fn effect(nodes: &mut NodeArena) -> NodeId {
        nodes.push(crate::node::NodeData::Effect(crate::node::EffectData {
            run: None,
            cleanup: None,
        }))
    }

    fn link(edges: &mut EdgeArena, nodes: &mut NodeArena, producer: NodeId, consumer: NodeId) {
        let (plists, clists) = nodes.lists_pair_mut(producer, consumer);
        edges.track(producer, consumer, 0, clists, plists);
    }

    #[test]
    fn long_chain_is_invalidated_iteratively() {
        let mut nodes = NodeArena::new();
        let mut edges = EdgeArena::new();
        let root = producer_only(&mut nodes);
        let mut prev = root;
        for _ in 0..10_000 {
            let next = derived(&mut nodes);
            link(&mut edges, &mut nodes, prev, next);
            prev = next;
        }
        let mut scheduled = Vec::new();
        invalidate_reachable_bounded(&mut nodes, &edges, root, &mut scheduled, None);
        assert!(scheduled.is_empty(), "no effect was ever linked in");
        // every derived past the root should now be invalidated.
        for i in 1..=10_000u32 {
            assert!(nodes.header(NodeId(i)).status.is_invalidated());
        }
    }

    #[test]
    fn diamond_is_visited_once() {
        let mut nodes = NodeArena::new();
        let mut edges = EdgeArena::new();
        let a = producer_only(&mut nodes);
        let b = derived(&mut nodes);
        let c = derived(&mut nodes);
        let d = derived(&mut nodes);
        link(&mut edges, &mut nodes, a, b);
        link(&mut edges, &mut nodes, a, c);
        link(&mut edges, &mut nodes, b, d);
        link(&mut edges, &mut nodes, c, d);
        let mut scheduled = Vec::new();
        invalidate_reachable_bounded(&mut nodes, &edges, a, &mut scheduled, None);
        assert!(nodes.header(b).status.is_invalidated());
        assert!(nodes.header(c).status.is_invalidated());
        assert!(nodes.header(d).status.is_invalidated());
    }

    #[test]
    fn effect_is_scheduled_and_not_revisited() {
        let mut nodes = NodeArena::new();
        let mut edges = EdgeArena::new();
        let a = producer_only(&mut nodes);
        let e = effect(&mut nodes);
        link(&mut edges, &mut nodes, a, e);
        let mut scheduled = Vec::new();
        invalidate_reachable_bounded(&mut nodes, &edges, a, &mut scheduled, None);
        assert_eq!(scheduled, vec![e]);
    }
}
