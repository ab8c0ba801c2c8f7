// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The pull propagator (spec section 4.4): lazy revalidation triggered by
//! a read from an invalidated consumer, recomputing exactly the stale
//! derivations needed to answer it, short-circuiting on value equality.
//!
//! Unlike `push.rs`, this module recurses through plain Rust calls rather
//! than an explicit stack. Spec 4.4's header calls the algorithm
//! "depth-first, iterative" but its body describes recursively resolving
//! a dependency before deciding this consumer's own staleness — and
//! resolving a stale dependency means *running its compute closure*,
//! which is arbitrary opaque user code that may itself call `get()` and
//! recurse again. There is no way to trampoline through an opaque
//! closure call without coroutines, so a truly flat iterative pull (one
//! that also survives a 10,000-deep *pull*, as opposed to push's
//! 10,000-deep *invalidation*) is out of reach here — and it is not what
//! real reference implementations do either: `sycamore-reactive`'s own
//! dependency-graph walk is plain recursive Rust, not a trampoline. This
//! is recorded as an explicit, grounded Open Question resolution in
//! `DESIGN.md`; only `push.rs` carries the iterative-stack requirement
//! literally.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{raise_cycle, GraphError};
use crate::graph::GraphInner;
use crate::node::{NodeData, NodeId, NodeKind};
use crate::state::Lifecycle;

/// Ensures `id` (a `Derived`) is fresh: if it has never run, runs it
/// unconditionally; if it is `Invalidated`, walks its dependencies
/// (recursively resolving any that are themselves stale derivations) and
/// either clears `Invalidated` without recomputing or runs it; if it is
/// already `Clean`, does nothing.
pub(crate) fn ensure_fresh(graph: &GraphInner, id: NodeId) {
    let status = graph.nodes.borrow().header(id).status;
    if status.is_running() {
        // Re-entering a node already on the call stack (invariant 4), be
        // it on its very first run or a later revalidation.
        raise_cycle(format!("derived node {id} read while already running"));
    }

    let has_value = {
        let nodes = graph.nodes.borrow();
        match nodes.data(id) {
            NodeData::Derived(d) => d.value.is_some(),
            _ => true,
        }
    };

    if !has_value {
        run_derived(graph, id);
        return;
    }

    if !status.is_invalidated() {
        return;
    }

    if dependencies_stale(graph, id) {
        run_derived(graph, id);
    } else {
        graph
            .nodes
            .borrow_mut()
            .header_mut(id)
            .status
            .set_state(Lifecycle::Clean);
    }
}

/// Spec 4.4 steps 1-2: walk `consumer`'s incoming edges. A signal
/// dependency is stale if its `version` has moved past what this edge
/// last observed; a derived dependency is first resolved recursively
/// (which may recompute it), then compared the same way. Every edge is
/// visited regardless of whether an earlier one already proved staleness,
/// so every transitively-needed dependency is brought up to date before
/// `consumer` itself may recompute (the glitch-freedom guarantee).
fn dependencies_stale(graph: &GraphInner, consumer: NodeId) -> bool {
    let incoming_head = graph.nodes.borrow().header(consumer).lists.incoming_head;
    if incoming_head.is_none() {
        // No dependencies: nothing could have invalidated a node with a
        // cached value except the unobserved/reobserved transition
        // (`GraphInner::unlink_edge`), which already clears the cached
        // value and re-marks the node Invalidated itself.
        return false;
    }

    let mut any_stale = false;
    let mut cursor = incoming_head;
    while let Some(edge_id) = cursor {
        let (producer, recorded_version, next) = {
            let edges = graph.edges.borrow();
            let e = edges.get(edge_id);
            (e.producer, e.observed_producer_version, e.next_in())
        };

        let kind = graph.nodes.borrow().kind(producer);
        if kind == NodeKind::Derived {
            ensure_fresh(graph, producer);
        }

        let current_version = graph.nodes.borrow().header(producer).version;
        if current_version != recorded_version {
            any_stale = true;
            if kind == NodeKind::Signal {
                // A signal's VALUE_CHANGED is set the moment its version
                // advances and, unlike a derived's, never cleared again —
                // so once any version gap exists it must still be set.
                debug_assert!(
                    graph.nodes.borrow().header(producer).status.value_changed(),
                    "a signal whose version moved past a dependency's recorded version must carry VALUE_CHANGED"
                );
            }
        }

        cursor = next;
    }
    any_stale
}

/// Spec 4.4 step 4: the actual recompute. Installs `id` as the active
/// consumer, resets its tail cursor, bumps `trackingVersion`, runs the
/// compute closure (with every arena borrow released for the duration of
/// the call, since it is arbitrary user code that will likely re-enter
/// the arena itself via some other handle's `get()`), then restores
/// everything, prunes stale edges, and updates `version`/`VALUE_CHANGED`
/// by comparing the new value to the old one under the node's equality
/// function.
///
/// A panic from the user's closure (including a nested cycle panic from
/// `raise_cycle`) is caught here only long enough to restore this node's
/// own state (value kept at the previous one, left `Invalidated` per spec
/// section 7) before being resumed, so it continues unwinding through
/// every enclosing `run_derived`/`run_effect` frame.
fn run_derived(graph: &GraphInner, id: NodeId) {
    let active_guard = graph.install_active_consumer(id);

    {
        let mut nodes = graph.nodes.borrow_mut();
        let header = nodes.header_mut(id);
        header.status.set_state(Lifecycle::Running);
        header.lists.tracking_cursor = None;
        header.lists.tracking_version = header.lists.tracking_version.wrapping_add(1);
    }

    let (mut compute, previous_value) = {
        let mut nodes = graph.nodes.borrow_mut();
        match nodes.data_mut(id) {
            NodeData::Derived(d) => (d.compute.take(), d.value.take()),
            _ => unreachable!("run_derived only ever called on a Derived"),
        }
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let f = compute
            .as_mut()
            .expect("compute closure was taken exactly once");
        f()
    }));

    match outcome {
        Ok(new_value) => {
            // No arena borrow is held across this call: `prune_stale`
            // takes its own borrows internally.
            graph.prune_stale(id);

            let equality = {
                let nodes = graph.nodes.borrow();
                match nodes.data(id) {
                    NodeData::Derived(d) => d.equality.clone(),
                    _ => unreachable!(),
                }
            };
            let changed = match &previous_value {
                Some(old) => !(equality)(old.as_ref(), new_value.as_ref()),
                None => true,
            };

            let mut nodes = graph.nodes.borrow_mut();
            let header = nodes.header_mut(id);
            if changed {
                header.version = header.version.wrapping_add(1);
            }
            header.status.set_value_changed(changed);
            header.status.set_state(Lifecycle::Clean);
            match nodes.data_mut(id) {
                NodeData::Derived(d) => {
                    d.value = Some(new_value);
                    d.compute = compute;
                }
                _ => unreachable!(),
            }
            drop(nodes);
            drop(active_guard);
            graph.record_recompute();
        }
        Err(payload) => {
            let mut nodes = graph.nodes.borrow_mut();
            let header = nodes.header_mut(id);
            header.status.set_state(Lifecycle::Invalidated);
            match nodes.data_mut(id) {
                NodeData::Derived(d) => {
                    d.value = previous_value;
                    d.compute = compute;
                }
                _ => unreachable!(),
            }
            drop(nodes);
            drop(active_guard);
            if crate::error::is_cycle_payload(&*payload) {
                graph.record_cycle();
            }
            std::panic::resume_unwind(payload);
        }
    }
}

/// Runs an effect's body, catching (rather than propagating) a panic per
/// spec section 7 ("User exception in effect"): the error is handed back
/// to the caller (the work queue's flush loop, or `ReactiveGraph::effect`
/// for the initial synchronous run) as a [`GraphError`] instead of
/// unwinding further, and the effect remains subscribed to its
/// dependencies (it is not auto-disposed).
pub(crate) fn run_effect(graph: &GraphInner, id: NodeId) -> Result<(), GraphError> {
    let active_guard = graph.install_active_consumer(id);

    {
        let mut nodes = graph.nodes.borrow_mut();
        let header = nodes.header_mut(id);
        header.status.set_state(Lifecycle::Running);
        header.lists.tracking_cursor = None;
        header.lists.tracking_version = header.lists.tracking_version.wrapping_add(1);
    }

    let (mut run, cleanup) = {
        let mut nodes = graph.nodes.borrow_mut();
        match nodes.data_mut(id) {
            NodeData::Effect(e) => (e.run.take(), e.cleanup.take()),
            _ => unreachable!("run_effect only ever called on an Effect"),
        }
    };

    if let Some(cleanup) = cleanup {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
            graph.report_error(GraphError::from_panic_payload(payload));
        }
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let f = run.as_mut().expect("effect closure was taken exactly once");
        f()
    }));

    // The body may have disposed this very effect (spec 8, boundary
    // behavior: "An effect that disposes itself during its own run
    // completes that run..."). `prune_stale` is a no-op in that case,
    // since `dispose` already detached every incoming edge.
    graph.prune_stale(id);

    let already_disposed = graph.nodes.borrow().header(id).status.is_disposed();
    if !already_disposed {
        graph
            .nodes
            .borrow_mut()
            .header_mut(id)
            .status
            .set_state(Lifecycle::Clean);
    }
    drop(active_guard);

    match outcome {
        Ok(new_cleanup) => {
            if already_disposed {
                // Won't run again: nothing to hold the new cleanup for,
                // so honor it immediately instead of leaking it.
                if let Some(cleanup) = new_cleanup {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
                        graph.report_error(GraphError::from_panic_payload(payload));
                    }
                }
            } else {
                let mut nodes = graph.nodes.borrow_mut();
                match nodes.data_mut(id) {
                    NodeData::Effect(e) => {
                        e.run = run;
                        e.cleanup = new_cleanup;
                    }
                    _ => unreachable!(),
                }
            }
            Ok(())
        }
        Err(payload) => {
            if !already_disposed {
                let mut nodes = graph.nodes.borrow_mut();
                match nodes.data_mut(id) {
                    NodeData::Effect(e) => e.run = run,
                    _ => unreachable!(),
                }
            }
            Err(GraphError::from_panic_payload(payload))
        }
    }
}
