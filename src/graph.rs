// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The scheduler / engine context (spec sections 4.5 and 4.6): the single
//! mutable-state owner behind a [`crate::ReactiveGraph`] — the node and
//! edge arenas, the active-consumer and batch-depth scope guards, the
//! intrusive work queue, the error sink, and runtime statistics.
//!
//! The teacher splits this the same way: `InnerGraph` (`lib.rs`) owns the
//! `petgraph` storage behind a `Mutex`, while `Graph` (also `lib.rs`) is
//! the `Arc`-wrapped handle users hold and clone. This engine is
//! single-threaded (spec section 5), so the `Arc<Mutex<_>>` the teacher
//! needs for cross-task sharing collapses to a plain `Rc<RefCell<_>>`
//! split across a handful of `RefCell`/`Cell` fields rather than one big
//! lock, since `track_read`/`prune_stale`/etc. need fine-grained,
//! non-overlapping borrows of the node and edge arenas independently.

use std::any::Any;
use std::cell::{Cell, RefCell};

use crate::edge::{EdgeArena, EdgeId};
use crate::error::GraphError;
use crate::node::{Equality, NodeArena, NodeData, NodeId, NodeKind};
use crate::pull;
use crate::push;
use crate::state::Lifecycle;

/// Runtime activity counters (`SPEC_FULL.md` section 0.1), the analogue of
/// the teacher's `Stats` (`node.rs`: `ran`, `cleaning_succeeded`,
/// `cleaning_failed`).
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct GraphStats {
    pub signals_written: u64,
    pub effects_run: u64,
    pub derivations_recomputed: u64,
    pub cycles_detected: u64,
}

/// A scope-guarded swap of the engine's single active-consumer field
/// (spec section 9: "a scope-guarded swap of the engine's single
/// `activeConsumer` field, restored on all exit paths including
/// failure"). Used both for installing a running derived/effect as the
/// tracking scope, and for `untrack`'s "no active consumer" scope.
pub(crate) struct ActiveConsumerGuard<'a> {
    graph: &'a GraphInner,
    previous: Option<NodeId>,
}

impl Drop for ActiveConsumerGuard<'_> {
    fn drop(&mut self) {
        self.graph.active_consumer.set(self.previous);
    }
}

/// A scope-guarded increment/decrement of the batch depth (spec section
/// 4.6/9). Flushes on the way out if depth returns to zero, including
/// when unwound by a panic (spec 4.6: "An exception thrown inside batch
/// still decrements the depth... and still flushes pending effects").
pub(crate) struct BatchGuard<'a> {
    graph: &'a GraphInner,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.graph.exit_batch();
    }
}

pub(crate) struct GraphInner {
    pub(crate) nodes: RefCell<NodeArena>,
    pub(crate) edges: RefCell<EdgeArena>,
    active_consumer: Cell<Option<NodeId>>,
    batch_depth: Cell<u32>,
    queue_head: Cell<Option<NodeId>>,
    queue_tail: Cell<Option<NodeId>>,
    error_sink: RefCell<Box<dyn Fn(GraphError)>>,
    max_depth: Option<usize>,
    stats: RefCell<GraphStats>,
}

impl GraphInner {
    pub(crate) fn new(error_sink: Box<dyn Fn(GraphError)>, max_depth: Option<usize>) -> GraphInner {
        GraphInner {
            nodes: RefCell::new(NodeArena::new()),
            edges: RefCell::new(EdgeArena::new()),
            active_consumer: Cell::new(None),
            batch_depth: Cell::new(0),
            queue_head: Cell::new(None),
            queue_tail: Cell::new(None),
            error_sink: RefCell::new(error_sink),
            max_depth,
            stats: RefCell::new(GraphStats::default()),
        }
    }

    pub(crate) fn stats(&self) -> GraphStats {
        *self.stats.borrow()
    }

    pub(crate) fn record_recompute(&self) {
        self.stats.borrow_mut().derivations_recomputed += 1;
    }

    pub(crate) fn record_cycle(&self) {
        self.stats.borrow_mut().cycles_detected += 1;
    }

    pub(crate) fn report_error(&self, err: GraphError) {
        if matches!(err, GraphError::Cycle(_)) {
            self.record_cycle();
        }
        (self.error_sink.borrow())(err);
    }

    // ---- node creation --------------------------------------------------

    pub(crate) fn create_signal<T: 'static>(&self, initial: T, equality: Equality) -> NodeId {
        self.nodes
            .borrow_mut()
            .push(NodeData::Signal(crate::node::SignalData {
                value: Box::new(initial),
                equality,
            }))
    }

    pub(crate) fn create_derived(
        &self,
        compute: Box<dyn FnMut() -> Box<dyn Any>>,
        equality: Equality,
    ) -> NodeId {
        let id = self
            .nodes
            .borrow_mut()
            .push(NodeData::Derived(crate::node::DerivedData {
                compute: Some(compute),
                value: None,
                equality,
            }));
        // Spec 4.6: "computed(fn) -> handle: creates a derived in
        // INVALIDATED state" — lazy, first read forces a run.
        self.nodes
            .borrow_mut()
            .header_mut(id)
            .status
            .set_state(Lifecycle::Invalidated);
        id
    }

    /// Spec 4.6: "effect(fn) -> disposer: creates an effect, runs it
    /// immediately... registers dependencies". Errors from that first run
    /// go to the error sink exactly like any other flushed run, rather
    /// than panicking out of handle construction.
    pub(crate) fn create_effect(
        &self,
        run: Box<dyn FnMut() -> Option<Box<dyn FnOnce()>>>,
    ) -> NodeId {
        let id = self
            .nodes
            .borrow_mut()
            .push(NodeData::Effect(crate::node::EffectData {
                run: Some(run),
                cleanup: None,
            }));
        if let Err(e) = pull::run_effect(self, id) {
            self.report_error(e);
        } else {
            self.stats.borrow_mut().effects_run += 1;
        }
        id
    }

    pub(crate) fn ensure_fresh(&self, id: NodeId) {
        pull::ensure_fresh(self, id);
    }

    // ---- signal writes ----------------------------------------------------

    /// `set(signal, v)` (spec section 6): compares new vs old via the
    /// signal's equality function; a no-op if equal, otherwise bumps
    /// `version`, sets `VALUE_CHANGED`, and pushes invalidation from the
    /// signal's outgoing list (spec 4.6).
    pub(crate) fn write_signal<T: 'static>(&self, id: NodeId, new_value: T) {
        let boxed_new: Box<dyn Any> = Box::new(new_value);
        let changed = {
            let nodes = self.nodes.borrow();
            match nodes.data(id) {
                NodeData::Signal(s) => !(s.equality)(s.value.as_ref(), boxed_new.as_ref()),
                _ => unreachable!("write_signal only ever called on a Signal"),
            }
        };
        if !changed {
            return;
        }

        {
            let mut nodes = self.nodes.borrow_mut();
            let header = nodes.header_mut(id);
            header.version = header.version.wrapping_add(1);
            header.status.set_value_changed(true);
            match nodes.data_mut(id) {
                NodeData::Signal(s) => s.value = boxed_new,
                _ => unreachable!(),
            }
        }
        self.stats.borrow_mut().signals_written += 1;

        let mut scheduled = Vec::new();
        let exceeded_depth = {
            let mut nodes = self.nodes.borrow_mut();
            let edges = self.edges.borrow();
            !push::invalidate_reachable_bounded(&mut nodes, &edges, id, &mut scheduled, self.max_depth)
        };
        if exceeded_depth {
            self.report_error(GraphError::DepthExceeded(
                self.max_depth.unwrap_or_default(),
            ));
        }
        for effect_id in scheduled {
            self.enqueue(effect_id);
        }
        if self.batch_depth.get() == 0 {
            self.flush();
        }
    }

    // ---- tracking scope (spec 4.6, section 9) ------------------------------

    /// Records a dependency of the currently active consumer on
    /// `producer`, if any consumer is active (spec 4.2 `track`, invoked on
    /// every `get`). No-op under `untrack` (active consumer cleared).
    pub(crate) fn track_read(&self, producer: NodeId) {
        let consumer = match self.active_consumer.get() {
            Some(c) => c,
            None => return,
        };
        let producer_version = self.nodes.borrow().header(producer).version;
        let mut nodes = self.nodes.borrow_mut();
        let (producer_lists, consumer_lists) = nodes.lists_pair_mut(producer, consumer);
        self.edges.borrow_mut().track(
            producer,
            consumer,
            producer_version,
            consumer_lists,
            producer_lists,
        );
        nodes.header_mut(producer).status.set_observed(true);
    }

    pub(crate) fn install_active_consumer(&self, consumer: NodeId) -> ActiveConsumerGuard<'_> {
        let previous = self.active_consumer.replace(Some(consumer));
        ActiveConsumerGuard {
            graph: self,
            previous,
        }
    }

    /// `untrack(fn)` (spec 4.6): clears the active consumer for the
    /// duration of the guard, restored on every exit path.
    pub(crate) fn untrack_scope(&self) -> ActiveConsumerGuard<'_> {
        let previous = self.active_consumer.replace(None);
        ActiveConsumerGuard {
            graph: self,
            previous,
        }
    }

    // ---- edge pruning / detachment (spec 4.2) ------------------------------

    /// `pruneStale(consumer)`: after a run, remove every edge past the
    /// tail cursor — the dependencies not re-accessed this run (spec 4.2,
    /// 4.4's conditional-dependency boundary behavior).
    pub(crate) fn prune_stale(&self, consumer: NodeId) {
        let stale: Vec<EdgeId> = {
            let nodes = self.nodes.borrow();
            let edges = self.edges.borrow();
            let start = edges.stale_start(&nodes.header(consumer).lists);
            edges.incoming_from(start).collect()
        };
        for edge_id in stale {
            self.unlink_edge(edge_id);
        }
    }

    /// `unlink(edge)` (spec 4.2): removes `edge_id` from both lists it
    /// participates in. When the producer's outgoing list becomes empty,
    /// clears its `OBSERVED` flag, and — if the producer is itself a
    /// `Derived` — detaches its own incoming edges and marks it stale, so
    /// it recomputes fresh the next time it is observed (spec section 3's
    /// Derived lifecycle).
    fn unlink_edge(&self, edge_id: EdgeId) {
        let (producer, consumer) = {
            let edges = self.edges.borrow();
            let e = edges.get(edge_id);
            (e.producer, e.consumer)
        };
        debug_assert!(
            self.nodes.borrow().header(producer).status.observed(),
            "a producer with a live outgoing edge must carry OBSERVED"
        );
        let became_unobserved = {
            let mut nodes = self.nodes.borrow_mut();
            let (producer_lists, consumer_lists) = nodes.lists_pair_mut(producer, consumer);
            self.edges
                .borrow_mut()
                .unlink(edge_id, consumer_lists, producer_lists);
            let still_observed = nodes.header(producer).lists.outgoing_head.is_some();
            if !still_observed {
                nodes.header_mut(producer).status.set_observed(false);
            }
            !still_observed
        };
        if became_unobserved && self.nodes.borrow().kind(producer) == NodeKind::Derived {
            self.detach_all_incoming(producer);
            let mut nodes = self.nodes.borrow_mut();
            nodes.header_mut(producer).status.set_state(Lifecycle::Invalidated);
            if let NodeData::Derived(d) = nodes.data_mut(producer) {
                d.value = None;
            }
        }
    }

    /// `detachAll(consumer)` (spec 4.2): walks the incoming list unlinking
    /// every edge. Used on effect disposal and on a derived becoming
    /// unobserved.
    pub(crate) fn detach_all_incoming(&self, consumer: NodeId) {
        loop {
            let head = self.nodes.borrow().header(consumer).lists.incoming_head;
            match head {
                Some(edge_id) => self.unlink_edge(edge_id),
                None => break,
            }
        }
        self.nodes
            .borrow_mut()
            .header_mut(consumer)
            .lists
            .tracking_cursor = None;
    }

    // ---- work queue (spec 4.5) ---------------------------------------------

    /// `enqueue(node)`: if `SCHEDULED` is set, no-op; else set
    /// `SCHEDULED`, append at tail.
    pub(crate) fn enqueue(&self, id: NodeId) {
        {
            let mut nodes = self.nodes.borrow_mut();
            if nodes.header(id).status.scheduled() {
                return;
            }
            let header = nodes.header_mut(id);
            header.status.set_scheduled(true);
            header.next_scheduled = None;
        }
        match self.queue_tail.get() {
            Some(tail) => {
                self.nodes.borrow_mut().header_mut(tail).next_scheduled = Some(id);
            }
            None => self.queue_head.set(Some(id)),
        }
        self.queue_tail.set(Some(id));
    }

    /// `flush()` (spec 4.5): drains the queue in FIFO order, invoking each
    /// node's effect body. Re-entrant scheduling during a flush cycle
    /// (an effect enqueuing another effect, directly or via a write) is
    /// appended and executed within the *same* flush cycle (spec 4.5's
    /// ordering rule, section 5 ordering guarantee 2) — the outer `loop`
    /// here re-snapshots the queue after each cohort completes, continuing
    /// until nothing new was added.
    pub(crate) fn flush(&self) {
        loop {
            let Some(mut cursor) = self.queue_head.take() else {
                break;
            };
            self.queue_tail.set(None);

            loop {
                let (next, was_disposed) = {
                    let mut nodes = self.nodes.borrow_mut();
                    let header = nodes.header_mut(cursor);
                    let next = header.next_scheduled.take();
                    header.status.set_scheduled(false);
                    (next, header.status.is_disposed())
                };

                if !was_disposed {
                    match pull::run_effect(self, cursor) {
                        Ok(()) => self.stats.borrow_mut().effects_run += 1,
                        Err(e) => self.report_error(e),
                    }
                }

                match next {
                    Some(n) => cursor = n,
                    None => break,
                }
            }

            if self.queue_head.get().is_none() {
                break;
            }
        }
    }

    /// `dispose(node, cleanup)` (spec 4.5/4.6): idempotent; sets
    /// `DISPOSED`, detaches all incoming edges, and invokes the effect's
    /// stored cleanup closure. The `SCHEDULED` marker, if set, is left
    /// alone here — it is cleared lazily when the queue reaches this node
    /// (spec 4.5: "Disposed nodes in the queue are skipped when
    /// dequeued... they still get their SCHEDULED/nextScheduled cleared").
    pub(crate) fn dispose_effect(&self, id: NodeId) {
        let already_disposed = self.nodes.borrow().header(id).status.is_disposed();
        if already_disposed {
            return;
        }
        self.nodes
            .borrow_mut()
            .header_mut(id)
            .status
            .set_state(Lifecycle::Disposed);
        self.detach_all_incoming(id);

        let cleanup = {
            let mut nodes = self.nodes.borrow_mut();
            match nodes.data_mut(id) {
                NodeData::Effect(e) => e.cleanup.take(),
                _ => None,
            }
        };
        if let Some(cleanup) = cleanup {
            if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup)) {
                self.report_error(GraphError::from_panic_payload(payload));
            }
        }
    }

    // ---- batching (spec 4.6) -----------------------------------------------

    pub(crate) fn enter_batch_scope(&self) -> BatchGuard<'_> {
        self.batch_depth.set(self.batch_depth.get() + 1);
        BatchGuard { graph: self }
    }

    fn exit_batch(&self) {
        let depth = self.batch_depth.get() - 1;
        self.batch_depth.set(depth);
        if depth == 0 {
            self.flush();
        }
    }

    // ---- introspection (SPEC_FULL.md section 0.1) --------------------------

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// `SPEC_FULL.md` section 0.1's `live_nodes`: count of nodes not
    /// `Disposed`, mirroring the teacher's `Graph::live`/`live_reachable`
    /// diagnostic iterators (`lib.rs`).
    pub(crate) fn live_nodes(&self) -> usize {
        let nodes = self.nodes.borrow();
        (0..nodes.len())
            .filter(|&i| !nodes.header(crate::node::NodeId(i as u32)).status.is_disposed())
            .count()
    }

    /// `visualize()` (`SPEC_FULL.md` section 0.1): renders the current node
    /// and edge set as GraphViz dot, grounded on the teacher's
    /// `InnerGraph::visualize` (`lib.rs`). The teacher builds this via
    /// `petgraph::dot::Dot`; this engine's nodes are already a plain `Vec`
    /// walked through the intrusive outgoing lists, so the text is built by
    /// hand with `std::fmt::Write` rather than pulling `petgraph` back in
    /// just for debug output.
    pub(crate) fn visualize(&self) -> String {
        use std::fmt::Write as _;

        let nodes = self.nodes.borrow();
        let edges = self.edges.borrow();
        let mut out = String::from("digraph signal_graph {\n");

        for i in 0..nodes.len() {
            let id = NodeId(i as u32);
            let status = nodes.header(id).status;
            let _ = writeln!(
                out,
                "  n{} [label=\"{} {}\\n{:?}\"];",
                i,
                id,
                nodes.kind(id).label(),
                status.state()
            );
        }
        for i in 0..nodes.len() {
            let id = NodeId(i as u32);
            for edge_id in edges.iter_outgoing(&nodes.header(id).lists) {
                let consumer = edges.get(edge_id).consumer;
                let _ = writeln!(out, "  n{} -> n{};", id.0, consumer.0);
            }
        }

        out.push_str("}\n");
        out
    }
}
