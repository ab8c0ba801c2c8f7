// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The intrusive bidirectional dependency graph (spec section 4.2).
//!
//! The teacher represents its dependency graph with `petgraph::DiGraph`
//! (`lib.rs`'s `PGraph<N>`), which owns a `Vec`-backed node/edge arena
//! internally but does not expose the prev/next pointers this spec's
//! `track`/`unlink`/`pruneStale` fast paths need direct control over.
//! This module re-implements that same "stable-index arena" idea by hand
//! (`EdgeId` as a `Vec<Edge>` index, mirroring the teacher's `EntryId`
//! being a `petgraph` node index) so the doubly-linked list pointers are
//! ours to splice directly.

use crate::node::NodeId;

/// A stable index into the edge arena. Never reused while an edge is live;
/// recycled (via the arena's free list) only after `unlink`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) struct EdgeId(u32);

/// A single dependency: `producer -> consumer`, embedded in two doubly
/// linked lists (the consumer's incoming list, the producer's outgoing
/// list) per spec section 3's Edge entity.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Edge {
    pub(crate) producer: NodeId,
    pub(crate) consumer: NodeId,
    /// The consumer's `trackingVersion` as of the moment this edge was
    /// last (re)confirmed by `track`. Used by `pruneStale` only indirectly
    /// (see `GraphInner::prune_stale`, which walks past the tail cursor
    /// rather than comparing this field) — retained because spec 3's Edge
    /// entity and invariant 7 name it explicitly.
    pub(crate) tracking_stamp: u32,
    /// The producer's own `version` as observed the last time this edge
    /// was confirmed. Compared against the producer's current `version`
    /// during pull (spec 4.4 step 2) to decide definitive staleness,
    /// mirroring the teacher's `Generation` comparison in
    /// `Graph::dependencies_changed` (`lib.rs`) and `Entry::complete`'s
    /// `dep_generations` (`entry.rs`) — adapted from a side-table of
    /// `(EntryId, Generation)` pairs into a field directly on the edge,
    /// since here every edge already carries both endpoints.
    pub(crate) observed_producer_version: u64,

    prev_in: Option<EdgeId>,
    next_in: Option<EdgeId>,
    prev_out: Option<EdgeId>,
    next_out: Option<EdgeId>,
}

impl Edge {
    /// The next edge in the consumer's incoming list, if any. Exposed as a
    /// method (rather than a public field) so callers outside this module
    /// can walk the list without being able to splice it directly.
    pub(crate) fn next_in(&self) -> Option<EdgeId> {
        self.next_in
    }
}

/// Per-node linked-list bookkeeping shared by every node kind (producers
/// use the outgoing fields, consumers use the incoming fields; a
/// `Derived` uses both). Kept separate from `NodeData` (node.rs) so the
/// edge module owns exactly the fields it splices.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct EdgeLists {
    pub(crate) incoming_head: Option<EdgeId>,
    pub(crate) incoming_tail: Option<EdgeId>,
    pub(crate) outgoing_head: Option<EdgeId>,
    pub(crate) outgoing_tail: Option<EdgeId>,
    /// The "tail cursor" (spec 4.2, 4.4): the last edge in the incoming
    /// list confirmed as still valid during the consumer's current run.
    /// `None` means "before the head" (no edge confirmed yet this run).
    pub(crate) tracking_cursor: Option<EdgeId>,
    /// Incremented once per run (spec section 3's Derived entity).
    pub(crate) tracking_version: u32,
}

/// The edge arena: a growable `Vec<Edge>` plus a free list of unlinked
/// slots, exactly mirroring how `petgraph`'s `DiGraph` stores edges
/// internally (the structure the teacher depends on to do this), minus
/// the parts of petgraph's API that don't expose raw list-splicing.
#[derive(Default)]
pub(crate) struct EdgeArena {
    edges: Vec<Edge>,
    free: Vec<EdgeId>,
}

impl EdgeArena {
    pub(crate) fn new() -> EdgeArena {
        EdgeArena::default()
    }

    pub(crate) fn get(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0 as usize]
    }

    fn get_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.0 as usize]
    }

    fn alloc(&mut self, edge: Edge) -> EdgeId {
        if let Some(id) = self.free.pop() {
            self.edges[id.0 as usize] = edge;
            id
        } else {
            let id = EdgeId(self.edges.len() as u32);
            self.edges.push(edge);
            id
        }
    }

    /// `track(producer, consumer)` (spec 4.2): ensure an edge exists
    /// between them for the current run, reusing the incoming-list tail
    /// cursor as a fast path when dependency order is stable across runs
    /// (the common case), falling back to an O(1) splice otherwise.
    /// `consumer_lists`/`producer_lists` are the endpoints' `EdgeLists`,
    /// taken by the caller (`GraphInner`, which owns the node arena) via
    /// direct indexing so this function can splice in O(1) without
    /// re-deriving node kinds.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn track(
        &mut self,
        producer: NodeId,
        consumer: NodeId,
        producer_version: u64,
        consumer_lists: &mut EdgeLists,
        producer_lists: &mut EdgeLists,
    ) {
        let stamp = consumer_lists.tracking_version;

        // Fast-path 1: the cursor already points at this producer.
        if let Some(cursor) = consumer_lists.tracking_cursor {
            if self.get(cursor).producer == producer {
                let e = self.get_mut(cursor);
                e.tracking_stamp = stamp;
                e.observed_producer_version = producer_version;
                return;
            }
            // Fast-path 2: the edge right after the cursor matches.
            if let Some(next) = self.get(cursor).next_in {
                if self.get(next).producer == producer {
                    let e = self.get_mut(next);
                    e.tracking_stamp = stamp;
                    e.observed_producer_version = producer_version;
                    consumer_lists.tracking_cursor = Some(next);
                    return;
                }
            }
        } else if let Some(head) = consumer_lists.incoming_head {
            // Cursor is "before head": check the head itself.
            if self.get(head).producer == producer {
                let e = self.get_mut(head);
                e.tracking_stamp = stamp;
                e.observed_producer_version = producer_version;
                consumer_lists.tracking_cursor = Some(head);
                return;
            }
        }

        // Fast-path 3: this producer was already (re)tracked by this
        // consumer earlier in the same run — its outgoing tail already
        // points back here at the current tracking version.
        if let Some(out_tail) = producer_lists.outgoing_tail {
            let e = self.get(out_tail);
            if e.consumer == consumer && e.tracking_stamp == stamp {
                return;
            }
        }

        // Otherwise: allocate, splice into both tail positions, stamp.
        let insert_after = consumer_lists.tracking_cursor;
        let insert_before = match insert_after {
            Some(cursor) => self.get(cursor).next_in,
            None => consumer_lists.incoming_head,
        };

        let new_id = self.alloc(Edge {
            producer,
            consumer,
            tracking_stamp: stamp,
            observed_producer_version: producer_version,
            prev_in: insert_after,
            next_in: insert_before,
            prev_out: producer_lists.outgoing_tail,
            next_out: None,
        });

        match insert_after {
            Some(cursor) => self.get_mut(cursor).next_in = Some(new_id),
            None => consumer_lists.incoming_head = Some(new_id),
        }
        match insert_before {
            Some(next) => self.get_mut(next).prev_in = Some(new_id),
            None => consumer_lists.incoming_tail = Some(new_id),
        }

        match producer_lists.outgoing_tail {
            Some(tail) => self.get_mut(tail).next_out = Some(new_id),
            None => producer_lists.outgoing_head = Some(new_id),
        }
        producer_lists.outgoing_tail = Some(new_id);

        consumer_lists.tracking_cursor = Some(new_id);
    }

    /// `unlink(edge)` (spec 4.2): constant-time removal from both lists.
    /// Returns the edge's old `next_in` (to support iteration by the
    /// caller) together with the producer, so the caller can decide
    /// whether the producer just became unobserved.
    pub(crate) fn unlink(
        &mut self,
        id: EdgeId,
        consumer_lists: &mut EdgeLists,
        producer_lists: &mut EdgeLists,
    ) -> Option<EdgeId> {
        let e = *self.get(id);

        match e.prev_in {
            Some(p) => self.get_mut(p).next_in = e.next_in,
            None => consumer_lists.incoming_head = e.next_in,
        }
        match e.next_in {
            Some(n) => self.get_mut(n).prev_in = e.prev_in,
            None => consumer_lists.incoming_tail = e.prev_in,
        }
        if consumer_lists.tracking_cursor == Some(id) {
            consumer_lists.tracking_cursor = e.prev_in;
        }

        match e.prev_out {
            Some(p) => self.get_mut(p).next_out = e.next_out,
            None => producer_lists.outgoing_head = e.next_out,
        }
        match e.next_out {
            Some(n) => self.get_mut(n).prev_out = e.prev_out,
            None => producer_lists.outgoing_tail = e.prev_out,
        }

        self.free.push(id);
        e.next_in
    }

    /// The first edge that is stale after a run (spec 4.2's `pruneStale`):
    /// whatever comes after the tail cursor, or the whole list if nothing
    /// was confirmed this run.
    pub(crate) fn stale_start(&self, lists: &EdgeLists) -> Option<EdgeId> {
        match lists.tracking_cursor {
            Some(cursor) => self.get(cursor).next_in,
            None => lists.incoming_head,
        }
    }

    /// Walks the incoming list starting at an arbitrary edge (rather than
    /// always the list head), used to collect the stale tail found by
    /// `stale_start` before unlinking any of it.
    pub(crate) fn incoming_from(&self, start: Option<EdgeId>) -> IncomingIter<'_> {
        IncomingIter {
            edges: self,
            cursor: start,
        }
    }

    pub(crate) fn iter_outgoing(&self, lists: &EdgeLists) -> OutgoingIter<'_> {
        OutgoingIter {
            edges: self,
            cursor: lists.outgoing_head,
        }
    }
}

pub(crate) struct IncomingIter<'a> {
    edges: &'a EdgeArena,
    cursor: Option<EdgeId>,
}

impl<'a> Iterator for IncomingIter<'a> {
    type Item = EdgeId;
    fn next(&mut self) -> Option<EdgeId> {
        let id = self.cursor?;
        self.cursor = self.edges.get(id).next_in;
        Some(id)
    }
}

pub(crate) struct OutgoingIter<'a> {
    edges: &'a EdgeArena,
    cursor: Option<EdgeId>,
}

impl<'a> Iterator for OutgoingIter<'a> {
    type Item = EdgeId;
    fn next(&mut self) -> Option<EdgeId> {
        let id = self.cursor?;
        self.cursor = self.edges.get(id).next_out;
        Some(id)
    }
}
