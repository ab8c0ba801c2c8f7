// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Node storage: the `Signal`/`Derived`/`Effect` entities that make up the
//! reactive graph.
//!
//! The node set is closed and known in advance, so it is represented as a
//! concrete enum dispatched by pattern match rather than an open trait
//! dispatched through a vtable — traversal code never needs a per-type
//! recursive method call.

use std::any::Any;
use std::fmt;

use crate::edge::EdgeLists;
use crate::state::Status;

/// A stable index into the node arena. Nodes are never removed from the
/// arena — only disposed in place — so indices stay valid for the engine's
/// entire lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The two capability predicates traversal code needs: does this node have
/// an outgoing list (can it be a dependency of something), and is it
/// schedulable (does it belong in the work queue)? Read directly rather
/// than dispatched through a per-kind method.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum NodeKind {
    Signal,
    Derived,
    Effect,
}

impl NodeKind {
    pub(crate) fn has_outgoing(self) -> bool {
        matches!(self, NodeKind::Signal | NodeKind::Derived)
    }

    pub(crate) fn is_schedulable(self) -> bool {
        matches!(self, NodeKind::Effect)
    }

    /// The short label `visualize()` puts on a rendered node.
    pub(crate) fn label(self) -> &'static str {
        match self {
            NodeKind::Signal => "signal",
            NodeKind::Derived => "derived",
            NodeKind::Effect => "effect",
        }
    }
}

/// The equality function used to decide "changed" for a boxed, type-erased
/// value (spec section 1: equality is caller-definable, default
/// identity/`PartialEq`; section 6's `equality` config option). A type
/// alias rather than a struct: both endpoints of a producer need the
/// function available whether or not they currently hold a cached value,
/// so it lives directly on `SignalData`/`DerivedData` rather than bundled
/// with the value itself.
pub(crate) type Equality = std::rc::Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;

/// Builds the default identity equality for a concrete `T` (spec section
/// 6: `equality` defaults to identity; in Rust the natural reading of
/// "identity" for an arbitrary owned value is `PartialEq`). The public
/// API (`ReactiveGraph::signal`/`computed`) calls this unless the caller
/// supplies a custom comparator.
pub(crate) fn default_equality<T: PartialEq + 'static>() -> Equality {
    std::rc::Rc::new(|a: &dyn Any, b: &dyn Any| {
        match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    })
}

/// A producer's type-erased value plus the equality it was created with.
/// Kept together so `SignalData`/`DerivedData` don't need a type
/// parameter — the arena stores heterogeneous nodes side by side, exactly
/// the "polymorphic, heterogeneous nodes" problem spec section 9 calls
/// out.
pub(crate) struct SignalData {
    pub(crate) value: Box<dyn Any>,
    pub(crate) equality: Equality,
}

/// The compute closure and cached value of a derived node. Both `compute`
/// and `value` are `Option` so they can be `take()`n out before the
/// closure runs — releasing any borrow on the arena before calling into
/// opaque user code that will likely re-enter the arena itself (`get()`
/// on some other handle). This is the exact technique
/// `sycamore-reactive`'s `Root::run_node_update` uses ("we take the
/// callback out because that requires a mut ref and we cannot hold that
/// while running update itself"). `equality` is always present — it is
/// supplied at creation time by the typed public API (`ReactiveGraph::computed`),
/// independent of whether a value has been computed yet.
pub(crate) struct DerivedData {
    pub(crate) compute: Option<Box<dyn FnMut() -> Box<dyn Any>>>,
    pub(crate) value: Option<Box<dyn Any>>,
    pub(crate) equality: Equality,
}

/// An effect's body and the cleanup closure returned by its previous run.
/// Same take-before-call discipline as `DerivedData`.
pub(crate) struct EffectData {
    pub(crate) run: Option<Box<dyn FnMut() -> Option<Box<dyn FnOnce()>>>>,
    pub(crate) cleanup: Option<Box<dyn FnOnce()>>,
}

pub(crate) enum NodeData {
    Signal(SignalData),
    Derived(DerivedData),
    Effect(EffectData),
}

impl NodeData {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            NodeData::Signal(_) => NodeKind::Signal,
            NodeData::Derived(_) => NodeKind::Derived,
            NodeData::Effect(_) => NodeKind::Effect,
        }
    }
}

/// Everything the graph needs about a node besides its payload: lifecycle
/// status, linked-list pointers, the scheduler's intrusive `nextScheduled`
/// pointer, and a producer `version` counter. Every node carries every
/// field regardless of kind (a pure consumer's outgoing fields simply
/// stay empty) — the spec does not ask for a byte-minimal encoding, and a
/// single uniform header keeps arena indexing simple, the same trade the
/// teacher makes by giving every `Entry<N>` a `state: Arc<Mutex<EntryState<N>>>`
/// regardless of whether `N` ever actually gets cleaned.
pub(crate) struct NodeHeader {
    pub(crate) status: Status,
    pub(crate) lists: EdgeLists,
    /// Monotonically increasing version (spec section 3). Bumped whenever
    /// this node's observable value changes. Meaningless for `Effect`
    /// (never read as a dependency) but always present for a uniform
    /// header.
    pub(crate) version: u64,
    /// The work queue's intrusive "next scheduled" pointer (spec 4.5).
    pub(crate) next_scheduled: Option<NodeId>,
}

impl NodeHeader {
    fn new() -> NodeHeader {
        NodeHeader {
            status: Status::new(),
            lists: EdgeLists::default(),
            version: 0,
            next_scheduled: None,
        }
    }
}

pub(crate) struct Node {
    pub(crate) header: NodeHeader,
    pub(crate) data: NodeData,
}

/// The node arena: a growable `Vec<Node>`, never shrunk. Mirrors the
/// teacher's `InnerGraph::ensure_entry` discipline of allocating a fresh
/// `EntryId` and never reclaiming it.
#[derive(Default)]
pub(crate) struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub(crate) fn new() -> NodeArena {
        NodeArena::default()
    }

    pub(crate) fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            header: NodeHeader::new(),
            data,
        });
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn header(&self, id: NodeId) -> &NodeHeader {
        &self.nodes[id.0 as usize].header
    }

    pub(crate) fn header_mut(&mut self, id: NodeId) -> &mut NodeHeader {
        &mut self.nodes[id.0 as usize].header
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0 as usize].data
    }

    pub(crate) fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0 as usize].data
    }

    pub(crate) fn kind(&self, id: NodeId) -> NodeKind {
        self.data(id).kind()
    }

    /// Splits the borrow so callers needing both endpoints' `EdgeLists` at
    /// once (e.g. `track`, which touches the producer's and the
    /// consumer's lists together) can get two disjoint `&mut` without
    /// fighting the borrow checker over a single `Vec` index.
    pub(crate) fn lists_pair_mut(
        &mut self,
        a: NodeId,
        b: NodeId,
    ) -> (&mut EdgeLists, &mut EdgeLists) {
        assert_ne!(a, b, "a node cannot be its own dependency pair");
        let (lo, hi) = if a.0 < b.0 { (a.0, b.0) } else { (b.0, a.0) };
        let (left, right) = self.nodes.split_at_mut(hi as usize);
        let (lo_lists, hi_lists) = (&mut left[lo as usize].header.lists, &mut right[0].header.lists);
        if a.0 < b.0 {
            (lo_lists, hi_lists)
        } else {
            (hi_lists, lo_lists)
        }
    }
}
