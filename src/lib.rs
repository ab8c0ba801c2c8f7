// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A fine-grained, push-pull reactive signal engine.
//!
//! This crate implements the core described by `SPEC_FULL.md`: a dynamic
//! bipartite dependency graph between producers (signals, derived values)
//! and consumers (derived values, effects), propagated glitch-free via a
//! push phase (eager invalidation) and a pull phase (lazy, minimally
//! recomputed revalidation).
//!
//! ```
//! use signal_graph::ReactiveGraph;
//!
//! let graph = ReactiveGraph::new();
//! let count = graph.signal(0);
//! let doubled = {
//!     let count = count.clone();
//!     graph.computed(move || count.get() * 2)
//! };
//! assert_eq!(doubled.get(), 0);
//! count.set(3);
//! assert_eq!(doubled.get(), 6);
//! ```

#![deny(warnings)]
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

mod edge;
mod error;
mod graph;
mod node;
mod pull;
mod push;
mod state;

#[cfg(test)]
mod tests;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

pub use crate::error::GraphError;
pub use crate::graph::GraphStats;

use crate::graph::GraphInner;
use crate::node::{default_equality, Equality, NodeData, NodeId};

/// Configuration recognized by a [`ReactiveGraph`] (spec section 6): the
/// effect error sink, the default equality policy new signals/derivations
/// are created with, and an optional guard against pathological graphs.
///
/// Mirrors the teacher's constructor-variant idiom
/// (`Graph::new`/`Graph::new_with_invalidation_delay`, `lib.rs`) as a
/// small builder rather than a second constructor per option.
pub struct GraphConfig {
    on_error: Box<dyn Fn(GraphError)>,
    max_depth: Option<usize>,
}

impl GraphConfig {
    pub fn new() -> GraphConfig {
        GraphConfig::default()
    }

    /// `onError` (spec section 6): the sink effect errors are forwarded
    /// to. Defaults to logging at `error` level via the `log` facade.
    pub fn on_error(mut self, sink: impl Fn(GraphError) + 'static) -> GraphConfig {
        self.on_error = Box::new(sink);
        self
    }

    /// `maxDepth` (spec section 6): an optional bound on push-propagation
    /// stack depth, past which the walk is aborted and a
    /// [`GraphError::DepthExceeded`] is reported. Default none.
    pub fn max_depth(mut self, depth: usize) -> GraphConfig {
        self.max_depth = Some(depth);
        self
    }
}

impl Default for GraphConfig {
    fn default() -> GraphConfig {
        GraphConfig {
            on_error: Box::new(|err| log::error!("{err}")),
            max_depth: None,
        }
    }
}

/// A reactive context (spec section 9: "the engine's context... is
/// per-context... Library must allow creating and disposing contexts").
/// Cheap to clone — internally an `Rc` to the shared engine state — so
/// handles created from one context can be passed around freely, but
/// never mixed with handles from a different `ReactiveGraph`.
#[derive(Clone)]
pub struct ReactiveGraph {
    inner: Rc<GraphInner>,
}

impl ReactiveGraph {
    pub fn new() -> ReactiveGraph {
        ReactiveGraph::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> ReactiveGraph {
        ReactiveGraph {
            inner: Rc::new(GraphInner::new(config.on_error, config.max_depth)),
        }
    }

    /// `signal(initial)` (spec section 6): creates a mutable producer.
    /// Uses `T`'s own `PartialEq` as the default equality (spec section
    /// 1: "identity equality" — the natural Rust reading for an owned
    /// value without reference semantics).
    pub fn signal<T: PartialEq + Clone + 'static>(&self, initial: T) -> Signal<T> {
        let id = self.inner.create_signal(initial, default_equality::<T>());
        Signal {
            graph: self.inner.clone(),
            id,
            _marker: PhantomData,
        }
    }

    /// As [`ReactiveGraph::signal`], but with a caller-supplied equality
    /// function (spec section 6's `equality` config option, applied here
    /// per-handle rather than globally — a derivation or signal is free
    /// to compare its own value type however it likes).
    pub fn signal_with_equality<T: Clone + 'static>(
        &self,
        initial: T,
        equality: impl Fn(&T, &T) -> bool + 'static,
    ) -> Signal<T> {
        let id = self.inner.create_signal(initial, erase_equality(equality));
        Signal {
            graph: self.inner.clone(),
            id,
            _marker: PhantomData,
        }
    }

    /// `computed(fn)` (spec section 6): creates a derived value in
    /// `Invalidated` state; its compute closure does not run until first
    /// read.
    pub fn computed<T: PartialEq + Clone + 'static>(
        &self,
        mut compute: impl FnMut() -> T + 'static,
    ) -> Computed<T> {
        let boxed: Box<dyn FnMut() -> Box<dyn Any>> = Box::new(move || Box::new(compute()) as _);
        let id = self.inner.create_derived(boxed, default_equality::<T>());
        Computed {
            graph: self.inner.clone(),
            id,
            _marker: PhantomData,
        }
    }

    pub fn computed_with_equality<T: Clone + 'static>(
        &self,
        mut compute: impl FnMut() -> T + 'static,
        equality: impl Fn(&T, &T) -> bool + 'static,
    ) -> Computed<T> {
        let boxed: Box<dyn FnMut() -> Box<dyn Any>> = Box::new(move || Box::new(compute()) as _);
        let id = self
            .inner
            .create_derived(boxed, erase_equality(equality));
        Computed {
            graph: self.inner.clone(),
            id,
            _marker: PhantomData,
        }
    }

    /// `effect(fn)` (spec section 6): creates an effect and runs it
    /// immediately. The returned [`Effect`] is an idempotent disposer.
    pub fn effect(
        &self,
        mut body: impl FnMut() -> Option<Box<dyn FnOnce()>> + 'static,
    ) -> Effect {
        let run: Box<dyn FnMut() -> Option<Box<dyn FnOnce()>>> = Box::new(move || body());
        let id = self.inner.create_effect(run);
        Effect {
            graph: self.inner.clone(),
            id,
        }
    }

    /// `batch(fn)` (spec section 4.6): writes inside `fn` still push
    /// eagerly; only the flush of scheduled effects is deferred until the
    /// outermost batch exits (including via an unwinding panic).
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.enter_batch_scope();
        f()
    }

    /// `untrack(fn)` (spec section 4.6): reads performed inside `fn` do
    /// not create dependency edges, even if a consumer is currently
    /// running.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.untrack_scope();
        f()
    }

    /// Runtime activity counters (`SPEC_FULL.md` section 0.1).
    pub fn stats(&self) -> GraphStats {
        self.inner.stats()
    }

    /// The number of nodes ever created in this context (never shrinks —
    /// disposed/unobserved nodes remain in the arena, per spec section 9's
    /// "avoid cyclic ownership by making every pointer in the graph a
    /// non-owning handle into the arena").
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// The number of nodes that are not yet `Disposed` (`SPEC_FULL.md`
    /// section 0.1, the analogue of the teacher's `Graph::live_reachable`).
    /// Unlike `node_count`, this one does shrink as effects are disposed.
    pub fn live_nodes(&self) -> usize {
        self.inner.live_nodes()
    }

    /// Renders the current node and edge set as a GraphViz dot-format
    /// string (`SPEC_FULL.md` section 0.1), for debugging — not wired to
    /// any particular renderer, just text a caller can write to a file or
    /// feed to `dot` themselves.
    pub fn visualize(&self) -> String {
        self.inner.visualize()
    }
}

impl Default for ReactiveGraph {
    fn default() -> ReactiveGraph {
        ReactiveGraph::new()
    }
}

fn erase_equality<T: 'static>(equality: impl Fn(&T, &T) -> bool + 'static) -> Equality {
    Rc::new(move |a: &dyn Any, b: &dyn Any| {
        match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => equality(a, b),
            _ => false,
        }
    })
}

fn downcast_clone<T: Clone + 'static>(value: &dyn Any) -> T {
    value
        .downcast_ref::<T>()
        .expect("signal_graph: handle used with the type it was created with")
        .clone()
}

/// A mutable, leaf producer of a single value (spec section 3's Signal).
///
/// Cheaply `Clone`-able: every clone refers to the same underlying node,
/// the same way closures captured a `Signal<T>` in the doctest above share
/// state with the original handle.
pub struct Signal<T> {
    graph: Rc<GraphInner>,
    id: NodeId,
    _marker: PhantomData<T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Signal<T> {
        Signal {
            graph: self.graph.clone(),
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// `get(signal)` (spec section 6): tracks a dependency on the
    /// currently active consumer, if any, then returns the current value.
    pub fn get(&self) -> T {
        self.graph.track_read(self.id);
        self.read()
    }

    /// `peek(signal)` (spec section 6): reads without tracking.
    pub fn peek(&self) -> T {
        self.read()
    }

    fn read(&self) -> T {
        let nodes = self.graph.nodes.borrow();
        match nodes.data(self.id) {
            NodeData::Signal(s) => downcast_clone(s.value.as_ref()),
            _ => unreachable!("Signal handle referred to a non-signal node"),
        }
    }

    /// `set(signal, v)` (spec section 6). Compares against the prior
    /// value using whichever equality the signal was created with
    /// ([`ReactiveGraph::signal`]'s `PartialEq` default, or a custom
    /// comparator from [`ReactiveGraph::signal_with_equality`]).
    pub fn set(&self, value: T) {
        self.graph.write_signal(self.id, value);
    }
}

/// A producer whose value is a pure function of other producers; also a
/// consumer (spec section 3's Derived/computed).
pub struct Computed<T> {
    graph: Rc<GraphInner>,
    id: NodeId,
    _marker: PhantomData<T>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Computed<T> {
        Computed {
            graph: self.graph.clone(),
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// `get(derived)` (spec section 6): revalidates via the pull phase if
    /// necessary, tracks a dependency on the currently active consumer,
    /// then returns the up-to-date value. Panics with a cycle payload if
    /// this derived is already running (re-entrant read).
    pub fn get(&self) -> T {
        self.graph.ensure_fresh(self.id);
        self.graph.track_read(self.id);
        self.read()
    }

    /// `peek(derived)` (spec section 6): revalidates but does not track.
    pub fn peek(&self) -> T {
        self.graph.ensure_fresh(self.id);
        self.read()
    }

    fn read(&self) -> T {
        let nodes = self.graph.nodes.borrow();
        match nodes.data(self.id) {
            NodeData::Derived(d) => downcast_clone(
                d.value
                    .as_ref()
                    .expect("ensure_fresh always leaves a Derived with a value")
                    .as_ref(),
            ),
            _ => unreachable!("Computed handle referred to a non-derived node"),
        }
    }
}

/// A consumer that performs side effects (spec section 3's Effect).
///
/// The disposer spec section 6's `effect(fn)` returns. `dispose` is
/// idempotent and may be called from inside the effect's own body (spec
/// section 8's boundary behavior: "An effect that disposes itself during
/// its own run completes that run... and does not run again").
#[derive(Clone)]
pub struct Effect {
    graph: Rc<GraphInner>,
    id: NodeId,
}

impl Effect {
    /// `dispose(effect)` (spec section 6).
    pub fn dispose(&self) {
        self.graph.dispose_effect(self.id);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").field("id", &self.id).finish()
    }
}
