// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Error kinds produced by the engine.
//!
//! The node set here is a closed, concrete enum (`Signal`, `Derived`,
//! `Effect`), so errors are a concrete enum too, rather than a trait object
//! an embedder would otherwise need to implement.

use std::fmt;

/// A cycle error carries the message describing which node was re-entered;
/// it is also used as the `std::panic` payload type so the flush loop can
/// tell a cycle apart from an arbitrary user panic by downcasting.
#[derive(Debug)]
pub(crate) struct CyclePayload(pub(crate) String);

/// An error observed by the engine: either a dependency cycle or a user
/// panic that occurred inside a compute or effect closure.
#[derive(Debug, Clone)]
pub enum GraphError {
    /// A node carrying the `Running` state was entered again. Fatal to the
    /// current compute/effect invocation.
    Cycle(String),
    /// A user closure (compute, effect body, cleanup) panicked.
    Panic(String),
    /// The configured max propagation depth was exceeded during push
    /// propagation; the walk was aborted early and the remainder of the
    /// graph past that point was left un-invalidated.
    DepthExceeded(usize),
}

impl GraphError {
    pub(crate) fn panicked(description: impl Into<String>) -> GraphError {
        GraphError::Panic(description.into())
    }

    /// Turns a caught `std::panic` payload into a `GraphError`, recognizing
    /// our own `CyclePayload` marker so cycle errors are reported precisely
    /// rather than as an opaque panic message.
    pub(crate) fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> GraphError {
        if let Some(cycle) = payload.downcast_ref::<CyclePayload>() {
            return GraphError::Cycle(cycle.0.clone());
        }
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        GraphError::panicked(message)
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::Cycle(msg) => write!(f, "cyclic reactive dependency: {msg}"),
            GraphError::Panic(msg) => write!(f, "panic in reactive closure: {msg}"),
            GraphError::DepthExceeded(limit) => {
                write!(f, "invalidation walk exceeded configured max depth ({limit})")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Tests whether a caught panic payload is one of our own cycle markers,
/// used by the pull propagator to bump [`crate::graph::GraphStats::cycles_detected`]
/// before resuming the unwind.
pub(crate) fn is_cycle_payload(payload: &(dyn std::any::Any + Send)) -> bool {
    payload.downcast_ref::<CyclePayload>().is_some()
}

/// Raises a cycle error as a Rust panic carrying a [`CyclePayload`], so it
/// unwinds through every enclosing `run` scope-guard (restoring `Running`
/// flags as it goes) before being caught and reported at the boundary
/// appropriate for the node kind that detected it.
pub(crate) fn raise_cycle(description: impl Into<String>) -> ! {
    std::panic::panic_any(CyclePayload(description.into()))
}
