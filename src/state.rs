// Copyright 2026 The signal_graph Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The node state bitfield: a small set of mutually exclusive lifecycle
//! states packed in the low bits, plus a handful of orthogonal boolean
//! flags in the higher bits.

/// Mutually exclusive lifecycle states a node can be in.
///
/// `Clean` and `Invalidated` apply to every node kind; `Running` additionally
/// guards re-entrancy (a node carrying `Running` cannot be re-entered);
/// `Disposed` is terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    Clean,
    Invalidated,
    Running,
    Disposed,
}

impl Lifecycle {
    fn bits(self) -> u8 {
        match self {
            Lifecycle::Clean => 0,
            Lifecycle::Invalidated => 1,
            Lifecycle::Running => 2,
            Lifecycle::Disposed => 3,
        }
    }

    fn from_bits(bits: u8) -> Lifecycle {
        match bits {
            0 => Lifecycle::Clean,
            1 => Lifecycle::Invalidated,
            2 => Lifecycle::Running,
            3 => Lifecycle::Disposed,
            _ => unreachable!("only two bits are ever stored"),
        }
    }
}

const STATE_MASK: u8 = 0b0000_0011;
const VALUE_CHANGED: u8 = 1 << 2;
const OBSERVED: u8 = 1 << 3;
const SCHEDULED: u8 = 1 << 4;

/// A single integer per node: the packed lifecycle state plus orthogonal
/// flags. Kept as a thin newtype so call sites read like the spec's
/// vocabulary (`status.is_running()`, `status.set_scheduled(true)`) rather
/// than raw bit twiddling.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Status(u8);

impl Status {
    pub fn new() -> Status {
        Status(Lifecycle::Clean.bits())
    }

    pub fn state(self) -> Lifecycle {
        Lifecycle::from_bits(self.0 & STATE_MASK)
    }

    pub fn set_state(&mut self, state: Lifecycle) {
        self.0 = (self.0 & !STATE_MASK) | state.bits();
    }

    pub fn is_clean(self) -> bool {
        self.state() == Lifecycle::Clean
    }

    pub fn is_invalidated(self) -> bool {
        self.state() == Lifecycle::Invalidated
    }

    pub fn is_running(self) -> bool {
        self.state() == Lifecycle::Running
    }

    pub fn is_disposed(self) -> bool {
        self.state() == Lifecycle::Disposed
    }

    pub fn value_changed(self) -> bool {
        self.0 & VALUE_CHANGED != 0
    }

    pub fn set_value_changed(&mut self, value: bool) {
        self.set_flag(VALUE_CHANGED, value);
    }

    pub fn observed(self) -> bool {
        self.0 & OBSERVED != 0
    }

    pub fn set_observed(&mut self, value: bool) {
        self.set_flag(OBSERVED, value);
    }

    pub fn scheduled(self) -> bool {
        self.0 & SCHEDULED != 0
    }

    pub fn set_scheduled(&mut self, value: bool) {
        self.set_flag(SCHEDULED, value);
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

impl Default for Status {
    fn default() -> Status {
        Status::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_and_flags_are_independent() {
        let mut s = Status::new();
        assert!(s.is_clean());
        s.set_observed(true);
        s.set_state(Lifecycle::Invalidated);
        assert!(s.is_invalidated());
        assert!(s.observed());
        assert!(!s.scheduled());
        s.set_state(Lifecycle::Running);
        assert!(s.is_running());
        assert!(s.observed(), "flags survive a state transition");
    }

    #[test]
    fn value_changed_toggles() {
        let mut s = Status::new();
        assert!(!s.value_changed());
        s.set_value_changed(true);
        assert!(s.value_changed());
        s.set_value_changed(false);
        assert!(!s.value_changed());
    }
}
