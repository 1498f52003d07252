//! Phases of one data-set tick

use std::fmt;

/// Where a tick spends its time, in the order a simulation runs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickPhase {
    /// Sizing the current buffer and ID table.
    Allocate,
    /// Carrying survivors over from the previous buffer.
    Simulate,
    /// Appending new instances and acquiring their IDs.
    Spawn,
    /// NaN checks and buffer rotation.
    Rotate,
}

impl TickPhase {
    pub const COUNT: usize = 4;
    pub const ALL: [TickPhase; Self::COUNT] = [
        TickPhase::Allocate,
        TickPhase::Simulate,
        TickPhase::Spawn,
        TickPhase::Rotate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TickPhase::Allocate => "allocate",
            TickPhase::Simulate => "simulate",
            TickPhase::Spawn => "spawn",
            TickPhase::Rotate => "rotate",
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
