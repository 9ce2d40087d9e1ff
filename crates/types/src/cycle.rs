//! Cycle record and timing predicates
//!
//! A cycle is a fixed-length window of ticks during which votes accumulate.
//! Distribution can only run once the window has fully elapsed.

use crate::units::{CycleNumber, Tick};
use serde::{Deserialize, Serialize};

/// Number of the first cycle after initialization
pub const GENESIS_CYCLE: CycleNumber = 1;

/// Current cycle record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// Monotonic cycle number (>= 1)
    pub number: CycleNumber,
    /// Tick at which this cycle began
    pub start_tick: Tick,
    /// Configured duration in ticks (> 0)
    pub length: Tick,
}

impl Cycle {
    /// Create the genesis cycle starting at `start_tick`
    pub fn genesis(start_tick: Tick, length: Tick) -> Self {
        Self {
            number: GENESIS_CYCLE,
            start_tick,
            length,
        }
    }

    /// First tick at which the cycle is complete
    pub fn end_tick(&self) -> Tick {
        self.start_tick.saturating_add(self.length)
    }

    /// True iff `now >= start_tick + length`
    pub fn is_ready_at(&self, now: Tick) -> bool {
        now >= self.end_tick()
    }

    /// Elapsed share of the cycle in percent, clamped to [0, 100]
    pub fn progress_at(&self, now: Tick) -> u8 {
        if self.length == 0 {
            return 100;
        }
        let elapsed = now.saturating_sub(self.start_tick) as u128;
        let pct = elapsed * 100 / self.length as u128;
        pct.min(100) as u8
    }

    /// Ticks left until the cycle is complete (0 once ready)
    pub fn ticks_remaining_at(&self, now: Tick) -> Tick {
        self.end_tick().saturating_sub(now)
    }

    /// The cycle that follows this one, starting at `now`
    pub fn successor(&self, now: Tick) -> Self {
        Self {
            number: self.number + 1,
            start_tick: now,
            length: self.length,
        }
    }

    /// Snapshot used by voting-power strategies
    pub fn context_at(&self, now: Tick) -> CycleContext {
        CycleContext {
            number: self.number,
            start_tick: self.start_tick,
            length: self.length,
            current_tick: now,
        }
    }
}

/// Read-only view of the cycle at the moment a vote is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleContext {
    pub number: CycleNumber,
    pub start_tick: Tick,
    pub length: Tick,
    pub current_tick: Tick,
}

impl CycleContext {
    /// Window covering the previous full cycle: `[start - length, start)`
    pub fn previous_window(&self) -> (Tick, Tick) {
        (
            self.start_tick.saturating_sub(self.length),
            self.start_tick,
        )
    }
}
