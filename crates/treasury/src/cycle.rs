//! Cycle gate and logical clock

use crate::errors::{Result, TreasuryError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;
use yieldsplit_governance::{AccessControl, Role};
use yieldsplit_types::{short_id, Cycle, CycleNumber, Identity, Tick};

/// Source of the current logical tick (e.g. block height)
pub trait TickSource: Send + Sync {
    fn now(&self) -> Tick;
}

/// Clock driven explicitly by the caller
#[derive(Debug, Default)]
pub struct ManualClock {
    tick: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Tick) -> Self {
        Self {
            tick: AtomicU64::new(start),
        }
    }

    pub fn set(&self, tick: Tick) {
        self.tick.store(tick, Ordering::SeqCst);
    }

    /// Move the clock forward, returning the new tick
    pub fn advance(&self, ticks: Tick) -> Tick {
        self.tick.fetch_add(ticks, Ordering::SeqCst) + ticks
    }
}

impl TickSource for ManualClock {
    fn now(&self) -> Tick {
        self.tick.load(Ordering::SeqCst)
    }
}

/// Tracks the current cycle and decides when it may close.
///
/// Readiness is a pure predicate over the tick passed in; the gate holds no
/// clock of its own.
#[derive(Debug, Clone)]
pub struct CycleGate {
    current: Cycle,
    /// closed cycles, keyed by number
    history: BTreeMap<CycleNumber, Cycle>,
}

impl CycleGate {
    /// Gate for the genesis cycle
    pub fn new(start_tick: Tick, length: Tick) -> Result<Self> {
        Self::resume(Cycle::genesis(start_tick, length))
    }

    /// Gate continuing from a persisted cycle record
    pub fn resume(current: Cycle) -> Result<Self> {
        if current.length == 0 {
            return Err(TreasuryError::InvalidCycleLength(0));
        }
        if current.number == 0 {
            return Err(TreasuryError::InvalidConfig(
                "cycle numbers start at 1".to_string(),
            ));
        }
        Ok(Self {
            current,
            history: BTreeMap::new(),
        })
    }

    pub fn cycle(&self) -> &Cycle {
        &self.current
    }

    pub fn number(&self) -> CycleNumber {
        self.current.number
    }

    /// Closed cycle record, or the current one
    pub fn cycle_record(&self, number: CycleNumber) -> Option<&Cycle> {
        if number == self.current.number {
            Some(&self.current)
        } else {
            self.history.get(&number)
        }
    }

    pub fn is_ready(&self, now: Tick) -> bool {
        self.current.is_ready_at(now)
    }

    /// Elapsed share of the current cycle, 0..=100
    pub fn progress(&self, now: Tick) -> u8 {
        self.current.progress_at(now)
    }

    pub fn ticks_remaining(&self, now: Tick) -> Tick {
        self.current.ticks_remaining_at(now)
    }

    /// Fail with `CycleNotComplete` unless the gate is open at `now`
    pub fn ensure_ready(&self, now: Tick) -> Result<()> {
        if self.is_ready(now) {
            Ok(())
        } else {
            Err(TreasuryError::CycleNotComplete {
                cycle: self.current.number,
                remaining: self.ticks_remaining(now),
            })
        }
    }

    /// Close the current cycle and open the next one at `now`.
    ///
    /// Caller must hold `CycleManager`.
    pub fn advance(
        &mut self,
        now: Tick,
        caller: &Identity,
        access: &AccessControl,
    ) -> Result<Cycle> {
        access.require(caller, Role::CycleManager)?;
        self.ensure_ready(now)?;
        Ok(self.roll_over(now))
    }

    /// Unchecked transition; readiness and authorization were verified by
    /// the caller against the same `now`.
    pub(crate) fn roll_over(&mut self, now: Tick) -> Cycle {
        let closed = self.current;
        self.current = closed.successor(now);
        self.history.insert(closed.number, closed);
        info!(
            target: "treasury",
            closed = closed.number,
            opened = self.current.number,
            start_tick = now,
            "Cycle advanced"
        );
        self.current
    }

    /// Change the cycle length. Applies to the in-progress cycle at once.
    ///
    /// Caller must hold `Admin`.
    pub fn set_length(
        &mut self,
        length: Tick,
        caller: &Identity,
        access: &AccessControl,
    ) -> Result<()> {
        access.require(caller, Role::Admin)?;
        if length == 0 {
            return Err(TreasuryError::InvalidCycleLength(length));
        }
        let previous = self.current.length;
        self.current.length = length;
        info!(
            target: "treasury",
            cycle = self.current.number,
            previous,
            length,
            caller = %short_id(caller),
            "Cycle length updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yieldsplit_governance::GovernanceError;
    use yieldsplit_types::identity_from_label;

    fn setup() -> (CycleGate, AccessControl, Identity, Identity) {
        let owner = identity_from_label("owner");
        let keeper = identity_from_label("keeper");
        let access = AccessControl::with_owner(owner);
        access.grant(&owner, keeper, Role::CycleManager).unwrap();
        (CycleGate::new(1000, 100).unwrap(), access, owner, keeper)
    }

    #[test]
    fn test_gate_boundary() {
        let (mut gate, access, _, keeper) = setup();

        assert!(!gate.is_ready(1099));
        assert_eq!(gate.ticks_remaining(1099), 1);
        assert!(matches!(
            gate.advance(1099, &keeper, &access),
            Err(TreasuryError::CycleNotComplete {
                cycle: 1,
                remaining: 1
            })
        ));

        assert!(gate.is_ready(1100));
        let next = gate.advance(1100, &keeper, &access).unwrap();
        assert_eq!(next.number, 2);
        assert_eq!(next.start_tick, 1100);
        assert_eq!(gate.cycle_record(1).unwrap().start_tick, 1000);
        assert!(!gate.is_ready(1100));
    }

    #[test]
    fn test_advance_requires_cycle_manager() {
        let (mut gate, access, owner, _) = setup();
        let err = gate.advance(2000, &owner, &access).unwrap_err();
        assert!(matches!(
            err,
            TreasuryError::Governance(GovernanceError::NotAuthorized {
                role: Role::CycleManager,
                ..
            })
        ));
        assert_eq!(gate.number(), 1);
    }

    #[test]
    fn test_set_length_applies_to_current_cycle() {
        let (mut gate, access, owner, keeper) = setup();
        assert_eq!(gate.progress(1050), 50);

        gate.set_length(50, &owner, &access).unwrap();
        assert!(gate.is_ready(1050));
        assert_eq!(gate.progress(1050), 100);

        gate.set_length(400, &owner, &access).unwrap();
        assert_eq!(gate.ticks_remaining(1100), 300);

        assert!(matches!(
            gate.set_length(0, &owner, &access),
            Err(TreasuryError::InvalidCycleLength(0))
        ));
        assert!(gate.set_length(10, &keeper, &access).is_err());
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(5);
        assert_eq!(clock.advance(10), 15);
        clock.set(100);
        assert_eq!(clock.now(), 100);
    }

    #[test]
    fn test_resume_rejects_zero_length() {
        let mut cycle = Cycle::genesis(0, 10);
        cycle.length = 0;
        assert!(CycleGate::resume(cycle).is_err());
    }
}
