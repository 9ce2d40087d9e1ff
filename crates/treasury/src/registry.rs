//! Recipient registry
//!
//! The active list fixes the length and order of every point vector cast in
//! a cycle, so it must not change while a cycle is open. Admins queue
//! additions and removals; the queue is applied when a cycle closes.

use crate::errors::{Result, TreasuryError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;
use yieldsplit_governance::{AccessControl, Role};
use yieldsplit_types::{short_id, CycleNumber, Identity};

/// Provider of the ordered active recipient list
pub trait RecipientRegistry: Send + Sync {
    /// Snapshot of active recipients, in payout order
    fn active_recipients(&self) -> Vec<Identity>;

    /// Called once a distribution closed `closed_cycle`
    fn on_cycle_closed(&self, _closed_cycle: CycleNumber) {}
}

#[derive(Debug, Default)]
struct RegistryState {
    active: Vec<Identity>,
    pending_additions: Vec<Identity>,
    pending_removals: Vec<Identity>,
}

/// Admin-controlled registry with changes queued until cycle close
pub struct QueuedRecipientRegistry {
    access: Arc<AccessControl>,
    state: RwLock<RegistryState>,
}

impl QueuedRecipientRegistry {
    /// Registry with an initial active list (duplicates rejected)
    pub fn new(access: Arc<AccessControl>, initial: Vec<Identity>) -> Result<Self> {
        for (i, who) in initial.iter().enumerate() {
            if initial[..i].contains(who) {
                return Err(TreasuryError::RecipientExists(short_id(who)));
            }
        }
        Ok(Self {
            access,
            state: RwLock::new(RegistryState {
                active: initial,
                ..Default::default()
            }),
        })
    }

    /// Queue `who` to join at the next cycle close. Admin only.
    pub fn queue_addition(&self, caller: &Identity, who: Identity) -> Result<()> {
        self.access.require(caller, Role::Admin)?;
        let mut state = self.state.write();

        // re-adding a recipient queued for removal cancels the removal
        if let Some(pos) = state.pending_removals.iter().position(|r| *r == who) {
            state.pending_removals.remove(pos);
            return Ok(());
        }
        if state.active.contains(&who) || state.pending_additions.contains(&who) {
            return Err(TreasuryError::RecipientExists(short_id(&who)));
        }
        state.pending_additions.push(who);
        info!(
            target: "treasury",
            recipient = %short_id(&who),
            "Recipient addition queued"
        );
        Ok(())
    }

    /// Queue `who` to leave at the next cycle close. Admin only.
    pub fn queue_removal(&self, caller: &Identity, who: &Identity) -> Result<()> {
        self.access.require(caller, Role::Admin)?;
        let mut state = self.state.write();

        if let Some(pos) = state.pending_additions.iter().position(|r| r == who) {
            state.pending_additions.remove(pos);
            return Ok(());
        }
        if !state.active.contains(who) || state.pending_removals.contains(who) {
            return Err(TreasuryError::RecipientNotFound(short_id(who)));
        }
        state.pending_removals.push(*who);
        info!(
            target: "treasury",
            recipient = %short_id(who),
            "Recipient removal queued"
        );
        Ok(())
    }

    pub fn is_active(&self, who: &Identity) -> bool {
        self.state.read().active.contains(who)
    }

    pub fn pending_additions(&self) -> Vec<Identity> {
        self.state.read().pending_additions.clone()
    }

    pub fn pending_removals(&self) -> Vec<Identity> {
        self.state.read().pending_removals.clone()
    }

    /// Apply queued changes: removals first, then additions appended in
    /// queue order.
    pub fn apply_pending(&self) -> usize {
        let mut state = self.state.write();
        let removals = std::mem::take(&mut state.pending_removals);
        let additions = std::mem::take(&mut state.pending_additions);
        let changes = removals.len() + additions.len();

        state.active.retain(|r| !removals.contains(r));
        state.active.extend(additions);
        changes
    }
}

impl RecipientRegistry for QueuedRecipientRegistry {
    fn active_recipients(&self) -> Vec<Identity> {
        self.state.read().active.clone()
    }

    fn on_cycle_closed(&self, closed_cycle: CycleNumber) {
        let changes = self.apply_pending();
        if changes > 0 {
            info!(
                target: "treasury",
                cycle = closed_cycle,
                changes,
                active = self.state.read().active.len(),
                "Recipient queue applied"
            );
        }
    }
}
