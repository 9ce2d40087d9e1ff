//! Role-capability access control
//!
//! Each identity holds a flat set of roles. An owner that is also the
//! emergency admin simply holds both roles; there is no role inheritance.

use crate::errors::{GovernanceError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::info;
use yieldsplit_types::{short_id, Identity};

/// Capabilities that gate administrative operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Configuration setters, role management, recipient queue
    Admin,
    /// Pause / resume
    EmergencyAdmin,
    /// Advancing the cycle gate
    CycleManager,
}

/// Thread-safe role registry shared between components
#[derive(Debug, Default)]
pub struct AccessControl {
    grants: RwLock<HashMap<Identity, BTreeSet<Role>>>,
}

impl AccessControl {
    /// Registry where `owner` is both admin and emergency admin
    pub fn with_owner(owner: Identity) -> Self {
        let mut grants = HashMap::new();
        grants.insert(
            owner,
            BTreeSet::from([Role::Admin, Role::EmergencyAdmin]),
        );
        Self {
            grants: RwLock::new(grants),
        }
    }

    /// Grant `role` to `who`. Caller must be an admin.
    pub fn grant(&self, caller: &Identity, who: Identity, role: Role) -> Result<()> {
        self.require(caller, Role::Admin)?;
        self.grants.write().entry(who).or_default().insert(role);
        info!(
            target: "governance",
            caller = %short_id(caller),
            identity = %short_id(&who),
            ?role,
            "Role granted"
        );
        Ok(())
    }

    /// Revoke `role` from `who`. Caller must be an admin and cannot drop its
    /// own admin role.
    pub fn revoke(&self, caller: &Identity, who: &Identity, role: Role) -> Result<()> {
        self.require(caller, Role::Admin)?;
        if caller == who && role == Role::Admin {
            return Err(GovernanceError::InvalidParameter(
                "admin cannot revoke its own admin role",
            ));
        }
        let mut grants = self.grants.write();
        if let Some(roles) = grants.get_mut(who) {
            roles.remove(&role);
            if roles.is_empty() {
                grants.remove(who);
            }
        }
        info!(
            target: "governance",
            caller = %short_id(caller),
            identity = %short_id(who),
            ?role,
            "Role revoked"
        );
        Ok(())
    }

    pub fn has_role(&self, who: &Identity, role: Role) -> bool {
        self.grants
            .read()
            .get(who)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }

    /// Fail with `NotAuthorized` unless `who` holds `role`
    pub fn require(&self, who: &Identity, role: Role) -> Result<()> {
        if self.has_role(who, role) {
            Ok(())
        } else {
            Err(GovernanceError::NotAuthorized {
                identity: short_id(who),
                role,
            })
        }
    }

    pub fn roles_of(&self, who: &Identity) -> BTreeSet<Role> {
        self.grants.read().get(who).cloned().unwrap_or_default()
    }
}
