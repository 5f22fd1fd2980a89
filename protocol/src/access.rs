//! # Roles & Call Guards
//!
//! Two cross-cutting checks sit in front of every vault entry point:
//!
//! - **Roles.** Allocation changes, rebalancing, buffer target updates, and
//!   recalls need the `Manager` role; pausing needs `Emergency`.
//! - **Reentrancy.** A strategy or asset collaborator may call back into the
//!   vault while an operation is mid-flight. [`Guarded`] serializes callers
//!   across threads and turns a same-thread re-entry into an error instead
//!   of a deadlock.
//!
//! Neither check knows anything about vault accounting; the
//! [`VaultGateway`](crate::gateway::VaultGateway) composes them per entry
//! point.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejected before the vault is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The caller lacks the role the entry point requires.
    #[error("unauthorized: {caller} does not hold the {role} role")]
    Unauthorized {
        /// The address that attempted the call.
        caller: Address,
        /// The role required.
        role: Role,
    },

    /// The calling thread is already inside a guarded operation.
    #[error("reentrant call rejected")]
    Reentrant,
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Authority levels consumed by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Allocation changes, rebalance, buffer target, recall.
    Manager,
    /// Pause and unpause.
    Emergency,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Manager => write!(f, "manager"),
            Role::Emergency => write!(f, "emergency"),
        }
    }
}

/// Who holds which role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRegistry {
    members: HashMap<Role, HashSet<Address>>,
}

impl RoleRegistry {
    /// Creates a registry with no members.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`grant`](Self::grant).
    pub fn with(mut self, role: Role, account: impl Into<Address>) -> Self {
        self.grant(role, account);
        self
    }

    /// Gives `account` the role.
    pub fn grant(&mut self, role: Role, account: impl Into<Address>) {
        self.members.entry(role).or_default().insert(account.into());
    }

    /// `true` if `account` holds the role.
    pub fn has_role(&self, account: &str, role: Role) -> bool {
        self.members
            .get(&role)
            .is_some_and(|members| members.contains(account))
    }

    /// Fails with [`AccessError::Unauthorized`] unless `caller` holds `role`.
    pub fn require(&self, caller: &str, role: Role) -> Result<(), AccessError> {
        if self.has_role(caller, role) {
            Ok(())
        } else {
            Err(AccessError::Unauthorized {
                caller: caller.to_string(),
                role,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Guarded
// ---------------------------------------------------------------------------

/// A value behind a mutex that remembers which thread holds it.
pub struct Guarded<T> {
    inner: Mutex<T>,
    holder: Mutex<Option<ThreadId>>,
}

impl<T> Guarded<T> {
    /// Wraps `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            holder: Mutex::new(None),
        }
    }

    /// Acquires exclusive access, waiting for other threads. Fails at once
    /// if the calling thread already holds it.
    pub fn enter(&self) -> Result<CallGuard<'_, T>, AccessError> {
        let me = thread::current().id();
        if *self.holder.lock() == Some(me) {
            return Err(AccessError::Reentrant);
        }
        let inner = self.inner.lock();
        *self.holder.lock() = Some(me);
        Ok(CallGuard {
            inner,
            holder: &self.holder,
        })
    }

    /// `true` while some thread is inside a guarded call.
    pub fn is_entered(&self) -> bool {
        self.holder.lock().is_some()
    }
}

/// Exclusive access to a [`Guarded`] value for the duration of one call.
pub struct CallGuard<'a, T> {
    inner: MutexGuard<'a, T>,
    holder: &'a Mutex<Option<ThreadId>>,
}

impl<T> Deref for CallGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for CallGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for CallGuard<'_, T> {
    fn drop(&mut self) {
        // Cleared before `inner` is released.
        *self.holder.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn roles_are_checked_per_role() {
        let roles = RoleRegistry::new()
            .with(Role::Manager, "ops")
            .with(Role::Emergency, "guardian");

        assert!(roles.require("ops", Role::Manager).is_ok());
        assert_eq!(
            roles.require("ops", Role::Emergency),
            Err(AccessError::Unauthorized {
                caller: "ops".into(),
                role: Role::Emergency
            })
        );
        assert!(!roles.has_role("mallory", Role::Manager));
    }

    #[test]
    fn same_thread_reentry_is_rejected() {
        let guarded = Guarded::new(0u32);
        let mut outer = guarded.enter().unwrap();
        *outer += 1;
        assert!(guarded.is_entered());
        assert!(matches!(guarded.enter(), Err(AccessError::Reentrant)));
        drop(outer);

        assert!(!guarded.is_entered());
        assert_eq!(*guarded.enter().unwrap(), 1);
    }

    #[test]
    fn other_threads_wait_their_turn() {
        let guarded = Arc::new(Guarded::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guarded = Arc::clone(&guarded);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        *guarded.enter().unwrap() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*guarded.enter().unwrap(), 8_000);
    }
}
