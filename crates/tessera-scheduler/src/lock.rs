//! Per-entity reader/writer lock state with owner identity.

use tessera_types::ProcId;

use crate::procedure::LockHolder;

/// Lock state of one lockable entity (namespace, table, region, server).
///
/// Either one exclusive owner or any number of shared holders, never both.
/// The exclusive owner is a procedure id; a procedure whose parent or root
/// is the owner has *lock access* without becoming the owner itself.
///
/// All access happens under the scheduler mutex; there is no internal
/// synchronization.
#[derive(Debug, Default)]
pub(crate) struct LockState {
    exclusive_owner: Option<ProcId>,
    shared_count: u32,
}

impl LockState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn has_exclusive(&self) -> bool {
        self.exclusive_owner.is_some()
    }

    /// Exclusive or shared, any holder at all.
    pub(crate) fn is_locked(&self) -> bool {
        self.has_exclusive() || self.shared_count > 0
    }

    pub(crate) fn shared_count(&self) -> u32 {
        self.shared_count
    }

    pub(crate) fn exclusive_owner(&self) -> Option<ProcId> {
        self.exclusive_owner
    }

    pub(crate) fn is_owner(&self, proc_id: ProcId) -> bool {
        self.exclusive_owner == Some(proc_id)
    }

    /// Whether `holder`'s parent or root owns the exclusive lock.
    ///
    /// Inheritance is checked against this exact entity: a region lock does
    /// not inherit from the enclosing table's lock, only from a parent
    /// procedure that locked this region itself.
    pub(crate) fn has_parent_lock(&self, holder: &LockHolder) -> bool {
        holder.has_parent()
            && (holder.parent().is_some_and(|p| self.is_owner(p))
                || holder.root().is_some_and(|r| self.is_owner(r)))
    }

    pub(crate) fn has_lock_access(&self, holder: &LockHolder) -> bool {
        self.is_owner(holder.id()) || self.has_parent_lock(holder)
    }

    /// Take a shared lock; fails only while an exclusive owner exists.
    pub(crate) fn try_shared(&mut self) -> bool {
        if self.has_exclusive() {
            return false;
        }
        self.shared_count += 1;
        true
    }

    /// Drop one shared hold; `true` iff the counter reached zero (the
    /// caller then re-links the queue and drains waiters).
    pub(crate) fn release_shared(&mut self) -> bool {
        debug_assert!(self.shared_count > 0, "release_shared without a hold");
        self.shared_count -= 1;
        self.shared_count == 0
    }

    /// Try to take the exclusive lock for `holder`.
    ///
    /// If the entity is locked in any mode, this does not change the owner;
    /// it reports whether `holder` already has lock access (owner or child
    /// of the owner). Otherwise `holder` becomes the owner.
    pub(crate) fn try_exclusive(&mut self, holder: &LockHolder) -> bool {
        if self.is_locked() {
            return self.has_lock_access(holder);
        }
        self.exclusive_owner = Some(holder.id());
        true
    }

    /// Release the exclusive lock iff `holder` is the direct owner.
    ///
    /// A child that acquired access through inheritance gets `false` and
    /// the parent's lock stays in place.
    pub(crate) fn release_exclusive(&mut self, holder: &LockHolder) -> bool {
        if self.is_owner(holder.id()) {
            self.exclusive_owner = None;
            return true;
        }
        false
    }
}
