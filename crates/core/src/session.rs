//! Identity collaborator: who is acting, and from which branch.

use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use crate::error::{DomainError, DomainResult};
use crate::id::{BranchId, UserId};

/// Supplies the acting user and the active branch of the current session.
///
/// Stock-affecting operations require an actor; the active branch is the
/// fallback target for supplier receptions without an explicit branch.
pub trait SessionContext: Send + Sync {
    fn current_actor(&self) -> Option<UserId>;

    fn active_branch(&self) -> Option<BranchId>;

    /// The acting user, or `Unauthorized` when nobody is signed in.
    fn require_actor(&self) -> DomainResult<UserId> {
        self.current_actor().ok_or(DomainError::Unauthorized)
    }
}

impl<S> SessionContext for std::sync::Arc<S>
where
    S: SessionContext + ?Sized,
{
    fn current_actor(&self) -> Option<UserId> {
        (**self).current_actor()
    }

    fn active_branch(&self) -> Option<BranchId> {
        (**self).active_branch()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SessionState {
    actor: Option<UserId>,
    branch: Option<BranchId>,
}

/// In-process session for tests/dev (sign-in and branch selection are plain setters).
#[derive(Debug, Default)]
pub struct StaticSession {
    state: RwLock<SessionState>,
}

impl StaticSession {
    pub fn new(actor: Option<UserId>, branch: Option<BranchId>) -> Self {
        Self {
            state: RwLock::new(SessionState { actor, branch }),
        }
    }

    pub fn signed_in(actor: UserId) -> Self {
        Self::new(Some(actor), None)
    }

    pub fn set_actor(&self, actor: Option<UserId>) {
        self.write_state().actor = actor;
    }

    pub fn set_active_branch(&self, branch: Option<BranchId>) {
        self.write_state().branch = branch;
    }

    // The state is two plain fields, so a panicked writer cannot leave it torn.
    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> SessionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionContext for StaticSession {
    fn current_actor(&self) -> Option<UserId> {
        self.read_state().actor
    }

    fn active_branch(&self) -> Option<BranchId> {
        self.read_state().branch
    }
}
