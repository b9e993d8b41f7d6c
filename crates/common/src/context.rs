//! [`CallContext`]: the explicit per-call-chain context threaded through every
//! store operation.
//!
//! It carries the acting user supplied by the request layer, the reentrancy
//! guard flag, and the unit of work (if a transaction is open).
//!
//! # Reentrancy guard
//!
//! The guard flag is never mutated in place. [`CallContext::guarded`] derives a
//! new context with the flag set; the code that needs the guard passes the
//! derived value to its nested calls and drops it afterwards. The caller's own
//! context is untouched, so the flag is cleared on every exit path of the
//! guarded sub-call, including early returns and errors.

use crate::unit_of_work::UnitOfWork;

/// Per-call-chain context: acting user, reentrancy guard, unit of work.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    acting_user_id: Option<String>,
    bypass_encryption: bool,
    unit_of_work: Option<UnitOfWork>,
}

impl CallContext {
    /// Context with no acting user, no guard, and no transaction.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context acting on behalf of `user_id`.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            acting_user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// Attach an open unit of work to this context.
    pub fn with_unit_of_work(mut self, uow: UnitOfWork) -> Self {
        self.unit_of_work = Some(uow);
        self
    }

    /// The acting user, if the request layer supplied one.
    pub fn current_user_id(&self) -> Option<&str> {
        self.acting_user_id.as_deref()
    }

    /// Returns `true` when encryption interception must be bypassed.
    pub fn is_guarded(&self) -> bool {
        self.bypass_encryption
    }

    /// Derive a context for a nested call with the reentrancy guard set.
    pub fn guarded(&self) -> Self {
        Self {
            bypass_encryption: true,
            ..self.clone()
        }
    }

    /// The unit of work, only while it is still active.
    pub fn active_unit_of_work(&self) -> Option<&UnitOfWork> {
        self.unit_of_work.as_ref().filter(|uow| uow.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_does_not_touch_original() {
        let ctx = CallContext::for_user("u1");
        let nested = ctx.guarded();
        assert!(nested.is_guarded());
        assert!(!ctx.is_guarded());
        assert_eq!(nested.current_user_id(), Some("u1"));
    }

    #[test]
    fn anonymous_has_no_user() {
        let ctx = CallContext::anonymous();
        assert!(ctx.current_user_id().is_none());
        assert!(!ctx.is_guarded());
        assert!(ctx.active_unit_of_work().is_none());
    }

    #[test]
    fn finished_unit_of_work_is_not_active() {
        let uow = UnitOfWork::begin();
        let ctx = CallContext::for_user("u1").with_unit_of_work(uow.clone());
        assert!(ctx.active_unit_of_work().is_some());
        uow.commit();
        assert!(ctx.active_unit_of_work().is_none());
    }
}
