//! Capability checks for cart and order operations.

use common::{Caller, UserId};

use crate::error::{CommerceError, Result};

/// An operation a caller may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ManageOwnCart,
    PlaceOrder,
    ViewOrder,
    PayOrder,
    DeliverOrder,
    RejectOrder,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ManageOwnCart => "manage cart",
            Action::PlaceOrder => "place order",
            Action::ViewOrder => "view order",
            Action::PayOrder => "pay order",
            Action::DeliverOrder => "deliver order",
            Action::RejectOrder => "reject order",
        }
    }

    fn requires_operator(&self) -> bool {
        matches!(self, Action::DeliverOrder | Action::RejectOrder)
    }

    fn owner_or_operator(&self) -> bool {
        matches!(self, Action::ViewOrder | Action::PayOrder)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks whether `caller` may perform `action`.
///
/// `owner` is the user owning the target resource, when it is known. Passing
/// `None` checks the role requirement only, so the call can run before any
/// store access; ownership is checked again once the resource is loaded.
pub fn authorize(caller: &Caller, action: Action, owner: Option<UserId>) -> Result<()> {
    if caller.is_operator() {
        return Ok(());
    }
    if action.requires_operator() {
        return Err(CommerceError::Forbidden(action));
    }
    match owner {
        Some(owner) if action.owner_or_operator() && owner != caller.user_id => {
            Err(CommerceError::Forbidden(action))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_may_do_everything() {
        let operator = Caller::operator(UserId::new());
        let someone_else = Some(UserId::new());
        for action in [
            Action::ManageOwnCart,
            Action::PlaceOrder,
            Action::ViewOrder,
            Action::PayOrder,
            Action::DeliverOrder,
            Action::RejectOrder,
        ] {
            assert!(authorize(&operator, action, someone_else).is_ok());
        }
    }

    #[test]
    fn users_cannot_deliver_or_reject() {
        let user = Caller::user(UserId::new());
        let own = Some(user.user_id);
        assert!(matches!(
            authorize(&user, Action::DeliverOrder, own),
            Err(CommerceError::Forbidden(Action::DeliverOrder))
        ));
        assert!(authorize(&user, Action::RejectOrder, None).is_err());
    }

    #[test]
    fn users_may_only_touch_their_own_orders() {
        let user = Caller::user(UserId::new());
        assert!(authorize(&user, Action::PayOrder, Some(user.user_id)).is_ok());
        assert!(authorize(&user, Action::ViewOrder, Some(UserId::new())).is_err());
        assert!(authorize(&user, Action::PayOrder, None).is_ok());
    }
}
