//! Per-request authorization decisions.
//!
//! One explicit function instead of permission classes scattered over
//! handlers: `decide` takes the actor, the action and the owning user of the
//! target record (if any) and returns allow/deny. Handlers translate a deny
//! into 401/403; anonymous read access is only ever reachable on the public
//! course/lesson routes.

use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Rule table:
///
/// | Actor      | List/Retrieve | Create | Update | Delete |
/// |------------|---------------|--------|--------|--------|
/// | Anonymous  | allow         | deny   | deny   | deny   |
/// | Owner      | allow         | allow  | allow  | allow  |
/// | Moderator  | allow         | deny   | allow  | deny   |
/// | Superuser  | allow         | allow  | allow  | allow  |
pub fn decide(actor: Option<&User>, action: Action, owner: Option<u64>) -> Decision {
    let Some(user) = actor else {
        return match action {
            Action::List | Action::Retrieve => Decision::Allow,
            _ => Decision::Deny,
        };
    };

    if user.is_superuser {
        return Decision::Allow;
    }

    if owner == Some(user.id) {
        return Decision::Allow;
    }

    if user.is_moderator() {
        return match action {
            Action::List | Action::Retrieve | Action::Update => Decision::Allow,
            Action::Create | Action::Delete => Decision::Deny,
        };
    }

    // Plain authenticated user on a record they do not own.
    match action {
        Action::List | Action::Retrieve => Decision::Allow,
        Action::Create => Decision::Allow, // new records belong to their creator
        Action::Update | Action::Delete => Decision::Deny,
    }
}
