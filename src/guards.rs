use std::sync::Arc;

use crate::{error::AuthError, user::AuthUser};

/// Authorization check run against the authenticated user before a guarded route
pub type Guard<TAuthUser> = Arc<dyn Fn(&TAuthUser) -> Result<(), AuthError> + Send + Sync>;

/// Passes if the user has at least one of `roles`
pub fn roles_accepted<TAuthUser: AuthUser>(roles: &[&str]) -> Guard<TAuthUser> {
    let roles: Vec<String> = roles.iter().map(|role| role.to_string()).collect();

    Arc::new(move |user: &TAuthUser| {
        if roles.iter().any(|role| user.has_role(role)) {
            return Ok(());
        }

        tracing::debug!(user_id = %user.id(), accepted = ?roles, "guard rejected user");
        Err(AuthError::Unauthorized)
    })
}

/// Passes if the user has every one of `roles`
pub fn roles_required<TAuthUser: AuthUser>(roles: &[&str]) -> Guard<TAuthUser> {
    let roles: Vec<String> = roles.iter().map(|role| role.to_string()).collect();

    Arc::new(move |user: &TAuthUser| {
        if roles.iter().all(|role| user.has_role(role)) {
            return Ok(());
        }

        tracing::debug!(user_id = %user.id(), required = ?roles, "guard rejected user");
        Err(AuthError::Unauthorized)
    })
}

pub(crate) fn check_guards<TAuthUser: AuthUser>(guards: &[Guard<TAuthUser>], user: &TAuthUser) -> Result<(), AuthError> {
    guards.iter().try_for_each(|guard| guard(user))
}
