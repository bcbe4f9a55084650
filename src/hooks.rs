use async_trait::async_trait;

use crate::{
    error::AuthError,
    schema::{AuthenticationRequest, UserRegistration},
    user::AuthUser,
};

/// Extension points of [`crate::UserService`]. Every hook is a no-op by default.
///
/// Errors returned from hooks are not caught: they abort the running flow and reach the caller.
/// Note that `post_*` hooks run after the change is persisted, so an error there leaves the
/// change in place while the request fails.
#[async_trait]
pub trait UserServiceHooks<TAuthUser: AuthUser>: Send + Sync {
    /// Runs before credentials are checked. Returning `false` refuses the login,
    /// useful for checks against external sources like blacklists or memberships
    async fn pre_login(&self, _data: &AuthenticationRequest) -> Result<bool, AuthError> {
        Ok(true)
    }

    /// Runs after a successful login, e.g. to update a login counter
    async fn post_login(&self, _user: &TAuthUser) -> Result<(), AuthError> {
        Ok(())
    }

    /// Runs before anything is stored. Returning `false` rejects the registration
    async fn pre_registration(&self, _data: &UserRegistration) -> Result<bool, AuthError> {
        Ok(true)
    }

    /// Runs after the user is stored and the verification token is sent
    async fn post_registration(&self, _user: &TAuthUser) -> Result<(), AuthError> {
        Ok(())
    }

    /// Runs after the user is marked as verified
    async fn post_verification(&self, _user: &TAuthUser) -> Result<(), AuthError> {
        Ok(())
    }

    /// Delivers the verification token to the user (email, sms, ...)
    async fn send_verification_token(&self, _user: &TAuthUser, _token: &str) -> Result<(), AuthError> {
        Ok(())
    }

    /// Delivers the password reset token to the user (email, sms, ...)
    async fn send_password_reset_token(&self, _user: &TAuthUser, _token: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Hooks which do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

#[async_trait]
impl<TAuthUser: AuthUser> UserServiceHooks<TAuthUser> for NoopHooks {}
