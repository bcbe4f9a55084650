use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Login credentials
#[derive(Clone, Deserialize)]
pub struct AuthenticationRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AuthenticationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Registration payload. Any field besides `email` and `password` lands in `extra`
/// and is handed to [`crate::AuthUser::new`]
#[derive(Clone, Deserialize)]
pub struct UserRegistration {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for UserRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRegistration")
            .field("email", &self.email)
            .field("password", &"***")
            .field("extra", &self.extra)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

impl fmt::Debug for ResetPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetPasswordRequest")
            .field("token", &"***")
            .field("password", &"***")
            .finish()
    }
}

/// User-role association
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UserRoleRequest {
    pub user_id: Uuid,
    pub role_id: Uuid,
}

/// Partial user update. Missing fields stay untouched
#[derive(Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

impl UserUpdate {
    /// Drops the fields a user must not change on their own account
    pub fn self_service(self) -> Self {
        UserUpdate {
            is_active: None,
            is_verified: None,
            ..self
        }
    }
}

impl fmt::Debug for UserUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserUpdate")
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("is_active", &self.is_active)
            .field("is_verified", &self.is_verified)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleCreate {
    pub name: String,
    pub description: Option<String>,
}

/// Partial role update. Missing fields stay untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}
