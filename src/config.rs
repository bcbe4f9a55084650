use std::{fmt, path::Path};

use chrono::TimeDelta;
use serde::Deserialize;
use thiserror::Error;

use crate::{hasher::HashScheme, session::DEFAULT_SESSION_MAX_AGE_SECS};

/// Errors of [`UsersConfig`] and [`crate::UserServiceBuilder`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("secret must be 16, 24 or 32 characters")]
    InvalidSecret,
    #[error("at least one route handler must be configured")]
    NoHandlers,
    #[error("role management requires a role repository")]
    RolesNotConfigured,
    #[error("access token lifetime must be positive and representable")]
    InvalidTokenLifetime,
    #[error("session max age must be positive and representable")]
    InvalidSessionMaxAge,
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("couldn't initialize password hasher: {0}")]
    Hasher(String),
    #[error("couldn't load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// How authenticated requests are recognized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthBackend {
    /// Stateless `Authorization: Bearer <jwt>` header
    #[default]
    Jwt,
    /// Stateless jwt in an `HttpOnly` cookie, the `Authorization` header is accepted too
    JwtCookie,
    /// Server-side session referenced by a cookie
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuthHandlerConfig {
    pub login_path: String,
    /// Only mounted with [`AuthBackend::Session`]
    pub logout_path: String,
}

impl Default for AuthHandlerConfig {
    fn default() -> Self {
        AuthHandlerConfig {
            login_path: "/login".to_string(),
            logout_path: "/logout".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CurrentUserHandlerConfig {
    pub path: String,
}

impl Default for CurrentUserHandlerConfig {
    fn default() -> Self {
        CurrentUserHandlerConfig {
            path: "/users/me".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PasswordResetHandlerConfig {
    pub forgot_path: String,
    pub reset_path: String,
}

impl Default for PasswordResetHandlerConfig {
    fn default() -> Self {
        PasswordResetHandlerConfig {
            forgot_path: "/forgot-password".to_string(),
            reset_path: "/reset-password".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegisterHandlerConfig {
    pub path: String,
}

impl Default for RegisterHandlerConfig {
    fn default() -> Self {
        RegisterHandlerConfig {
            path: "/register".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoleManagementHandlerConfig {
    pub path_prefix: String,
    pub assign_role_path: String,
    pub revoke_role_path: String,
}

impl Default for RoleManagementHandlerConfig {
    fn default() -> Self {
        RoleManagementHandlerConfig {
            path_prefix: "/users/roles".to_string(),
            assign_role_path: "/assign".to_string(),
            revoke_role_path: "/revoke".to_string(),
        }
    }
}

/// Admin routes, suffixed with `/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserManagementHandlerConfig {
    pub path_prefix: String,
}

impl Default for UserManagementHandlerConfig {
    fn default() -> Self {
        UserManagementHandlerConfig {
            path_prefix: "/users".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerificationHandlerConfig {
    pub path: String,
}

impl Default for VerificationHandlerConfig {
    fn default() -> Self {
        VerificationHandlerConfig {
            path: "/verify".to_string(),
        }
    }
}

fn default_hash_schemes() -> Vec<HashScheme> {
    vec![HashScheme::Argon2]
}

fn default_access_token_lifetime_secs() -> i64 {
    60 * 60 * 24
}

fn default_session_max_age_secs() -> i64 {
    DEFAULT_SESSION_MAX_AGE_SECS
}

/// Converts a configured amount of seconds, `None` unless positive and in range of [`TimeDelta`]
pub(crate) fn positive_seconds(secs: i64) -> Option<TimeDelta> {
    TimeDelta::try_seconds(secs).filter(|delta| *delta > TimeDelta::zero())
}

/// Users configuration. Every route group is mounted only if its config is set
#[derive(Clone, Deserialize)]
pub struct UsersConfig {
    /// Secret for signing tokens
    pub secret: String,
    #[serde(default)]
    pub auth_backend: AuthBackend,
    /// The first scheme hashes new passwords, the others are only accepted on verification
    #[serde(default = "default_hash_schemes")]
    pub hash_schemes: Vec<HashScheme>,
    /// Lifetime of login tokens of [`AuthBackend::Jwt`] and [`AuthBackend::JwtCookie`]
    #[serde(default = "default_access_token_lifetime_secs")]
    pub access_token_lifetime_secs: i64,
    /// Lifetime of sessions of [`AuthBackend::Session`]
    #[serde(default = "default_session_max_age_secs")]
    pub session_max_age_secs: i64,
    #[serde(default)]
    pub auth: Option<AuthHandlerConfig>,
    #[serde(default)]
    pub current_user: Option<CurrentUserHandlerConfig>,
    #[serde(default)]
    pub password_reset: Option<PasswordResetHandlerConfig>,
    #[serde(default)]
    pub register: Option<RegisterHandlerConfig>,
    #[serde(default)]
    pub role_management: Option<RoleManagementHandlerConfig>,
    #[serde(default)]
    pub user_management: Option<UserManagementHandlerConfig>,
    #[serde(default)]
    pub verification: Option<VerificationHandlerConfig>,
}

impl fmt::Debug for UsersConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsersConfig")
            .field("secret", &"***")
            .field("auth_backend", &self.auth_backend)
            .field("hash_schemes", &self.hash_schemes)
            .field("access_token_lifetime_secs", &self.access_token_lifetime_secs)
            .field("session_max_age_secs", &self.session_max_age_secs)
            .field("auth", &self.auth)
            .field("current_user", &self.current_user)
            .field("password_reset", &self.password_reset)
            .field("register", &self.register)
            .field("role_management", &self.role_management)
            .field("user_management", &self.user_management)
            .field("verification", &self.verification)
            .finish()
    }
}

impl UsersConfig {
    /// Config with every route group except role management mounted on its default path
    pub fn new(secret: impl Into<String>) -> Self {
        UsersConfig {
            secret: secret.into(),
            auth_backend: AuthBackend::default(),
            hash_schemes: default_hash_schemes(),
            access_token_lifetime_secs: default_access_token_lifetime_secs(),
            session_max_age_secs: default_session_max_age_secs(),
            auth: Some(AuthHandlerConfig::default()),
            current_user: Some(CurrentUserHandlerConfig::default()),
            password_reset: Some(PasswordResetHandlerConfig::default()),
            register: Some(RegisterHandlerConfig::default()),
            role_management: None,
            user_management: Some(UserManagementHandlerConfig::default()),
            verification: Some(VerificationHandlerConfig::default()),
        }
    }

    /// Loads config from an optional file (format by extension) overlaid with `USERS_*` environment
    /// variables. Nested keys are separated with `__`, e.g. `USERS_AUTH__LOGIN_PATH`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let users_config: UsersConfig = builder
            .add_source(
                config::Environment::with_prefix("USERS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("hash_schemes"),
            )
            .build()?
            .try_deserialize()?;

        users_config.validate()?;

        Ok(users_config)
    }

    /// Checks the secret, lifetimes and that at least one route group is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_secret(&self.secret)?;

        self.access_token_lifetime()?;
        self.session_max_age()?;

        let any_handler = self.auth.is_some()
            || self.current_user.is_some()
            || self.password_reset.is_some()
            || self.register.is_some()
            || self.role_management.is_some()
            || self.user_management.is_some()
            || self.verification.is_some();
        if !any_handler {
            return Err(ConfigError::NoHandlers);
        }

        Ok(())
    }

    pub fn access_token_lifetime(&self) -> Result<TimeDelta, ConfigError> {
        positive_seconds(self.access_token_lifetime_secs).ok_or(ConfigError::InvalidTokenLifetime)
    }

    pub fn session_max_age(&self) -> Result<TimeDelta, ConfigError> {
        positive_seconds(self.session_max_age_secs).ok_or(ConfigError::InvalidSessionMaxAge)
    }
}

pub(crate) fn validate_secret(secret: &str) -> Result<(), ConfigError> {
    if ![16, 24, 32].contains(&secret.chars().count()) {
        return Err(ConfigError::InvalidSecret);
    }

    Ok(())
}
