use thiserror::Error;

/// Errors connected to auth mechanisms
#[derive(Debug, Error)]
pub enum AuthError {
    /// Auth problem connected with some internal error
    #[error("Auth internal error: {0}")]
    Internal(String),
    /// Validation error in auth' domain
    #[error("Auth validation error: {0}")]
    ValidationError(String),
    /// Request is not authenticated or the authenticated user is not allowed to do this
    #[error("Unauthorized")]
    Unauthorized,
    /// Credentials are fine, but the user hasn't verified the account yet
    #[error("User is not verified")]
    NotVerified,
    /// `pre_registration` hook refused the registration
    #[error("Registration rejected")]
    RegistrationRejected,
    /// Role operation was requested, but the service was built without a role repository
    #[error("Roles have not been configured")]
    RolesNotConfigured,
    /// Error raised by one of [`crate::UserServiceHooks`]
    #[error("Hook error: {0}")]
    Hook(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors of verification and password reset tokens
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token is malformed, has a wrong signature, audience or subject
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Token has expired")]
    Expired,
}

/// Errors returned by [`crate::UserRepository`] and [`crate::RoleRepository`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    /// Entity doesn't exist. Inner string represents info about the entity
    #[error("Not found: {0}")]
    NotFound(String),
    /// Unique constraint violation
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Storage failure
    #[error("Repository error: {0}")]
    Backend(String),
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(error: bcrypt::BcryptError) -> Self {
        AuthError::Internal(error.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(error: argon2::password_hash::Error) -> Self {
        AuthError::Internal(error.to_string())
    }
}

impl AuthError {
    /// Shortcut for a not found repository error
    pub fn not_found(what: impl Into<String>) -> Self {
        AuthError::Repository(RepositoryError::NotFound(what.into()))
    }

    /// Shortcut for a conflict repository error
    pub fn conflict(what: impl Into<String>) -> Self {
        AuthError::Repository(RepositoryError::Conflict(what.into()))
    }
}
