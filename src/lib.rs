mod config;
mod error;
mod guards;
mod hasher;
mod hooks;
mod jwt;
mod repository;
mod schema;
mod session;
mod user;
mod user_service;
#[cfg(feature = "axum-routes")]
mod axum_routes;

pub use config::{
    AuthBackend, AuthHandlerConfig, ConfigError, CurrentUserHandlerConfig, PasswordResetHandlerConfig,
    RegisterHandlerConfig, RoleManagementHandlerConfig, UserManagementHandlerConfig, UsersConfig,
    VerificationHandlerConfig,
};
pub use error::{AuthError, RepositoryError, TokenError};
pub use guards::{roles_accepted, roles_required, Guard};
pub use hasher::{HashScheme, PasswordManager};
pub use hooks::{NoopHooks, UserServiceHooks};
pub use jwt::{AccessToken, Claims, TokenAudience};
pub use repository::{
    memory::{InMemoryRoleRepository, InMemoryUserRepository},
    RoleRepository, UserRepository,
};
#[cfg(feature = "pg-repository")]
pub use repository::pg_repository::PgRepository;
pub use schema::{
    AuthenticationRequest, ForgotPasswordRequest, ResetPasswordRequest, RoleCreate, RoleUpdate, UserRegistration,
    UserRoleRequest, UserUpdate,
};
pub use session::{SessionStore, DEFAULT_SESSION_MAX_AGE_SECS};
pub use user::{AuthUser, Role, User};
pub use user_service::{builder, default_builder, UserService, UserServiceBuilder};
#[cfg(feature = "axum-routes")]
pub use axum_routes::{
    auth_middleware, guard_middleware, UsersRouter, UsersState, ACCESS_TOKEN_COOKIE, SESSION_COOKIE,
};
