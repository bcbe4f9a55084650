mod handlers;
mod middleware;

use std::{fmt, sync::Arc};

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    config::{AuthBackend, ConfigError, UsersConfig},
    error::{AuthError, RepositoryError},
    guards::Guard,
    session::SessionStore,
    user::AuthUser,
    user_service::UserService,
};

pub use middleware::{auth_middleware, guard_middleware, ACCESS_TOKEN_COOKIE, SESSION_COOKIE};

/// Router [`axum::extract::State`] of the users routes.
/// Can be reused with [`auth_middleware`] to protect routes of the application
pub struct UsersState<TAuthUser: AuthUser> {
    service: Arc<UserService<TAuthUser>>,
    auth_backend: AuthBackend,
    sessions: Arc<SessionStore>,
}

impl<TAuthUser: AuthUser> Clone for UsersState<TAuthUser> {
    fn clone(&self) -> Self {
        UsersState {
            service: self.service.clone(),
            auth_backend: self.auth_backend,
            sessions: self.sessions.clone(),
        }
    }
}

impl<TAuthUser: AuthUser> fmt::Debug for UsersState<TAuthUser> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsersState")
            .field("auth_backend", &self.auth_backend)
            .finish()
    }
}

impl<TAuthUser: AuthUser> UsersState<TAuthUser> {
    pub fn new(service: Arc<UserService<TAuthUser>>, auth_backend: AuthBackend, sessions: Arc<SessionStore>) -> Self {
        UsersState {
            service,
            auth_backend,
            sessions,
        }
    }

    pub fn user_service(&self) -> &Arc<UserService<TAuthUser>> {
        &self.service
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

/// Error body of every failed request
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status_code: u16,
    detail: String,
}

impl AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
            AuthError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            AuthError::ValidationError(_) | AuthError::Token(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::NotVerified | AuthError::RegistrationRejected => StatusCode::FORBIDDEN,
            AuthError::Repository(RepositoryError::Backend(_))
            | AuthError::RolesNotConfigured
            | AuthError::Hook(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let detail = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            status_code: status.as_u16(),
            detail,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::ValidationError(rejection.body_text())
    }
}

impl From<PathRejection> for AuthError {
    fn from(rejection: PathRejection) -> Self {
        AuthError::ValidationError(rejection.body_text())
    }
}

impl From<QueryRejection> for AuthError {
    fn from(rejection: QueryRejection) -> Self {
        AuthError::ValidationError(rejection.body_text())
    }
}

/// Builds axum [`Router`] with the route groups set in [`UsersConfig`]
pub struct UsersRouter<TAuthUser: AuthUser> {
    service: Arc<UserService<TAuthUser>>,
    config: UsersConfig,
    sessions: Arc<SessionStore>,
    user_management_guards: Vec<Guard<TAuthUser>>,
    role_management_guards: Vec<Guard<TAuthUser>>,
}

impl<TAuthUser: AuthUser> UsersRouter<TAuthUser> {
    /// Sessions expire after `session_max_age_secs` of `config`
    pub fn new(service: Arc<UserService<TAuthUser>>, config: UsersConfig) -> Self {
        let sessions = config.session_max_age().map(SessionStore::new).unwrap_or_default();

        UsersRouter {
            service,
            config,
            sessions: Arc::new(sessions),
            user_management_guards: Vec::new(),
            role_management_guards: Vec::new(),
        }
    }

    /// Shares a session store with the rest of the application
    pub fn use_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = sessions;

        self
    }

    /// Guards checked on user management routes after authentication
    pub fn user_management_guards(mut self, guards: Vec<Guard<TAuthUser>>) -> Self {
        self.user_management_guards = guards;

        self
    }

    /// Guards checked on role management routes after authentication
    pub fn role_management_guards(mut self, guards: Vec<Guard<TAuthUser>>) -> Self {
        self.role_management_guards = guards;

        self
    }

    /// State which is shared by the built routes
    pub fn state(&self) -> UsersState<TAuthUser> {
        UsersState::new(self.service.clone(), self.config.auth_backend, self.sessions.clone())
    }

    /// Validates config and mounts the configured route groups
    pub fn build(self) -> Result<Router, ConfigError> {
        self.config.validate()?;
        if self.config.role_management.is_some() && !self.service.roles_enabled() {
            return Err(ConfigError::RolesNotConfigured);
        }

        let state = self.state();
        let config = &self.config;
        let auth_layer = || axum::middleware::from_fn_with_state(state.clone(), auth_middleware::<TAuthUser>);

        let mut router: Router<UsersState<TAuthUser>> = Router::new();

        if let Some(auth) = &config.auth {
            router = router.route(&auth.login_path, post(handlers::login::<TAuthUser>));

            if config.auth_backend == AuthBackend::Session {
                router = router.merge(
                    Router::new()
                        .route(&auth.logout_path, post(handlers::logout::<TAuthUser>))
                        .route_layer(auth_layer()),
                );
            }
        }

        if let Some(register) = &config.register {
            router = router.route(&register.path, post(handlers::register::<TAuthUser>));
        }

        if let Some(verification) = &config.verification {
            router = router.route(&verification.path, post(handlers::verify::<TAuthUser>));
        }

        if let Some(password_reset) = &config.password_reset {
            router = router
                .route(&password_reset.forgot_path, post(handlers::forgot_password::<TAuthUser>))
                .route(&password_reset.reset_path, post(handlers::reset_password::<TAuthUser>));
        }

        if let Some(current_user) = &config.current_user {
            router = router.merge(
                Router::new()
                    .route(
                        &current_user.path,
                        get(handlers::get_current_user::<TAuthUser>).patch(handlers::update_current_user::<TAuthUser>),
                    )
                    .route_layer(auth_layer()),
            );
        }

        if let Some(user_management) = &config.user_management {
            let guards = Arc::new(self.user_management_guards);

            router = router.merge(
                Router::new()
                    .route(
                        &format!("{}/{{id}}", user_management.path_prefix),
                        get(handlers::get_user::<TAuthUser>)
                            .patch(handlers::update_user::<TAuthUser>)
                            .delete(handlers::delete_user::<TAuthUser>),
                    )
                    .route_layer(axum::middleware::from_fn_with_state(guards, guard_middleware::<TAuthUser>))
                    .route_layer(auth_layer()),
            );
        }

        if let Some(role_management) = &config.role_management {
            let guards = Arc::new(self.role_management_guards);
            let prefix = &role_management.path_prefix;

            router = router.merge(
                Router::new()
                    .route(prefix, post(handlers::create_role::<TAuthUser>))
                    .route(
                        &format!("{prefix}/{{id}}"),
                        patch(handlers::update_role::<TAuthUser>).delete(handlers::delete_role::<TAuthUser>),
                    )
                    .route(
                        &format!("{prefix}{}", role_management.assign_role_path),
                        patch(handlers::assign_role::<TAuthUser>),
                    )
                    .route(
                        &format!("{prefix}{}", role_management.revoke_role_path),
                        patch(handlers::revoke_role::<TAuthUser>),
                    )
                    .route_layer(axum::middleware::from_fn_with_state(guards, guard_middleware::<TAuthUser>))
                    .route_layer(auth_layer()),
            );
        }

        tracing::info!(auth_backend = ?config.auth_backend, "users routes configured");

        Ok(router.with_state(state))
    }
}
