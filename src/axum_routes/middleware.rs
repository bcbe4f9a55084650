use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    config::AuthBackend,
    error::AuthError,
    guards::{check_guards, Guard},
    user::AuthUser,
};

use super::UsersState;

/// Name of the cookie which carries the session id of [`AuthBackend::Session`]
pub const SESSION_COOKIE: &str = "session";

/// Name of the cookie which carries the jwt of [`AuthBackend::JwtCookie`]
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Resolves the current user and puts it into request extensions, so handlers can take it
/// with `Extension<TAuthUser>`. Only active and verified users pass
pub async fn auth_middleware<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    mut req: Request,
    next: Next
) -> Result<Response, AuthError> {
    let user = match state.auth_backend {
        AuthBackend::Jwt => {
            let auth_header = req.headers().get(header::AUTHORIZATION).ok_or(AuthError::Unauthorized)?;
            let access_token = auth_header.to_str().map_err(|_| AuthError::Unauthorized)?.to_owned();

            state.service.get_authenticated_user(&access_token).await?
        },
        AuthBackend::JwtCookie => {
            let access_token = match req.headers().get(header::AUTHORIZATION) {
                Some(auth_header) => auth_header.to_str().map_err(|_| AuthError::Unauthorized)?,
                None => cookie_value(req.headers(), ACCESS_TOKEN_COOKIE).ok_or(AuthError::Unauthorized)?,
            }.to_owned();

            state.service.get_authenticated_user(&access_token).await?
        },
        AuthBackend::Session => {
            let session_id = cookie_value(req.headers(), SESSION_COOKIE).ok_or(AuthError::Unauthorized)?.to_owned();
            let user_id = state.sessions.get(&session_id).await.ok_or(AuthError::Unauthorized)?;

            state.service.retrieve_user(user_id).await?.ok_or(AuthError::Unauthorized)?
        },
    };

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Runs guards against the user put by [`auth_middleware`], must be layered inside of it
pub async fn guard_middleware<TAuthUser: AuthUser>(
    State(guards): State<Arc<Vec<Guard<TAuthUser>>>>,
    req: Request,
    next: Next
) -> Result<Response, AuthError> {
    let user = req.extensions().get::<TAuthUser>().ok_or(AuthError::Unauthorized)?;
    check_guards(&guards, user)?;

    Ok(next.run(req).await)
}

pub(super) fn cookie_value<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
}
