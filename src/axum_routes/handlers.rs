use axum::{
    extract::{rejection::{JsonRejection, PathRejection, QueryRejection}, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AuthBackend,
    error::AuthError,
    jwt::AccessToken,
    schema::{
        AuthenticationRequest, ForgotPasswordRequest, ResetPasswordRequest, RoleCreate, RoleUpdate, UserRegistration,
        UserRoleRequest, UserUpdate,
    },
    user::{AuthUser, Role},
};

use super::{middleware::{cookie_value, ACCESS_TOKEN_COOKIE, SESSION_COOKIE}, UsersState};

type JsonBody<T> = Result<Json<T>, JsonRejection>;
type PathId = Result<Path<Uuid>, PathRejection>;

#[derive(Serialize)]
struct LoginResponse<'a, TAuthUser: AuthUser> {
    #[serde(flatten)]
    user: &'a TAuthUser,
    #[serde(flatten)]
    token: AccessToken,
}

#[derive(Debug, Deserialize)]
pub(super) struct VerifyQuery {
    token: String,
}

pub(super) async fn login<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    payload: JsonBody<AuthenticationRequest>,
) -> Result<Response, AuthError> {
    let Json(data) = payload?;
    let user = state.service.login(&data).await?;

    match state.auth_backend {
        AuthBackend::Jwt => {
            let token = state.service.generate_access_token(&user)?;
            let authorization = format!("{} {}", token.token_type, token.access_token);

            Ok((
                StatusCode::CREATED,
                [(header::AUTHORIZATION, authorization)],
                Json(LoginResponse { user: &user, token }),
            ).into_response())
        },
        AuthBackend::JwtCookie => {
            let token = state.service.generate_access_token(&user)?;
            let max_age = state.service.access_token_lifetime().num_seconds();
            let authorization = format!("{} {}", token.token_type, token.access_token);
            let cookie = format!("{ACCESS_TOKEN_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}", token.access_token);

            Ok((
                StatusCode::CREATED,
                [(header::AUTHORIZATION, authorization), (header::SET_COOKIE, cookie)],
                Json(LoginResponse { user: &user, token }),
            ).into_response())
        },
        AuthBackend::Session => {
            let session_id = state.sessions.create(user.id()).await;
            let max_age = state.sessions.max_age().num_seconds();
            let cookie = format!("{SESSION_COOKIE}={session_id}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age}");

            Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(user)).into_response())
        },
    }
}

pub(super) async fn logout<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    headers: HeaderMap,
) -> Response {
    if let Some(session_id) = cookie_value(&headers, SESSION_COOKIE) {
        state.sessions.remove(session_id).await;
    }

    let expired_cookie = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0");

    (StatusCode::CREATED, [(header::SET_COOKIE, expired_cookie)]).into_response()
}

pub(super) async fn register<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    payload: JsonBody<UserRegistration>,
) -> Result<(StatusCode, Json<TAuthUser>), AuthError> {
    let Json(data) = payload?;
    let user = state.service.register(data).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub(super) async fn verify<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<TAuthUser>), AuthError> {
    let Query(query) = query?;
    let user = state.service.verify(&query.token).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub(super) async fn forgot_password<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    payload: JsonBody<ForgotPasswordRequest>,
) -> Result<StatusCode, AuthError> {
    let Json(data) = payload?;
    state.service.initiate_password_reset(&data.email).await?;

    Ok(StatusCode::CREATED)
}

pub(super) async fn reset_password<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    payload: JsonBody<ResetPasswordRequest>,
) -> Result<StatusCode, AuthError> {
    let Json(data) = payload?;
    let user = state.service.reset_password(&data.token, &data.password).await?;
    state.sessions.remove_user_sessions(user.id()).await;

    Ok(StatusCode::CREATED)
}

pub(super) async fn get_current_user<TAuthUser: AuthUser>(Extension(user): Extension<TAuthUser>) -> Json<TAuthUser> {
    Json(user)
}

pub(super) async fn update_current_user<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    Extension(user): Extension<TAuthUser>,
    payload: JsonBody<UserUpdate>,
) -> Result<Json<TAuthUser>, AuthError> {
    let Json(data) = payload?;
    let data = data.self_service();
    let drop_sessions = data.password.is_some();
    let user = state.service.update_user(user.id(), data).await?;
    if drop_sessions {
        state.sessions.remove_user_sessions(user.id()).await;
    }

    Ok(Json(user))
}

pub(super) async fn get_user<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    path: PathId,
) -> Result<Json<TAuthUser>, AuthError> {
    let Path(id) = path?;

    Ok(Json(state.service.get_user(id).await?))
}

pub(super) async fn update_user<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    path: PathId,
    payload: JsonBody<UserUpdate>,
) -> Result<Json<TAuthUser>, AuthError> {
    let Path(id) = path?;
    let Json(data) = payload?;
    let drop_sessions = data.password.is_some() || data.is_active == Some(false);
    let user = state.service.update_user(id, data).await?;
    if drop_sessions {
        state.sessions.remove_user_sessions(id).await;
    }

    Ok(Json(user))
}

pub(super) async fn delete_user<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    path: PathId,
) -> Result<Json<TAuthUser>, AuthError> {
    let Path(id) = path?;
    let user = state.service.delete_user(id).await?;
    state.sessions.remove_user_sessions(id).await;

    Ok(Json(user))
}

pub(super) async fn create_role<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    payload: JsonBody<RoleCreate>,
) -> Result<(StatusCode, Json<Role>), AuthError> {
    let Json(data) = payload?;

    Ok((StatusCode::CREATED, Json(state.service.add_role(data).await?)))
}

pub(super) async fn update_role<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    path: PathId,
    payload: JsonBody<RoleUpdate>,
) -> Result<Json<Role>, AuthError> {
    let Path(id) = path?;
    let Json(data) = payload?;

    Ok(Json(state.service.update_role(id, data).await?))
}

pub(super) async fn delete_role<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    path: PathId,
) -> Result<Json<Role>, AuthError> {
    let Path(id) = path?;

    Ok(Json(state.service.delete_role(id).await?))
}

pub(super) async fn assign_role<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    payload: JsonBody<UserRoleRequest>,
) -> Result<Json<TAuthUser>, AuthError> {
    let Json(data) = payload?;

    Ok(Json(state.service.assign_role(data.user_id, data.role_id).await?))
}

pub(super) async fn revoke_role<TAuthUser: AuthUser>(
    State(state): State<UsersState<TAuthUser>>,
    payload: JsonBody<UserRoleRequest>,
) -> Result<Json<TAuthUser>, AuthError> {
    let Json(data) = payload?;

    Ok(Json(state.service.revoke_role(data.user_id, data.role_id).await?))
}
