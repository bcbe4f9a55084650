use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use users_kit::{
    default_builder, roles_accepted, AuthBackend, AuthError, AuthUser, InMemoryRoleRepository, InMemoryUserRepository,
    RoleCreate, RoleManagementHandlerConfig, User, UserService, UserServiceHooks, UsersConfig, UsersRouter,
};

const SECRET: &str = "Sup$rS4ccretttt!Sup$rS4ccretttt!";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "iamsuperadmin";

#[derive(Default)]
struct MailboxHooks {
    verification_tokens: Mutex<Vec<String>>,
    reset_tokens: Mutex<Vec<String>>,
}

impl MailboxHooks {
    fn last_verification_token(&self) -> String {
        self.verification_tokens.lock().unwrap().last().cloned().unwrap()
    }

    fn last_reset_token(&self) -> String {
        self.reset_tokens.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl UserServiceHooks<User> for MailboxHooks {
    async fn send_verification_token(&self, _user: &User, token: &str) -> Result<(), AuthError> {
        self.verification_tokens.lock().unwrap().push(token.to_string());
        Ok(())
    }

    async fn send_password_reset_token(&self, _user: &User, token: &str) -> Result<(), AuthError> {
        self.reset_tokens.lock().unwrap().push(token.to_string());
        Ok(())
    }
}

struct TestApp {
    server: TestServer,
    service: Arc<UserService<User>>,
    hooks: Arc<MailboxHooks>,
}

async fn test_app(auth_backend: AuthBackend) -> TestApp {
    test_app_with_config(UsersConfig {
        auth_backend,
        ..UsersConfig::new(SECRET)
    }).await
}

async fn test_app_with_config(config: UsersConfig) -> TestApp {
    let hooks = Arc::new(MailboxHooks::default());
    let service = Arc::new(default_builder()
        .set_secret(SECRET.to_string())
        .use_repository(Arc::new(InMemoryUserRepository::new()))
        .use_role_repository(Arc::new(InMemoryRoleRepository::new()))
        .use_hooks(hooks.clone())
        .build()
        .unwrap());

    let admin = service.create_user(ADMIN_EMAIL.to_string(), ADMIN_PASSWORD, true, true).await.unwrap();
    let admin_role = service.add_role(RoleCreate { name: "administrator".to_string(), description: None }).await.unwrap();
    service.assign_role(admin.id(), admin_role.id).await.unwrap();

    let config = UsersConfig {
        role_management: Some(RoleManagementHandlerConfig::default()),
        ..config
    };

    let app = UsersRouter::new(service.clone(), config)
        .user_management_guards(vec![roles_accepted(&["administrator"])])
        .role_management_guards(vec![roles_accepted(&["administrator"])])
        .build()
        .unwrap();

    TestApp {
        server: TestServer::new(app).unwrap(),
        service,
        hooks,
    }
}

async fn login_jwt(server: &TestServer, email: &str, password: &str) -> HeaderValue {
    let response = server
        .post("/login")
        .json(&json!({ "email": email, "password": password }))
        .await;

    assert_eq!(StatusCode::CREATED, response.status_code());
    response.header(header::AUTHORIZATION)
}

/// Logs in and returns the `name=value` part of the `Set-Cookie` header along with the whole header
async fn login_cookie(server: &TestServer, email: &str, password: &str) -> (HeaderValue, String) {
    let response = server
        .post("/login")
        .json(&json!({ "email": email, "password": password }))
        .await;

    assert_eq!(StatusCode::CREATED, response.status_code());
    let set_cookie = response.header(header::SET_COOKIE).to_str().unwrap().to_string();
    let cookie = HeaderValue::from_str(set_cookie.split(';').next().unwrap()).unwrap();

    (cookie, set_cookie)
}

#[tokio::test]
async fn register_test() {
    let app = test_app(AuthBackend::Jwt).await;

    let response = app.server
        .post("/register")
        .json(&json!({ "email": "Someone@Example.com", "password": "something", "is_verified": true }))
        .await;

    assert_eq!(StatusCode::CREATED, response.status_code());
    let body: Value = response.json();
    assert_eq!("someone@example.com", body["email"]);
    assert_eq!(false, body["is_verified"]);
    assert_eq!(true, body["is_active"]);
    assert!(body.get("pwd_hash").is_none());
    assert_eq!(1, app.hooks.verification_tokens.lock().unwrap().len());
}

#[tokio::test]
async fn register_0_taken_email_0_conflict() {
    let app = test_app(AuthBackend::Jwt).await;

    let response = app.server
        .post("/register")
        .json(&json!({ "email": ADMIN_EMAIL, "password": "something" }))
        .await;

    assert_eq!(StatusCode::CONFLICT, response.status_code());
    let body: Value = response.json();
    assert_eq!(409, body["status_code"]);
    assert!(body["detail"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn register_0_malformed_body_0_bad_request() {
    let app = test_app(AuthBackend::Jwt).await;

    let response = app.server
        .post("/register")
        .json(&json!({ "email": "someone@example.com" }))
        .await;

    assert_eq!(StatusCode::BAD_REQUEST, response.status_code());
    assert_eq!(400, response.json::<Value>()["status_code"]);
}

#[tokio::test]
async fn register_verify_login_flow_test() {
    // Arrange
    let app = test_app(AuthBackend::Jwt).await;
    let credentials = json!({ "email": "someone@example.com", "password": "something" });
    app.server.post("/register").json(&credentials).await;

    // Act
    let unverified_login = app.server.post("/login").json(&credentials).await;
    let verify_response = app.server
        .post(&format!("/verify?token={}", app.hooks.last_verification_token()))
        .await;
    let login_response = app.server.post("/login").json(&credentials).await;

    // Assert
    assert_eq!(StatusCode::FORBIDDEN, unverified_login.status_code());
    assert_eq!(StatusCode::CREATED, verify_response.status_code());
    assert_eq!(true, verify_response.json::<Value>()["is_verified"]);
    assert_eq!(StatusCode::CREATED, login_response.status_code());

    let authorization = login_response.header(header::AUTHORIZATION);
    assert!(authorization.to_str().unwrap().starts_with("Bearer "));
    let body: Value = login_response.json();
    assert_eq!("someone@example.com", body["email"]);
    assert_eq!("Bearer", body["token_type"]);

    let me = app.server.get("/users/me").add_header(header::AUTHORIZATION, authorization).await;
    assert_eq!(StatusCode::OK, me.status_code());
    assert_eq!("someone@example.com", me.json::<Value>()["email"]);
}

#[tokio::test]
async fn login_0_wrong_password_0_unauthorized() {
    let app = test_app(AuthBackend::Jwt).await;

    let response = app.server
        .post("/login")
        .json(&json!({ "email": ADMIN_EMAIL, "password": "ijustguessed" }))
        .await;

    assert_eq!(StatusCode::UNAUTHORIZED, response.status_code());
}

#[tokio::test]
async fn verify_0_bad_token_0_bad_request() {
    let app = test_app(AuthBackend::Jwt).await;

    let response = app.server.post("/verify?token=not-a-token").await;

    assert_eq!(StatusCode::BAD_REQUEST, response.status_code());
}

#[tokio::test]
async fn current_user_0_no_token_0_unauthorized() {
    let app = test_app(AuthBackend::Jwt).await;

    let response = app.server.get("/users/me").await;

    assert_eq!(StatusCode::UNAUTHORIZED, response.status_code());
    assert_eq!(401, response.json::<Value>()["status_code"]);
}

#[tokio::test]
async fn update_current_user_0_flags_0_ignored() {
    let app = test_app(AuthBackend::Jwt).await;
    app.service.create_user("generic@example.com".to_string(), "something", true, true).await.unwrap();
    let authorization = login_jwt(&app.server, "generic@example.com", "something").await;

    let response = app.server
        .patch("/users/me")
        .add_header(header::AUTHORIZATION, authorization)
        .json(&json!({ "email": "renamed@example.com", "is_active": false }))
        .await;

    assert_eq!(StatusCode::OK, response.status_code());
    let body: Value = response.json();
    assert_eq!("renamed@example.com", body["email"]);
    assert_eq!(true, body["is_active"]);
}

#[tokio::test]
async fn password_reset_flow_test() {
    // Arrange
    let app = test_app(AuthBackend::Jwt).await;
    app.service.create_user("generic@example.com".to_string(), "oldpass123", true, true).await.unwrap();

    // Act
    let forgot_response = app.server
        .post("/forgot-password")
        .json(&json!({ "email": "generic@example.com" }))
        .await;
    let reset_response = app.server
        .post("/reset-password")
        .json(&json!({ "token": app.hooks.last_reset_token(), "password": "newpass123" }))
        .await;

    // Assert
    assert_eq!(StatusCode::CREATED, forgot_response.status_code());
    assert_eq!(StatusCode::CREATED, reset_response.status_code());
    login_jwt(&app.server, "generic@example.com", "newpass123").await;
    let old_password_login = app.server
        .post("/login")
        .json(&json!({ "email": "generic@example.com", "password": "oldpass123" }))
        .await;
    assert_eq!(StatusCode::UNAUTHORIZED, old_password_login.status_code());
}

#[tokio::test]
async fn reset_password_0_verification_token_0_bad_request() {
    let app = test_app(AuthBackend::Jwt).await;
    app.server
        .post("/register")
        .json(&json!({ "email": "someone@example.com", "password": "something" }))
        .await;

    let response = app.server
        .post("/reset-password")
        .json(&json!({ "token": app.hooks.last_verification_token(), "password": "newpass123" }))
        .await;

    assert_eq!(StatusCode::BAD_REQUEST, response.status_code());
}

#[tokio::test]
async fn forgot_password_0_unknown_email_0_created() {
    let app = test_app(AuthBackend::Jwt).await;

    let response = app.server
        .post("/forgot-password")
        .json(&json!({ "email": "nobody@example.com" }))
        .await;

    assert_eq!(StatusCode::CREATED, response.status_code());
    assert!(app.hooks.reset_tokens.lock().unwrap().is_empty());
}

#[tokio::test]
async fn user_management_test() {
    // Arrange
    let app = test_app(AuthBackend::Jwt).await;
    let user = app.service.create_user("generic@example.com".to_string(), "something", true, true).await.unwrap();
    let admin_authorization = login_jwt(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let user_authorization = login_jwt(&app.server, "generic@example.com", "something").await;
    let path = format!("/users/{}", user.id());

    // Act
    let as_user = app.server.get(&path).add_header(header::AUTHORIZATION, user_authorization).await;
    let as_admin = app.server.get(&path).add_header(header::AUTHORIZATION, admin_authorization.clone()).await;
    let deactivated = app.server
        .patch(&path)
        .add_header(header::AUTHORIZATION, admin_authorization.clone())
        .json(&json!({ "is_active": false }))
        .await;
    let deleted = app.server.delete(&path).add_header(header::AUTHORIZATION, admin_authorization.clone()).await;
    let after_delete = app.server.get(&path).add_header(header::AUTHORIZATION, admin_authorization).await;

    // Assert
    assert_eq!(StatusCode::UNAUTHORIZED, as_user.status_code());
    assert_eq!(StatusCode::OK, as_admin.status_code());
    assert_eq!("generic@example.com", as_admin.json::<Value>()["email"]);
    assert_eq!(false, deactivated.json::<Value>()["is_active"]);
    assert_eq!(StatusCode::OK, deleted.status_code());
    assert_eq!(StatusCode::NOT_FOUND, after_delete.status_code());
}

#[tokio::test]
async fn user_management_0_malformed_id_0_bad_request() {
    let app = test_app(AuthBackend::Jwt).await;
    let authorization = login_jwt(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app.server.get("/users/not-a-uuid").add_header(header::AUTHORIZATION, authorization).await;

    assert_eq!(StatusCode::BAD_REQUEST, response.status_code());
}

#[tokio::test]
async fn role_management_test() {
    // Arrange
    let app = test_app(AuthBackend::Jwt).await;
    let user = app.service.create_user("writer@example.com".to_string(), "something", true, true).await.unwrap();
    let authorization = login_jwt(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    // Act
    let created = app.server
        .post("/users/roles")
        .add_header(header::AUTHORIZATION, authorization.clone())
        .json(&json!({ "name": "writer", "description": "Writes things" }))
        .await;
    let role_id = created.json::<Value>()["id"].as_str().unwrap().to_string();
    let assignment = json!({ "user_id": user.id(), "role_id": role_id });

    let assigned = app.server
        .patch("/users/roles/assign")
        .add_header(header::AUTHORIZATION, authorization.clone())
        .json(&assignment)
        .await;
    let assigned_again = app.server
        .patch("/users/roles/assign")
        .add_header(header::AUTHORIZATION, authorization.clone())
        .json(&assignment)
        .await;
    let revoked = app.server
        .patch("/users/roles/revoke")
        .add_header(header::AUTHORIZATION, authorization.clone())
        .json(&assignment)
        .await;
    let revoked_again = app.server
        .patch("/users/roles/revoke")
        .add_header(header::AUTHORIZATION, authorization.clone())
        .json(&assignment)
        .await;
    let updated = app.server
        .patch(&format!("/users/roles/{role_id}"))
        .add_header(header::AUTHORIZATION, authorization.clone())
        .json(&json!({ "name": "editor" }))
        .await;
    let deleted = app.server
        .delete(&format!("/users/roles/{role_id}"))
        .add_header(header::AUTHORIZATION, authorization)
        .await;

    // Assert
    assert_eq!(StatusCode::CREATED, created.status_code());
    assert_eq!(StatusCode::OK, assigned.status_code());
    assert_eq!("writer", assigned.json::<Value>()["roles"][0]["name"]);
    assert_eq!(StatusCode::CONFLICT, assigned_again.status_code());
    assert_eq!(StatusCode::OK, revoked.status_code());
    assert_eq!(0, revoked.json::<Value>()["roles"].as_array().unwrap().len());
    assert_eq!(StatusCode::CONFLICT, revoked_again.status_code());
    assert_eq!("editor", updated.json::<Value>()["name"]);
    assert_eq!(StatusCode::OK, deleted.status_code());
}

#[tokio::test]
async fn role_management_0_not_admin_0_unauthorized() {
    let app = test_app(AuthBackend::Jwt).await;
    app.service.create_user("generic@example.com".to_string(), "something", true, true).await.unwrap();
    let authorization = login_jwt(&app.server, "generic@example.com", "something").await;

    let response = app.server
        .post("/users/roles")
        .add_header(header::AUTHORIZATION, authorization)
        .json(&json!({ "name": "writer" }))
        .await;

    assert_eq!(StatusCode::UNAUTHORIZED, response.status_code());
}

#[tokio::test]
async fn session_backend_test() {
    // Arrange
    let app = test_app(AuthBackend::Session).await;

    // Act
    let login_response = app.server
        .post("/login")
        .json(&json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }))
        .await;
    let set_cookie = login_response.header(header::SET_COOKIE);
    let cookie = HeaderValue::from_str(set_cookie.to_str().unwrap().split(';').next().unwrap()).unwrap();

    let me = app.server.get("/users/me").add_header(header::COOKIE, cookie.clone()).await;
    let logout = app.server.post("/logout").add_header(header::COOKIE, cookie.clone()).await;
    let me_after_logout = app.server.get("/users/me").add_header(header::COOKIE, cookie).await;

    // Assert
    assert_eq!(StatusCode::CREATED, login_response.status_code());
    assert!(login_response.maybe_header(header::AUTHORIZATION).is_none());
    assert_eq!(StatusCode::OK, me.status_code());
    assert_eq!(ADMIN_EMAIL, me.json::<Value>()["email"]);
    assert_eq!(StatusCode::CREATED, logout.status_code());
    assert_eq!(StatusCode::UNAUTHORIZED, me_after_logout.status_code());
}

#[tokio::test]
async fn session_backend_0_bearer_token_0_unauthorized() {
    let app = test_app(AuthBackend::Session).await;
    let admin = app.service.get_user_by_email(ADMIN_EMAIL).await.unwrap().unwrap();
    let token = app.service.generate_access_token(&admin).unwrap();

    let response = app.server
        .get("/users/me")
        .add_header(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token.access_token)).unwrap())
        .await;

    assert_eq!(StatusCode::UNAUTHORIZED, response.status_code());
}

#[tokio::test]
async fn session_backend_0_expired_session_0_unauthorized() {
    // Arrange
    let app = test_app_with_config(UsersConfig {
        auth_backend: AuthBackend::Session,
        session_max_age_secs: 1,
        ..UsersConfig::new(SECRET)
    }).await;
    let (cookie, set_cookie) = login_cookie(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let me = app.server.get("/users/me").add_header(header::COOKIE, cookie.clone()).await;

    // Act
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let me_after_expiry = app.server.get("/users/me").add_header(header::COOKIE, cookie).await;

    // Assert
    assert!(set_cookie.contains("Max-Age=1"));
    assert_eq!(StatusCode::OK, me.status_code());
    assert_eq!(StatusCode::UNAUTHORIZED, me_after_expiry.status_code());
}

#[tokio::test]
async fn session_backend_0_own_password_changed_0_session_dropped() {
    // Arrange
    let app = test_app(AuthBackend::Session).await;
    let (cookie, _) = login_cookie(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    // Act
    let update = app.server
        .patch("/users/me")
        .add_header(header::COOKIE, cookie.clone())
        .json(&json!({ "password": "brand-new-password" }))
        .await;
    let me_after_update = app.server.get("/users/me").add_header(header::COOKIE, cookie).await;

    // Assert
    assert_eq!(StatusCode::OK, update.status_code());
    assert_eq!(StatusCode::UNAUTHORIZED, me_after_update.status_code());
    login_cookie(&app.server, ADMIN_EMAIL, "brand-new-password").await;
}

#[tokio::test]
async fn session_backend_0_password_changed_by_admin_0_user_session_dropped() {
    // Arrange
    let app = test_app(AuthBackend::Session).await;
    let user = app.service.create_user("user@example.com".to_string(), "something", true, true).await.unwrap();
    let (user_cookie, _) = login_cookie(&app.server, "user@example.com", "something").await;
    let (admin_cookie, _) = login_cookie(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    // Act
    let update = app.server
        .patch(&format!("/users/{}", user.id()))
        .add_header(header::COOKIE, admin_cookie.clone())
        .json(&json!({ "password": "brand-new-password" }))
        .await;
    let user_me = app.server.get("/users/me").add_header(header::COOKIE, user_cookie).await;
    let admin_me = app.server.get("/users/me").add_header(header::COOKIE, admin_cookie).await;

    // Assert
    assert_eq!(StatusCode::OK, update.status_code());
    assert_eq!(StatusCode::UNAUTHORIZED, user_me.status_code());
    assert_eq!(StatusCode::OK, admin_me.status_code());
}

#[tokio::test]
async fn session_backend_0_email_changed_0_session_kept() {
    let app = test_app(AuthBackend::Session).await;
    let (cookie, _) = login_cookie(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    app.server
        .patch("/users/me")
        .add_header(header::COOKIE, cookie.clone())
        .json(&json!({ "email": "boss@example.com" }))
        .await;
    let me = app.server.get("/users/me").add_header(header::COOKIE, cookie).await;

    assert_eq!(StatusCode::OK, me.status_code());
    assert_eq!("boss@example.com", me.json::<Value>()["email"]);
}

#[tokio::test]
async fn jwt_cookie_backend_test() {
    // Arrange
    let app = test_app(AuthBackend::JwtCookie).await;

    // Act
    let (cookie, set_cookie) = login_cookie(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let me = app.server.get("/users/me").add_header(header::COOKIE, cookie).await;
    let anonymous = app.server.get("/users/me").await;

    // Assert
    assert!(set_cookie.starts_with("access_token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=86400"));
    assert_eq!(StatusCode::OK, me.status_code());
    assert_eq!(ADMIN_EMAIL, me.json::<Value>()["email"]);
    assert_eq!(StatusCode::UNAUTHORIZED, anonymous.status_code());
}

#[tokio::test]
async fn jwt_cookie_backend_0_authorization_header_0_accepted() {
    let app = test_app(AuthBackend::JwtCookie).await;

    let authorization = login_jwt(&app.server, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let me = app.server.get("/users/me").add_header(header::AUTHORIZATION, authorization).await;

    assert_eq!(StatusCode::OK, me.status_code());
}

#[tokio::test]
async fn jwt_cookie_backend_0_verification_token_cookie_0_unauthorized() {
    // Arrange
    let app = test_app(AuthBackend::JwtCookie).await;
    app.server
        .post("/register")
        .json(&json!({ "email": "new@example.com", "password": "something" }))
        .await;
    let verification_token = app.hooks.last_verification_token();

    // Act
    let response = app.server
        .get("/users/me")
        .add_header(header::COOKIE, HeaderValue::from_str(&format!("access_token={verification_token}")).unwrap())
        .await;

    // Assert
    assert_eq!(StatusCode::UNAUTHORIZED, response.status_code());
}
