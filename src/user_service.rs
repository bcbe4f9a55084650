use std::sync::Arc;

use chrono::TimeDelta;
use uuid::Uuid;

use crate::{
    config::{positive_seconds, validate_secret, ConfigError, UsersConfig},
    error::{AuthError, TokenError},
    hasher::{HashScheme, PasswordManager},
    hooks::{NoopHooks, UserServiceHooks},
    jwt::{self, AccessToken, Claims, TokenAudience, TOKEN_LIFETIME_SECS},
    repository::{RoleRepository, UserRepository},
    schema::{AuthenticationRequest, RoleCreate, RoleUpdate, UserRegistration, UserUpdate},
    user::{AuthUser, Role, User},
};

/// Provides registration, authentication, verification, password reset
/// and role management for specified [`AuthUser`]
pub struct UserService<TAuthUser: AuthUser> {
    secret: String,
    access_token_lifetime: TimeDelta,
    password_manager: PasswordManager,
    repository: Arc<dyn UserRepository<TAuthUser>>,
    role_repository: Option<Arc<dyn RoleRepository>>,
    hooks: Arc<dyn UserServiceHooks<TAuthUser>>,
}

/// Emails are compared case-insensitively
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl<TAuthUser: AuthUser> UserService<TAuthUser> {
    pub fn password_manager(&self) -> &PasswordManager {
        &self.password_manager
    }

    pub fn roles_enabled(&self) -> bool {
        self.role_repository.is_some()
    }

    pub fn access_token_lifetime(&self) -> TimeDelta {
        self.access_token_lifetime
    }

    /// Stores a user created outside of the registration flow, e.g. by an admin.
    /// `verify` and `activate` override the user's flags
    pub async fn add_user(&self, mut user: TAuthUser, verify: bool, activate: bool) -> Result<TAuthUser, AuthError> {
        let email = normalize_email(user.email());
        TAuthUser::validate_email(&email)?;

        if self.repository.get_user_by_email(&email).await?.is_some() {
            return Err(AuthError::conflict("email already associated with an account"));
        }

        user.set_email(email);
        user.set_verified(verify);
        user.set_active(activate);

        let user = self.repository.add_user(&user).await?;
        tracing::info!(user_id = %user.id(), "user created");

        Ok(user)
    }

    /// Hashes `password` and stores a new user with it
    pub async fn create_user(&self, email: String, password: &str, verify: bool, activate: bool) -> Result<TAuthUser, AuthError> {
        TAuthUser::validate_password(password)?;

        let pwd_hash = self.password_manager.hash(password)?;
        let user = TAuthUser::new(email, pwd_hash, &serde_json::Map::new());

        self.add_user(user, verify, activate).await
    }

    /// Registers a new unverified user and sends them a verification token
    pub async fn register(&self, data: UserRegistration) -> Result<TAuthUser, AuthError> {
        if !self.hooks.pre_registration(&data).await? {
            tracing::info!("registration rejected by pre_registration hook");
            return Err(AuthError::RegistrationRejected);
        }

        TAuthUser::validate_password(&data.password)?;

        let pwd_hash = self.password_manager.hash(&data.password)?;
        let user = TAuthUser::new(data.email, pwd_hash, &data.extra);

        let user = self.add_user(user, false, true).await?;
        self.initiate_verification(&user).await?;

        self.hooks.post_registration(&user).await?;
        tracing::info!(user_id = %user.id(), "user registered");

        Ok(user)
    }

    /// Returns user with provided id and their roles
    pub async fn get_user(&self, id: Uuid) -> Result<TAuthUser, AuthError> {
        let user = self.repository.get_user(id)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("user {id}")))?;

        self.load_roles(user).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<TAuthUser>, AuthError> {
        match self.repository.get_user_by_email(&normalize_email(email)).await? {
            Some(user) => Ok(Some(self.load_roles(user).await?)),
            None => Ok(None),
        }
    }

    /// Applies the set fields of `data` to the user with provided id
    pub async fn update_user(&self, id: Uuid, data: UserUpdate) -> Result<TAuthUser, AuthError> {
        let mut user = self.repository.get_user(id)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("user {id}")))?;

        if let Some(email) = data.email {
            let email = normalize_email(&email);
            TAuthUser::validate_email(&email)?;

            if email != user.email() {
                if self.repository.get_user_by_email(&email).await?.is_some() {
                    return Err(AuthError::conflict("email already associated with an account"));
                }
                user.set_email(email);
            }
        }

        if let Some(password) = data.password {
            TAuthUser::validate_password(&password)?;
            user.set_pwd_hash(self.password_manager.hash(&password)?);
        }

        if let Some(is_active) = data.is_active {
            user.set_active(is_active);
        }

        if let Some(is_verified) = data.is_verified {
            user.set_verified(is_verified);
        }

        let user = self.repository.update_user(&user).await?;
        tracing::info!(user_id = %id, "user updated");

        self.load_roles(user).await
    }

    /// Deletes user with provided id along with their role assignments and returns them
    pub async fn delete_user(&self, id: Uuid) -> Result<TAuthUser, AuthError> {
        let user = self.get_user(id).await?;

        self.repository.delete_user(id).await?;
        if let Some(role_repository) = &self.role_repository {
            role_repository.remove_user_roles(id).await?;
        }
        tracing::info!(user_id = %id, "user deleted");

        Ok(user)
    }

    /// Checks credentials. Returns `None` for an unknown email, a wrong password,
    /// an inactive user or a login vetoed by `pre_login` hook.
    ///
    /// The password hasher runs on every path, so a missing user can't be told apart by timing.
    /// A hash made with a non-preferred scheme is replaced on success
    pub async fn authenticate(&self, data: &AuthenticationRequest) -> Result<Option<TAuthUser>, AuthError> {
        // the hook verdict is applied only after the password check
        let should_proceed = self.hooks.pre_login(data).await?;

        let Some(mut user) = self.repository.get_user_by_email(&normalize_email(&data.email)).await? else {
            self.password_manager.verify_and_update(&data.password, None)?;
            tracing::debug!("login failed: unknown email");
            return Ok(None);
        };

        let (verified, new_pwd_hash) = self.password_manager.verify_and_update(&data.password, Some(user.pwd_hash()))?;
        if let Some(new_pwd_hash) = new_pwd_hash {
            user.set_pwd_hash(new_pwd_hash);
            user = self.repository.update_user(&user).await?;
            tracing::info!(user_id = %user.id(), scheme = ?self.password_manager.preferred_scheme(), "password hash upgraded");
        }

        if !verified || !should_proceed || !user.is_active() {
            tracing::debug!(user_id = %user.id(), verified, should_proceed, "login failed");
            return Ok(None);
        }

        let user = self.load_roles(user).await?;
        self.hooks.post_login(&user).await?;

        Ok(Some(user))
    }

    /// [`Self::authenticate`] for login endpoints: fails on wrong credentials and unverified users
    pub async fn login(&self, data: &AuthenticationRequest) -> Result<TAuthUser, AuthError> {
        let user = self.authenticate(data).await?.ok_or(AuthError::Unauthorized)?;

        if !user.is_verified() {
            return Err(AuthError::NotVerified);
        }

        Ok(user)
    }

    /// Generates a token bound to `aud` flow which expires in 24 hours
    pub fn generate_token(&self, user_id: Uuid, aud: TokenAudience) -> Result<String, AuthError> {
        jwt::generate_token(user_id, aud, TimeDelta::seconds(TOKEN_LIFETIME_SECS), self.secret.as_bytes())
    }

    /// Generates a login token for the JWT auth backend
    pub fn generate_access_token(&self, user: &TAuthUser) -> Result<AccessToken, AuthError> {
        let access_token = jwt::generate_token(user.id(), TokenAudience::Access, self.access_token_lifetime, self.secret.as_bytes())?;

        Ok(AccessToken {
            access_token,
            token_type: "Bearer",
        })
    }

    fn decode_and_verify_token(&self, token: &str, aud: TokenAudience) -> Result<Claims, TokenError> {
        jwt::decode_token(token, aud, self.secret.as_bytes())
            .inspect_err(|err| tracing::warn!(%aud, error = %err, "token rejected"))
    }

    /// Returns active and verified user with provided id or `None`
    pub async fn retrieve_user(&self, id: Uuid) -> Result<Option<TAuthUser>, AuthError> {
        match self.repository.get_user(id).await? {
            Some(user) if user.is_active() && user.is_verified() => Ok(Some(self.load_roles(user).await?)),
            _ => Ok(None),
        }
    }

    /// Resolves the user of an access token (`Bearer ` prefix is allowed)
    pub async fn get_authenticated_user(&self, access_token: &str) -> Result<TAuthUser, AuthError> {
        let user_id = self.decode_and_verify_token(access_token, TokenAudience::Access)
            .and_then(|claims| claims.user_id())
            .map_err(|_| AuthError::Unauthorized)?;

        self.retrieve_user(user_id).await?.ok_or(AuthError::Unauthorized)
    }

    /// Sends a verification token to `user` via `send_verification_token` hook
    pub async fn initiate_verification(&self, user: &TAuthUser) -> Result<(), AuthError> {
        let token = self.generate_token(user.id(), TokenAudience::Verify)?;

        self.hooks.send_verification_token(user, &token).await
    }

    /// Marks the user of a verification token as verified
    pub async fn verify(&self, token: &str) -> Result<TAuthUser, AuthError> {
        let user_id = self.decode_and_verify_token(token, TokenAudience::Verify)?.user_id()?;

        let mut user = self.repository.get_user(user_id)
            .await?
            .ok_or_else(|| TokenError::Invalid("token is invalid".to_string()))?;

        user.set_verified(true);
        let user = self.repository.update_user(&user).await?;
        let user = self.load_roles(user).await?;
        tracing::info!(user_id = %user_id, "user verified");

        self.hooks.post_verification(&user).await?;

        Ok(user)
    }

    /// Sends a password reset token via `send_password_reset_token` hook.
    /// Unknown emails are silently ignored
    pub async fn initiate_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.repository.get_user_by_email(&normalize_email(email)).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let token = self.generate_token(user.id(), TokenAudience::ResetPassword)?;

        self.hooks.send_password_reset_token(&user, &token).await
    }

    /// Replaces the password of the user of a password reset token, returns the user
    pub async fn reset_password(&self, token: &str, password: &str) -> Result<TAuthUser, AuthError> {
        let user_id = self.decode_and_verify_token(token, TokenAudience::ResetPassword)?.user_id()?;

        TAuthUser::validate_password(password)?;

        let mut user = self.repository.get_user(user_id)
            .await?
            .ok_or_else(|| TokenError::Invalid("token is invalid".to_string()))?;

        user.set_pwd_hash(self.password_manager.hash(password)?);
        let user = self.repository.update_user(&user).await?;
        tracing::info!(user_id = %user_id, "password reset");

        Ok(user)
    }

    fn role_repository(&self) -> Result<&Arc<dyn RoleRepository>, AuthError> {
        self.role_repository.as_ref().ok_or(AuthError::RolesNotConfigured)
    }

    async fn load_roles(&self, mut user: TAuthUser) -> Result<TAuthUser, AuthError> {
        if let Some(role_repository) = &self.role_repository {
            user.set_roles(role_repository.get_user_roles(user.id()).await?);
        }

        Ok(user)
    }

    pub async fn get_role(&self, id: Uuid) -> Result<Role, AuthError> {
        self.role_repository()?
            .get_role(id)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("role {id}")))
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Role, AuthError> {
        self.role_repository()?
            .get_role_by_name(name)
            .await?
            .ok_or_else(|| AuthError::not_found(format!("role '{name}'")))
    }

    pub async fn add_role(&self, data: RoleCreate) -> Result<Role, AuthError> {
        let role_repository = self.role_repository()?;

        validate_role_name(&data.name)?;

        let role = role_repository.add_role(&Role::new(data.name, data.description)).await?;
        tracing::info!(role_id = %role.id, role = %role.name, "role created");

        Ok(role)
    }

    pub async fn update_role(&self, id: Uuid, data: RoleUpdate) -> Result<Role, AuthError> {
        let mut role = self.get_role(id).await?;

        if let Some(name) = data.name {
            validate_role_name(&name)?;
            role.name = name;
        }

        if let Some(description) = data.description {
            role.description = Some(description);
        }

        Ok(self.role_repository()?.update_role(&role).await?)
    }

    pub async fn delete_role(&self, id: Uuid) -> Result<Role, AuthError> {
        let role = self.role_repository()?.delete_role(id).await?;
        tracing::info!(role_id = %id, role = %role.name, "role deleted");

        Ok(role)
    }

    /// Adds a role to a user. Fails with a conflict if the user already has it
    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<TAuthUser, AuthError> {
        let role_repository = self.role_repository()?;
        let user = self.get_user(user_id).await?;
        let role = self.get_role(role_id).await?;

        if user.roles().iter().any(|r| r.id == role.id) {
            return Err(AuthError::conflict(format!("user already has role '{}'", role.name)));
        }

        role_repository.assign_role(user_id, role_id).await?;
        tracing::info!(user_id = %user_id, role = %role.name, "role assigned");

        self.load_roles(user).await
    }

    /// Revokes a role from a user. Fails with a conflict if the user doesn't have it
    pub async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<TAuthUser, AuthError> {
        let role_repository = self.role_repository()?;
        let user = self.get_user(user_id).await?;
        let role = self.get_role(role_id).await?;

        if !user.roles().iter().any(|r| r.id == role.id) {
            return Err(AuthError::conflict(format!("user does not have role '{}'", role.name)));
        }

        role_repository.revoke_role(user_id, role_id).await?;
        tracing::info!(user_id = %user_id, role = %role.name, "role revoked");

        self.load_roles(user).await
    }
}

fn validate_role_name(name: &str) -> Result<(), AuthError> {
    if name.trim().is_empty() || name.chars().count() > 255 {
        return Err(AuthError::ValidationError("role name must be between 1 and 255 characters".to_string()));
    }

    Ok(())
}

/// Builder to configure and build [`UserService`]
pub struct UserServiceBuilder<TAuthUser: AuthUser> {
    secret: Option<String>,
    access_token_lifetime: TimeDelta,
    hash_schemes: Vec<HashScheme>,
    repository: Option<Arc<dyn UserRepository<TAuthUser>>>,
    role_repository: Option<Arc<dyn RoleRepository>>,
    hooks: Arc<dyn UserServiceHooks<TAuthUser>>,
}

/// Creates default builder with the following configuration:
/// + Default [`User`] model
/// + argon2 password hashing
/// + no-op hooks
pub fn default_builder() -> UserServiceBuilder<User> {
    builder()
}

/// Creates builder to configure and build [`UserService`].
/// See also [`AuthUser`]
pub fn builder<TAuthUser: AuthUser>() -> UserServiceBuilder<TAuthUser> {
    UserServiceBuilder {
        secret: None,
        access_token_lifetime: TimeDelta::days(1),
        hash_schemes: vec![HashScheme::Argon2],
        repository: None,
        role_repository: None,
        hooks: Arc::new(NoopHooks),
    }
}

impl<TAuthUser: AuthUser> UserServiceBuilder<TAuthUser> {
    /// Takes secret, hash schemes and access token lifetime from `config`.
    /// An out of range lifetime is rejected by [`UserServiceBuilder::build`]
    pub fn configure(self, config: &UsersConfig) -> Self {
        let access_token_lifetime = positive_seconds(config.access_token_lifetime_secs).unwrap_or_else(TimeDelta::zero);

        self.set_secret(config.secret.clone())
            .set_hash_schemes(config.hash_schemes.clone())
            .set_access_token_lifetime(access_token_lifetime)
    }

    /// Sets secret for signing tokens. Must be 16, 24 or 32 characters
    pub fn set_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);

        self
    }

    /// Sets accepted hash schemes, the first one is used for new hashes
    pub fn set_hash_schemes(mut self, hash_schemes: Vec<HashScheme>) -> Self {
        self.hash_schemes = hash_schemes;

        self
    }

    pub fn set_access_token_lifetime(mut self, lifetime: TimeDelta) -> Self {
        self.access_token_lifetime = lifetime;

        self
    }

    /// Sets the repository which will be used in [`UserService`]
    pub fn use_repository(mut self, repository: Arc<dyn UserRepository<TAuthUser>>) -> Self {
        self.repository = Some(repository);

        self
    }

    /// Enables role management
    pub fn use_role_repository(mut self, role_repository: Arc<dyn RoleRepository>) -> Self {
        self.role_repository = Some(role_repository);

        self
    }

    pub fn use_hooks(mut self, hooks: Arc<dyn UserServiceHooks<TAuthUser>>) -> Self {
        self.hooks = hooks;

        self
    }

    /// Builds [`UserService`]
    ///
    /// Returns error, if there are some validation problems or some of the required dependencies are not configured
    pub fn build(self) -> Result<UserService<TAuthUser>, ConfigError> {
        let secret = self.secret.ok_or(ConfigError::Missing("secret"))?;
        validate_secret(&secret)?;

        if self.access_token_lifetime <= TimeDelta::zero() {
            return Err(ConfigError::InvalidTokenLifetime);
        }

        let password_manager = PasswordManager::new(&self.hash_schemes)
            .map_err(|err| ConfigError::Hasher(err.to_string()))?;

        Ok(UserService {
            secret,
            access_token_lifetime: self.access_token_lifetime,
            password_manager,
            repository: self.repository.ok_or(ConfigError::Missing("user repository"))?,
            role_repository: self.role_repository,
            hooks: self.hooks,
        })
    }
}
