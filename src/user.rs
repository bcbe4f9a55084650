use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AuthError;

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid"));

/// User in auth context
pub trait AuthUser: Serialize + Clone + fmt::Debug + Send + Sync + 'static {
    /// Creates new user. `extra` holds the registration fields beyond email and password,
    /// implementations with custom fields pick theirs from it
    fn new(email: String, pwd_hash: String, extra: &Map<String, Value>) -> Self;

    /// for mapping purposes
    fn existing(id: Uuid, email: String, pwd_hash: String, is_active: bool, is_verified: bool, roles: Vec<Role>) -> Self;

    /// Validates if provided email looks like an email
    fn validate_email(email: &str) -> Result<(), AuthError> {
        if !EMAIL_REGEX.is_match(email) {
            return Err(AuthError::ValidationError("email must be a valid email address".to_string()));
        }

        Ok(())
    }

    /// Validates if provided password meets the minimum requirements
    fn validate_password(password: &str) -> Result<(), AuthError> {
        const PWD_REQS: &str = "password must be between 6 and 128 characters";

        let length = password.chars().count();
        if !(6..=128).contains(&length) {
            return Err(AuthError::ValidationError(PWD_REQS.to_string()));
        }

        Ok(())
    }

    // getters
    fn id(&self) -> Uuid;
    fn email(&self) -> &str;
    fn pwd_hash(&self) -> &str;
    fn is_active(&self) -> bool;
    fn is_verified(&self) -> bool;
    fn roles(&self) -> &[Role];

    // setters
    fn set_id(&mut self, value: Uuid);
    fn set_email(&mut self, value: String);
    fn set_pwd_hash(&mut self, value: String);
    fn set_active(&mut self, value: bool);
    fn set_verified(&mut self, value: bool);
    fn set_roles(&mut self, value: Vec<Role>);

    fn has_role(&self, name: &str) -> bool {
        self.roles().iter().any(|role| role.name == name)
    }
}

/// Named set of permissions which may be assigned to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl Role {
    pub fn new(name: String, description: Option<String>) -> Self {
        Role {
            id: Uuid::new_v4(),
            name,
            description,
        }
    }
}

/// Default implementation of [`AuthUser`]
#[derive(Clone, Serialize)]
pub struct User {
    id: Uuid,
    email: String,
    #[serde(skip_serializing)]
    pwd_hash: String,
    is_active: bool,
    is_verified: bool,
    roles: Vec<Role>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("pwd_hash", &"***")
            .field("is_active", &self.is_active)
            .field("is_verified", &self.is_verified)
            .field("roles", &self.roles)
            .finish()
    }
}

impl AuthUser for User {
    fn new(email: String, pwd_hash: String, _extra: &Map<String, Value>) -> Self {
        User {
            id: Uuid::new_v4(),
            email,
            pwd_hash,
            is_active: true,
            is_verified: false,
            roles: Vec::new(),
        }
    }

    fn existing(id: Uuid, email: String, pwd_hash: String, is_active: bool, is_verified: bool, roles: Vec<Role>) -> Self {
        User {
            id,
            email,
            pwd_hash,
            is_active,
            is_verified,
            roles,
        }
    }

    fn id(&self) -> Uuid { self.id }
    fn email(&self) -> &str { &self.email }
    fn pwd_hash(&self) -> &str { &self.pwd_hash }
    fn is_active(&self) -> bool { self.is_active }
    fn is_verified(&self) -> bool { self.is_verified }
    fn roles(&self) -> &[Role] { &self.roles }

    fn set_id(&mut self, value: Uuid) { self.id = value; }
    fn set_email(&mut self, value: String) { self.email = value; }
    fn set_pwd_hash(&mut self, value: String) { self.pwd_hash = value; }
    fn set_active(&mut self, value: bool) { self.is_active = value; }
    fn set_verified(&mut self, value: bool) { self.is_verified = value; }
    fn set_roles(&mut self, value: Vec<Role>) { self.roles = value; }
}
