#[cfg(feature = "pg-repository")]
pub mod pg_repository;
pub mod memory;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use uuid::Uuid;

use crate::{error::RepositoryError, user::{AuthUser, Role}};

/// User storage which is used in [`crate::UserService`].
///
/// Emails are stored and looked up in the form the service passes them (lowercased).
/// `add_user` and `update_user` must report a taken email as [`RepositoryError::Conflict`]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository<TAuthUser: AuthUser>: Send + Sync {
    /// returns stored user
    async fn add_user(&self, user: &TAuthUser) -> Result<TAuthUser, RepositoryError>;
    async fn update_user(&self, user: &TAuthUser) -> Result<TAuthUser, RepositoryError>;
    /// returns deleted user
    async fn delete_user(&self, id: Uuid) -> Result<TAuthUser, RepositoryError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<TAuthUser>, RepositoryError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<TAuthUser>, RepositoryError>;
}

/// Role storage and user-role associations.
///
/// `add_role` and `update_role` must report a taken name as [`RepositoryError::Conflict`]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn add_role(&self, role: &Role) -> Result<Role, RepositoryError>;
    async fn update_role(&self, role: &Role) -> Result<Role, RepositoryError>;
    /// returns deleted role
    async fn delete_role(&self, id: Uuid) -> Result<Role, RepositoryError>;
    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, RepositoryError>;
    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError>;
    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, RepositoryError>;
    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), RepositoryError>;
    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), RepositoryError>;
    /// Drops every role assignment of the user, a no-op if there are none
    async fn remove_user_roles(&self, user_id: Uuid) -> Result<(), RepositoryError>;
}
