use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{error::RepositoryError, user::{AuthUser, Role}};

use super::{RoleRepository, UserRepository};

/// In-process implementation of [`UserRepository`]. Data lives as long as the repository
pub struct InMemoryUserRepository<TAuthUser: AuthUser> {
    users: RwLock<HashMap<Uuid, TAuthUser>>,
}

impl<TAuthUser: AuthUser> InMemoryUserRepository<TAuthUser> {
    pub fn new() -> Self {
        InMemoryUserRepository {
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl<TAuthUser: AuthUser> Default for InMemoryUserRepository<TAuthUser> {
    fn default() -> Self {
        Self::new()
    }
}

impl<TAuthUser: AuthUser> fmt::Debug for InMemoryUserRepository<TAuthUser> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InMemoryUserRepository")
    }
}

fn email_taken<TAuthUser: AuthUser>(users: &HashMap<Uuid, TAuthUser>, user: &TAuthUser) -> bool {
    users.values().any(|existing| existing.id() != user.id() && existing.email() == user.email())
}

#[async_trait]
impl<TAuthUser: AuthUser> UserRepository<TAuthUser> for InMemoryUserRepository<TAuthUser> {
    async fn add_user(&self, user: &TAuthUser) -> Result<TAuthUser, RepositoryError> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.id()) {
            return Err(RepositoryError::Conflict(format!("user with id {} already exists", user.id())));
        }
        if email_taken(&users, user) {
            return Err(RepositoryError::Conflict("email already associated with an account".to_string()));
        }

        users.insert(user.id(), user.clone());

        Ok(user.clone())
    }

    async fn update_user(&self, user: &TAuthUser) -> Result<TAuthUser, RepositoryError> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user.id()) {
            return Err(RepositoryError::NotFound(format!("user {}", user.id())));
        }
        if email_taken(&users, user) {
            return Err(RepositoryError::Conflict("email already associated with an account".to_string()));
        }

        users.insert(user.id(), user.clone());

        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<TAuthUser, RepositoryError> {
        self.users
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<TAuthUser>, RepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<TAuthUser>, RepositoryError> {
        Ok(self.users.read().await.values().find(|user| user.email() == email).cloned())
    }
}

#[derive(Default)]
struct RoleStore {
    roles: HashMap<Uuid, Role>,
    // user id -> role ids
    assignments: HashMap<Uuid, HashSet<Uuid>>,
}

/// In-process implementation of [`RoleRepository`]
#[derive(Default)]
pub struct InMemoryRoleRepository {
    store: RwLock<RoleStore>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for InMemoryRoleRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InMemoryRoleRepository")
    }
}

fn name_taken(roles: &HashMap<Uuid, Role>, role: &Role) -> bool {
    roles.values().any(|existing| existing.id != role.id && existing.name == role.name)
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn add_role(&self, role: &Role) -> Result<Role, RepositoryError> {
        let mut store = self.store.write().await;

        if store.roles.contains_key(&role.id) || name_taken(&store.roles, role) {
            return Err(RepositoryError::Conflict(format!("role '{}' already exists", role.name)));
        }

        store.roles.insert(role.id, role.clone());

        Ok(role.clone())
    }

    async fn update_role(&self, role: &Role) -> Result<Role, RepositoryError> {
        let mut store = self.store.write().await;

        if !store.roles.contains_key(&role.id) {
            return Err(RepositoryError::NotFound(format!("role {}", role.id)));
        }
        if name_taken(&store.roles, role) {
            return Err(RepositoryError::Conflict(format!("role '{}' already exists", role.name)));
        }

        store.roles.insert(role.id, role.clone());

        Ok(role.clone())
    }

    async fn delete_role(&self, id: Uuid) -> Result<Role, RepositoryError> {
        let mut store = self.store.write().await;

        let role = store.roles.remove(&id).ok_or_else(|| RepositoryError::NotFound(format!("role {id}")))?;
        for role_ids in store.assignments.values_mut() {
            role_ids.remove(&id);
        }

        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, RepositoryError> {
        Ok(self.store.read().await.roles.get(&id).cloned())
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError> {
        Ok(self.store.read().await.roles.values().find(|role| role.name == name).cloned())
    }

    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, RepositoryError> {
        let store = self.store.read().await;

        let mut roles: Vec<Role> = store
            .assignments
            .get(&user_id)
            .map(|role_ids| role_ids.iter().filter_map(|id| store.roles.get(id).cloned()).collect())
            .unwrap_or_default();
        roles.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(roles)
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;

        if !store.roles.contains_key(&role_id) {
            return Err(RepositoryError::NotFound(format!("role {role_id}")));
        }
        if !store.assignments.entry(user_id).or_default().insert(role_id) {
            return Err(RepositoryError::Conflict("user already has this role".to_string()));
        }

        Ok(())
    }

    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;

        let removed = store
            .assignments
            .get_mut(&user_id)
            .map(|role_ids| role_ids.remove(&role_id))
            .unwrap_or(false);
        if !removed {
            return Err(RepositoryError::Conflict("user does not have this role".to_string()));
        }

        Ok(())
    }

    async fn remove_user_roles(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        self.store.write().await.assignments.remove(&user_id);

        Ok(())
    }
}
