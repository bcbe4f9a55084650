use std::fmt;

use async_trait::async_trait;
use tokio_postgres::{error::SqlState, NoTls, Row};
use uuid::Uuid;

use crate::{error::RepositoryError, user::{AuthUser, Role}};

use super::{RoleRepository, UserRepository};

static SELECT_ALL_FROM_USERS: &str = "\
    SELECT
        id,
        email,
        pwd_hash,
        is_active,
        is_verified
    FROM users
";

static SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        email VARCHAR(320) NOT NULL UNIQUE,
        pwd_hash VARCHAR(1024) NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT FALSE,
        is_verified BOOLEAN NOT NULL DEFAULT FALSE
    );
    CREATE TABLE IF NOT EXISTS roles (
        id UUID PRIMARY KEY,
        name VARCHAR(255) NOT NULL UNIQUE,
        description VARCHAR(255)
    );
    CREATE TABLE IF NOT EXISTS users_roles (
        user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        role_id UUID NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    );
";

/// Postgres implementation of [`UserRepository`] and [`RoleRepository`]
pub struct PgRepository {
    conn_string: String
}

impl fmt::Debug for PgRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PgRepository")
    }
}

impl PgRepository {
    /// Creates [`PgRepository`]. Tries to connect on creation
    pub async fn create(conn_string: String) -> Result<Self, RepositoryError> {
        if conn_string.is_empty() {
            return Err(RepositoryError::Backend("Connection string for PgRepository must be non-empty".to_string()));
        }

        if let Err(err) = tokio_postgres::connect(&conn_string, NoTls).await {
            return Err(RepositoryError::Backend(format!("Connection error by provided connection string for PgRepository: {err}")));
        }

        Ok(PgRepository {
            conn_string
        })
    }

    /// Creates `users`, `roles` and `users_roles` tables if they don't exist
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        client.batch_execute(SCHEMA).await.map_err(map_db_error)?;
        tracing::info!("users schema is up to date");

        Ok(())
    }
}

#[async_trait]
impl<TAuthUser: AuthUser> UserRepository<TAuthUser> for PgRepository {
    async fn add_user(&self, user: &TAuthUser) -> Result<TAuthUser, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_one("\
            INSERT INTO users (id, email, pwd_hash, is_active, is_verified)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, pwd_hash, is_active, is_verified;",
            &[
                &user.id(),
                &user.email(),
                &user.pwd_hash(),
                &user.is_active(),
                &user.is_verified()
            ])
            .await
            .map_err(map_db_error)?;

        Ok(map_to_user(&row))
    }

    async fn update_user(&self, user: &TAuthUser) -> Result<TAuthUser, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_opt("\
            UPDATE users
            SET email = $1,
                pwd_hash = $2,
                is_active = $3,
                is_verified = $4
            WHERE id = $5
            RETURNING id, email, pwd_hash, is_active, is_verified;", &[
                &user.email(),
                &user.pwd_hash(),
                &user.is_active(),
                &user.is_verified(),
                &user.id()])
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user.id())))?;

        Ok(map_to_user(&row))
    }

    async fn delete_user(&self, id: Uuid) -> Result<TAuthUser, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_opt("\
            DELETE FROM users
            WHERE id = $1
            RETURNING id, email, pwd_hash, is_active, is_verified;", &[&id])
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {id}")))?;

        Ok(map_to_user(&row))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<TAuthUser>, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let query = format!("\
            {SELECT_ALL_FROM_USERS}
            WHERE id=$1");
        let row = client.query_opt(&query, &[&id])
            .await
            .map_err(map_db_error)?;

        Ok(row.map(|row| map_to_user(&row)))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<TAuthUser>, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let query = format!("\
            {SELECT_ALL_FROM_USERS}
            WHERE email=$1");
        let row = client.query_opt(&query, &[&email])
            .await
            .map_err(map_db_error)?;

        Ok(row.map(|row| map_to_user(&row)))
    }
}

#[async_trait]
impl RoleRepository for PgRepository {
    async fn add_role(&self, role: &Role) -> Result<Role, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_one("\
            INSERT INTO roles (id, name, description)
            VALUES ($1, $2, $3)
            RETURNING id, name, description;",
            &[&role.id, &role.name, &role.description])
            .await
            .map_err(map_db_error)?;

        Ok(map_to_role(&row))
    }

    async fn update_role(&self, role: &Role) -> Result<Role, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_opt("\
            UPDATE roles
            SET name = $1,
                description = $2
            WHERE id = $3
            RETURNING id, name, description;",
            &[&role.name, &role.description, &role.id])
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("role {}", role.id)))?;

        Ok(map_to_role(&row))
    }

    async fn delete_role(&self, id: Uuid) -> Result<Role, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_opt("\
            DELETE FROM roles
            WHERE id = $1
            RETURNING id, name, description;", &[&id])
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| RepositoryError::NotFound(format!("role {id}")))?;

        Ok(map_to_role(&row))
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_opt("SELECT id, name, description FROM roles WHERE id = $1", &[&id])
            .await
            .map_err(map_db_error)?;

        Ok(row.map(|row| map_to_role(&row)))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let row = client.query_opt("SELECT id, name, description FROM roles WHERE name = $1", &[&name])
            .await
            .map_err(map_db_error)?;

        Ok(row.map(|row| map_to_role(&row)))
    }

    async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let result = client.query("
            SELECT r.id, r.name, r.description
            FROM users_roles ur
            INNER JOIN roles r
            ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name", &[&user_id])
            .await
            .map_err(map_db_error)?
            .iter()
            .map(map_to_role)
            .collect();

        Ok(result)
    }

    async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        client.execute("\
            INSERT INTO users_roles (user_id, role_id)
            VALUES ($1, $2);",
            &[&user_id, &role_id])
            .await
            .map_err(map_db_error)?;

        Ok(())
    }

    async fn revoke_role(&self, user_id: Uuid, role_id: Uuid) -> Result<(), RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        let deleted_rows = client.execute("\
            DELETE FROM users_roles
            WHERE user_id = $1 AND role_id = $2;",
            &[&user_id, &role_id])
            .await
            .map_err(map_db_error)?;
        if deleted_rows == 0 {
            return Err(RepositoryError::Conflict("user does not have this role".to_string()));
        }

        Ok(())
    }

    async fn remove_user_roles(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        let client = open_connection(&self.conn_string).await?;

        client.execute("DELETE FROM users_roles WHERE user_id = $1;", &[&user_id])
            .await
            .map_err(map_db_error)?;

        Ok(())
    }
}

async fn open_connection(conn_string: &str) -> Result<tokio_postgres::Client, RepositoryError> {
    let (client, connection) = tokio_postgres::connect(conn_string, NoTls)
        .await
        .map_err(|err| RepositoryError::Backend(err.to_string()))?;

    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::error!(error = %err, "postgres connection error");
        }
    });

    Ok(client)
}

fn map_db_error(err: tokio_postgres::Error) -> RepositoryError {
    let message = err
        .as_db_error()
        .map(|db_err| db_err.message().to_string())
        .unwrap_or_else(|| err.to_string());

    match err.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => RepositoryError::Conflict(message),
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => RepositoryError::NotFound(message),
        _ => RepositoryError::Backend(message),
    }
}

fn map_to_user<TAuthUser: AuthUser>(row: &Row) -> TAuthUser {
    TAuthUser::existing(
        row.get("id"),
        row.get("email"),
        row.get("pwd_hash"),
        row.get("is_active"),
        row.get("is_verified"),
        Vec::new())
}

fn map_to_role(row: &Row) -> Role {
    Role {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
    }
}
