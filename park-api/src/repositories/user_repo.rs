use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::domain::{Role, User};

use super::repo_error::{is_unique_violation, RepositoryError};

pub trait UserRepository {
    async fn get_user(&self, id: i64) -> Result<User, RepositoryError>;
    async fn get_user_by_username(&self, username: &str) -> Result<User, RepositoryError>;
    async fn insert_user(&self, user: &NewUser) -> Result<User, RepositoryError>;
    async fn ensure_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<(), RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
}

pub struct UserRepositoryImpl {
    pool: SqlitePool,
}

impl UserRepositoryImpl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password_hash: String,
    role: String,
    created_at: NaiveDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role: Role::from(row.role),
            created_at: row.created_at,
        }
    }
}

impl UserRepository for UserRepositoryImpl {
    async fn get_user(&self, id: i64) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, role, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        Ok(row.into())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, role, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(username.to_string()))?;

        Ok(row.into())
    }

    async fn insert_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password_hash, role)
            VALUES (?, ?, ?)
            RETURNING id, username, password_hash, role, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.role.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                RepositoryError::Duplicate(user.username.clone())
            } else {
                err.into()
            }
        })?;

        Ok(row.into())
    }

    /// Seeds the admin account on startup. An existing account with the
    /// same username is left untouched.
    async fn ensure_admin(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, role)
            VALUES (?, ?, 'Admin')
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, password_hash, role, created_at
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }
}

pub struct NewUser {
    username: String,
    password_hash: String,
    role: Role,
}

impl NewUser {
    pub fn new(username: String, password_hash: String, role: Role) -> Self {
        Self {
            username,
            password_hash,
            role,
        }
    }
}
