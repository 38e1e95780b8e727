use std::collections::HashSet;

use async_trait::async_trait;
use axum_login::{AuthnBackend, AuthzBackend, UserId as SessionUserId};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::password::verify_password,
    domain::{Role, User},
    repositories::{RepositoryError, UserRepository, UserRepositoryImpl},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Sqlx(#[from] RepositoryError),

    #[error("password hash error: {0}")]
    PasswordHash(argon2::password_hash::Error),
}

#[derive(Debug, Clone)]
pub struct AuthBackend {
    db: SqlitePool,
}

impl AuthBackend {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuthnBackend for AuthBackend {
    type User = User;
    type Credentials = Credentials;
    type Error = BackendError;

    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let user_repo = UserRepositoryImpl::new(self.db.clone());

        // An unknown username is rejected the same way as a wrong password.
        let user = match user_repo.get_user_by_username(&creds.username).await {
            Ok(user) => user,
            Err(RepositoryError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let verified = verify_password(&creds.password, &user.password_hash)
            .map_err(Self::Error::PasswordHash)?;

        Ok(verified.then_some(user))
    }

    async fn get_user(
        &self,
        user_id: &SessionUserId<Self>,
    ) -> Result<Option<Self::User>, Self::Error> {
        let user_repo = UserRepositoryImpl::new(self.db.clone());
        match user_repo.get_user(*user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(RepositoryError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl AuthzBackend for AuthBackend {
    type Permission = Role;

    async fn get_user_permissions(
        &self,
        user: &Self::User,
    ) -> Result<HashSet<Self::Permission>, Self::Error> {
        Ok(HashSet::from([user.role.clone()]))
    }
}

pub type AuthSession = axum_login::AuthSession<AuthBackend>;
