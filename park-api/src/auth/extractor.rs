use std::ops::Deref;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{domain::User, routes::ApiError};

use super::AuthSession;

/// A custom Axum extractor that extracts the authenticated [`User`] directly
/// from the request. Returns 401 Unauthorized if no user is logged in.
///
/// This replaces the pattern of extracting `AuthSession` and then manually
/// unwrapping `.user` with `.ok_or()` in every handler.
///
/// Safe to log: `User`'s `Debug` impl redacts the password hash.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    user: User,
}

impl Deref for AuthUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthSession: FromRequestParts<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_session = AuthSession::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::unauthorized("Not authenticated"))?;

        let user = auth_session
            .user
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;

        Ok(AuthUser { id: user.id, user })
    }
}
