use std::path::Path;

use serde::Deserialize;
use tokio::sync::RwLock;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// On-disk "authorized user" credential file as produced by a completed
/// OAuth consent flow (`token.json`).
#[derive(Debug, Deserialize)]
struct AuthorizedUserFile {
    #[serde(alias = "access_token")]
    token: Option<String>,
    refresh_token: String,
    client_id: String,
    client_secret: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("failed to read credentials file: {0}")]
    TokenFile(#[from] std::io::Error),
    #[error("failed to parse credentials file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("token refresh rejected: {0}")]
    RefreshRejected(String),
    #[error("token endpoint error: {0}")]
    ResponseError(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth credentials for a single Gmail account. Holds the long-lived
/// refresh token and caches the short-lived access token between calls.
#[derive(Debug)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
    access_token: RwLock<Option<String>>,
}

impl Credentials {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            token_uri: default_token_uri(),
            access_token: RwLock::new(None),
        }
    }

    /// Load credentials from an authorized user file (`token.json`).
    pub fn from_authorized_user_file(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let contents = std::fs::read_to_string(path)?;
        let file: AuthorizedUserFile = serde_json::from_str(&contents)?;
        Ok(Self {
            client_id: file.client_id,
            client_secret: file.client_secret,
            refresh_token: file.refresh_token,
            token_uri: file.token_uri,
            access_token: RwLock::new(file.token),
        })
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// Exchange the refresh token for a fresh access token and cache it.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<String, CredentialsError> {
        let client = reqwest::Client::new();
        let response = client
            .post(&self.token_uri)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|err| CredentialsError::ResponseError(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::RefreshRejected(format!(
                "{}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| CredentialsError::ResponseError(err.to_string()))?;

        let mut cached = self.access_token.write().await;
        *cached = Some(token.access_token.clone());

        Ok(token.access_token)
    }
}
