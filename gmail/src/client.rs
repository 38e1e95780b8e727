use serde_json::json;

use crate::{Credentials, CredentialsError, GmailUrl, OutgoingEmail};

#[derive(Debug, thiserror::Error)]
pub enum GmailError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("ResponseError: {0}")]
    ResponseError(String),
}

/// Client for sending mail as the authenticated user through the Gmail
/// REST API (`users.messages.send`).
#[derive(Debug)]
pub struct GmailClient {
    credentials: Credentials,
    client: reqwest::Client,
}

impl GmailClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            client: reqwest::Client::new(),
        }
    }

    /// Send the email, refreshing the access token once if the cached one
    /// has expired.
    #[tracing::instrument(skip(self, email), fields(to = %email.to))]
    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), GmailError> {
        let token = match self.credentials.access_token().await {
            Some(token) => token,
            None => self.credentials.refresh().await?,
        };

        match self.try_send(&token, email).await {
            Err(GmailError::Unauthorized) => {
                tracing::debug!("access token expired, refreshing");
                let token = self.credentials.refresh().await?;
                self.try_send(&token, email).await
            }
            result => result,
        }
    }

    async fn try_send(&self, token: &str, email: &OutgoingEmail) -> Result<(), GmailError> {
        let url = GmailUrl::from_env().append_path("/gmail/v1/users/me/messages/send");

        let response = self
            .client
            .post(url.as_ref())
            .bearer_auth(token)
            .json(&json!({ "raw": email.to_raw() }))
            .send()
            .await
            .map_err(|err| GmailError::ResponseError(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GmailError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GmailError::ResponseError(format!("{}: {}", status, body)));
        }

        Ok(())
    }
}
