use std::env;

const DEFAULT_API_URL: &str = "https://gmail.googleapis.com";

#[derive(Debug)]
pub struct GmailUrl(String);

impl AsRef<str> for GmailUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl GmailUrl {
    /// API base URL, overridable through the `GMAIL_API_URL` environment
    /// variable.
    pub fn from_env() -> Self {
        Self(env::var("GMAIL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()))
    }

    /// Append the given path to the URL.
    pub fn append_path(&self, path: &str) -> Self {
        let trimmed_url = self.0.trim_end_matches('/');
        let trimmed_path = path.trim_start_matches('/');
        Self(format!("{}/{}", trimmed_url, trimmed_path))
    }
}
