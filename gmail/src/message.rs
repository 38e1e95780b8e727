use base64::prelude::{Engine, BASE64_URL_SAFE};
use serde::Serialize;

/// A plain-text email to be sent through the Gmail API.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// RFC 2822 message, base64url-encoded the way the `messages.send`
    /// endpoint expects its `raw` field.
    pub fn to_raw(&self) -> String {
        let message = format!(
            "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
            self.to, self.subject, self.body
        );
        BASE64_URL_SAFE.encode(message)
    }
}
