mod auth;
mod client;
mod gmail_url;
mod message;

pub(crate) use gmail_url::*;

pub use auth::*;
pub use client::*;
pub use message::*;
