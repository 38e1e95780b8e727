pub(crate) mod error;
pub(crate) mod machines;
pub(crate) mod notifications;
pub(crate) mod rollovers;
pub(crate) mod users;

pub(crate) use error::ApiError;
