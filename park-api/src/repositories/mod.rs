mod machine_repo;
mod notification_repo;
mod repo_error;
mod user_repo;

pub use machine_repo::*;
pub use notification_repo::*;
pub use repo_error::RepositoryError;
pub use user_repo::*;
