mod dispatcher;
mod email;
mod machine;
mod notification;
mod notifier;
mod period;
mod tracker;
mod user;

pub use dispatcher::*;
pub use email::*;
pub use machine::*;
pub use notification::*;
pub use notifier::*;
pub use period::*;
pub use tracker::*;
pub use user::*;
