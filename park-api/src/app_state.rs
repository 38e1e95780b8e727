use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::mpsc;

use crate::{
    config::Settings,
    domain::{Email, MachineTracker, NotificationMessage},
    repositories::{MachineRepositoryImpl, NotificationRepositoryImpl, UserRepositoryImpl},
};

#[derive(Clone)]
pub struct AppState {
    pub machine_repo: Arc<MachineRepositoryImpl>,
    pub user_repo: Arc<UserRepositoryImpl>,
    pub notification_repo: Arc<NotificationRepositoryImpl>,
    pub tracker: Arc<MachineTracker>,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        config: &Settings,
        notification_tx: mpsc::Sender<NotificationMessage>,
    ) -> Self {
        let machine_repo = Arc::new(MachineRepositoryImpl::new(db_pool.clone()));
        let user_repo = Arc::new(UserRepositoryImpl::new(db_pool.clone()));
        let notification_repo = Arc::new(NotificationRepositoryImpl::new(db_pool));

        let recipient = Email::parse(config.mail.recipient.clone())
            .expect("Mail recipient must be a valid email address");

        let tracker = Arc::new(MachineTracker::new(
            machine_repo.clone(),
            notification_repo.clone(),
            notification_tx,
            recipient,
            config.tracker.rollover_weekday,
        ));

        Self {
            machine_repo,
            user_repo,
            notification_repo,
            tracker,
        }
    }
}
