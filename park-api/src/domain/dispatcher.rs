use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::repositories::{NotificationRepository, NotificationRepositoryImpl, RepositoryError};

use super::{Email, NotificationMessage, NotificationStatus, Notifier};

/// Background worker that drains the notification outbox. Listens for
/// delivery requests on a channel and additionally sweeps the outbox on an
/// interval, so notifications queued before a restart still go out.
pub struct NotificationDispatcher {
    notification_repo: Arc<NotificationRepositoryImpl>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(
        notification_repo: Arc<NotificationRepositoryImpl>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            notification_repo,
            notifier,
        }
    }

    #[instrument(name = "NotificationDispatcher::run", skip(self, receiver))]
    pub async fn run(&self, mut receiver: mpsc::Receiver<NotificationMessage>) {
        // The first tick fires immediately, which doubles as the startup
        // sweep of anything left over from a previous run.
        let mut sweep_interval = tokio::time::interval(Self::SWEEP_INTERVAL);

        loop {
            tokio::select! {
                Some(message) = receiver.recv() => {
                    match message {
                        NotificationMessage::Deliver(id) => self.deliver(id).await,
                    }
                }
                _ = sweep_interval.tick() => {
                    if let Err(err) = self.drain_pending().await {
                        tracing::error!("Failed to drain pending notifications: {}", err);
                    }
                }
            }
        }
    }

    /// Attempts delivery for every notification still marked pending.
    pub async fn drain_pending(&self) -> Result<(), RepositoryError> {
        let pending = self.notification_repo.pending_ids().await?;
        for id in pending {
            self.deliver(id).await;
        }

        Ok(())
    }

    #[instrument(name = "NotificationDispatcher::deliver", skip(self))]
    async fn deliver(&self, id: i64) {
        let notification = match self.notification_repo.get_notification(id).await {
            Ok(notification) => notification,
            Err(err) => {
                tracing::error!("Failed to load notification {}: {}", id, err);
                return;
            }
        };

        if notification.status != NotificationStatus::Pending {
            return;
        }

        let recipient = match Email::parse(notification.recipient.as_str()) {
            Ok(recipient) => recipient,
            Err(err) => {
                self.mark_failed(id, &err.to_string()).await;
                return;
            }
        };

        match self
            .notifier
            .notify(&recipient, &notification.subject, &notification.body)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    "Delivered notification {} for {}",
                    id,
                    notification.machine_id
                );
                if let Err(err) = self
                    .notification_repo
                    .mark_sent(id, Utc::now().naive_utc())
                    .await
                {
                    tracing::error!("Failed to mark notification {} as sent: {}", id, err);
                }
            }
            Err(err) => {
                tracing::warn!("Delivery of notification {} failed: {}", id, err);
                self.mark_failed(id, &err.to_string()).await;
            }
        }
    }

    async fn mark_failed(&self, id: i64, reason: &str) {
        if let Err(err) = self.notification_repo.mark_failed(id, reason).await {
            tracing::error!("Failed to mark notification {} as failed: {}", id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{NaiveDate, Weekday};

    use crate::domain::{MachineFilter, MachineId, MachineTracker, NewNotification, NotifyError};
    use crate::repositories::MachineRepositoryImpl;
    use crate::test_util::test_pool;

    use super::*;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            recipient: &Email,
            subject: &str,
            _body: &str,
        ) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), subject.to_string()));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(
            &self,
            _recipient: &Email,
            _subject: &str,
            _body: &str,
        ) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("gmail is down".to_string()))
        }
    }

    fn completion_notification() -> NewNotification {
        NewNotification::completion(
            MachineId::from_number("101"),
            Email::parse("maskinist@verkstad.se").unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(),
        )
    }

    #[tokio::test]
    async fn drain_marks_delivered_notifications_as_sent() {
        let pool = test_pool().await;
        let repo = Arc::new(NotificationRepositoryImpl::new(pool));
        let id = repo.enqueue(&completion_notification()).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(repo.clone(), notifier.clone());
        dispatcher.drain_pending().await.unwrap();

        {
            let sent = notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].0, "maskinist@verkstad.se");
            assert_eq!(sent[0].1, "Machine ID101 Analysis Completed");
        }

        let notification = repo.get_notification(id).await.unwrap();
        assert_eq!(notification.status, NotificationStatus::Sent);
        assert!(notification.delivered_at.is_some());
    }

    #[tokio::test]
    async fn failed_delivery_is_recorded_and_not_retried() {
        let pool = test_pool().await;
        let repo = Arc::new(NotificationRepositoryImpl::new(pool));
        let id = repo.enqueue(&completion_notification()).await.unwrap();

        let dispatcher = NotificationDispatcher::new(repo.clone(), Arc::new(FailingNotifier));
        dispatcher.drain_pending().await.unwrap();

        let notification = repo.get_notification(id).await.unwrap();
        assert_eq!(notification.status, NotificationStatus::Failed);
        assert_eq!(
            notification.error.as_deref(),
            Some("mail transport failed: gmail is down")
        );

        // A later sweep leaves the failed notification alone.
        dispatcher.drain_pending().await.unwrap();
        let notification = repo.get_notification(id).await.unwrap();
        assert_eq!(notification.status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn completion_flows_through_to_the_notifier() {
        let pool = test_pool().await;
        let machine_repo = Arc::new(MachineRepositoryImpl::new(pool.clone()));
        let repo = Arc::new(NotificationRepositoryImpl::new(pool));
        let (tx, mut receiver) = mpsc::channel(16);
        let tracker = MachineTracker::new(
            machine_repo,
            repo.clone(),
            tx,
            Email::parse("maskinist@verkstad.se").unwrap(),
            Weekday::Fri,
        );

        let monday = NaiveDate::from_ymd_opt(2026, 8, 17).unwrap();
        tracker.create("101", monday).await.unwrap();
        tracker
            .complete(&MachineId::from_number("101"), monday)
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(repo, notifier.clone());
        match receiver.try_recv().unwrap() {
            NotificationMessage::Deliver(id) => dispatcher.deliver(id).await,
        }

        {
            let sent = notifier.sent.lock().unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].1, "Machine ID101 Analysis Completed");
        }

        let pending = tracker.list(MachineFilter::Pending, monday).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn already_sent_notifications_are_not_sent_twice() {
        let pool = test_pool().await;
        let repo = Arc::new(NotificationRepositoryImpl::new(pool));
        repo.enqueue(&completion_notification()).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(repo.clone(), notifier.clone());
        dispatcher.drain_pending().await.unwrap();
        dispatcher.drain_pending().await.unwrap();

        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
