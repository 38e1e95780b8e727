use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::repositories::{
    MachineRepository, MachineRepositoryImpl, NotificationRepository, NotificationRepositoryImpl,
    RepositoryError,
};

use super::{
    Email, MachineFilter, MachineId, MachineRecord, NewNotification, NotificationMessage,
    PeriodKey, RolloverResult,
};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("machine '{0}' already exists in the current period")]
    DuplicateMachine(MachineId),
    #[error("machine '{0}' not found in the current period")]
    MachineNotFound(MachineId),
    #[error("'{0}' is not a valid machine number")]
    InvalidMachineNumber(String),
    #[error("failed to serialize export: {0}")]
    Export(String),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

/// Weekly status tracking for machine analysis jobs.
///
/// All operations run against the active period's record set. Every call
/// first gives a due rollover the chance to run, so the store is in the
/// right period before it is read or written. On the boundary day this
/// means the rollover happens ahead of the operation itself.
pub struct MachineTracker {
    machine_repo: Arc<MachineRepositoryImpl>,
    notification_repo: Arc<NotificationRepositoryImpl>,
    notification_tx: mpsc::Sender<NotificationMessage>,
    recipient: Email,
    rollover_weekday: Weekday,
}

impl MachineTracker {
    pub fn new(
        machine_repo: Arc<MachineRepositoryImpl>,
        notification_repo: Arc<NotificationRepositoryImpl>,
        notification_tx: mpsc::Sender<NotificationMessage>,
        recipient: Email,
        rollover_weekday: Weekday,
    ) -> Self {
        Self {
            machine_repo,
            notification_repo,
            notification_tx,
            recipient,
            rollover_weekday,
        }
    }

    /// Registers a new machine under the active period.
    #[instrument(name = "MachineTracker::create", skip(self))]
    pub async fn create(
        &self,
        machine_number: &str,
        today: NaiveDate,
    ) -> Result<MachineRecord, TrackerError> {
        let number = machine_number.trim();
        if number.is_empty() {
            return Err(TrackerError::InvalidMachineNumber(
                machine_number.to_string(),
            ));
        }

        self.rollover_if_due(today).await?;
        let period = self.machine_repo.ensure_active_period(today).await?;

        let record = MachineRecord::new(MachineId::from_number(number), period, today);
        match self.machine_repo.insert(&record).await {
            Ok(()) => Ok(record),
            Err(RepositoryError::Duplicate(_)) => {
                Err(TrackerError::DuplicateMachine(record.machine_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Snapshot of the active period's records in insertion order.
    pub async fn list(
        &self,
        filter: MachineFilter,
        today: NaiveDate,
    ) -> Result<Vec<MachineRecord>, TrackerError> {
        self.rollover_if_due(today).await?;
        let period = self.machine_repo.ensure_active_period(today).await?;

        Ok(self.machine_repo.list(period, filter).await?)
    }

    /// Marks a machine's analysis as completed and queues the notification
    /// email. Completing an already completed machine is a no-op: the
    /// original completion date stands and no second email is queued.
    #[instrument(name = "MachineTracker::complete", skip(self))]
    pub async fn complete(
        &self,
        machine_id: &MachineId,
        today: NaiveDate,
    ) -> Result<MachineRecord, TrackerError> {
        self.rollover_if_due(today).await?;
        let period = self.machine_repo.ensure_active_period(today).await?;

        let existing = match self.machine_repo.get(machine_id, period).await {
            Ok(record) => record,
            Err(RepositoryError::NotFound(_)) => {
                return Err(TrackerError::MachineNotFound(machine_id.clone()))
            }
            Err(err) => return Err(err.into()),
        };
        if existing.completed {
            return Ok(existing);
        }

        let record = self.machine_repo.complete(machine_id, period, today).await?;

        let notification =
            NewNotification::completion(record.machine_id.clone(), self.recipient.clone(), today);
        let notification_id = self.notification_repo.enqueue(&notification).await?;
        // The dispatcher also sweeps the outbox on an interval, so a full
        // channel only delays the email.
        if let Err(err) = self
            .notification_tx
            .try_send(NotificationMessage::Deliver(notification_id))
        {
            tracing::warn!(
                "Failed to hand notification {} to the dispatcher: {}",
                notification_id,
                err
            );
        }

        Ok(record)
    }

    /// Full record set of a period as delimited text: the active store for
    /// the current period, the archive for already rolled-over ones. With no
    /// explicit period the active one is exported.
    pub async fn export(
        &self,
        period: Option<PeriodKey>,
        today: NaiveDate,
    ) -> Result<String, TrackerError> {
        self.rollover_if_due(today).await?;

        let period = match period {
            Some(period) => period,
            None => self.machine_repo.ensure_active_period(today).await?,
        };

        let mut records = self.machine_repo.list(period, MachineFilter::All).await?;
        records.extend(self.machine_repo.archived(period).await?);

        to_delimited(&records)
    }

    /// Runs the weekly rollover if `today` is the boundary day and it has
    /// not already run for today's period. Completed records are archived
    /// under today's period, pending ones carried into the following week.
    #[instrument(name = "MachineTracker::rollover_if_due", skip(self))]
    pub async fn rollover_if_due(
        &self,
        today: NaiveDate,
    ) -> Result<Option<RolloverResult>, TrackerError> {
        if today.weekday() != self.rollover_weekday {
            return Ok(None);
        }

        self.machine_repo.ensure_active_period(today).await?;

        let period = PeriodKey::from_date(today);
        let next_period = PeriodKey::following(today);
        let result = self
            .machine_repo
            .rollover(period, next_period, Utc::now().naive_utc())
            .await?;

        if let Some(result) = &result {
            tracing::info!(
                "Rolled over {}: {} archived, {} carried into {}",
                result.period,
                result.archived,
                result.carried,
                result.next_period
            );
        }

        Ok(result)
    }
}

fn to_delimited(records: &[MachineRecord]) -> Result<String, TrackerError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "machine_id",
            "week",
            "year",
            "date_added",
            "date_completed",
            "completed",
        ])
        .map_err(|err| TrackerError::Export(err.to_string()))?;

    for record in records {
        let row = [
            record.machine_id.to_string(),
            record.period.week.to_string(),
            record.period.year.to_string(),
            record.date_added.to_string(),
            record
                .date_completed
                .map(|date| date.to_string())
                .unwrap_or_default(),
            record.completed.to_string(),
        ];
        writer
            .write_record(&row)
            .map_err(|err| TrackerError::Export(err.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| TrackerError::Export(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| TrackerError::Export(err.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::domain::NotificationStatus;
    use crate::test_util::test_pool;

    use super::*;

    // 2026-08-17 through 2026-08-21 is Monday through Friday of 2026-W34.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 17).unwrap()
    }

    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 18).unwrap()
    }

    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 21).unwrap()
    }

    struct TestTracker {
        tracker: MachineTracker,
        machine_repo: Arc<MachineRepositoryImpl>,
        notification_repo: Arc<NotificationRepositoryImpl>,
        receiver: mpsc::Receiver<NotificationMessage>,
    }

    async fn test_tracker() -> TestTracker {
        let pool = test_pool().await;
        let machine_repo = Arc::new(MachineRepositoryImpl::new(pool.clone()));
        let notification_repo = Arc::new(NotificationRepositoryImpl::new(pool));
        let (notification_tx, receiver) = mpsc::channel(16);

        let tracker = MachineTracker::new(
            machine_repo.clone(),
            notification_repo.clone(),
            notification_tx,
            Email::parse("maskinist@verkstad.se").unwrap(),
            Weekday::Fri,
        );

        TestTracker {
            tracker,
            machine_repo,
            notification_repo,
            receiver,
        }
    }

    fn machine_ids(records: &[MachineRecord]) -> Vec<&str> {
        records.iter().map(|r| r.machine_id.as_str()).collect()
    }

    #[tokio::test]
    async fn create_prefixes_the_machine_number() {
        let t = test_tracker().await;

        let record = t.tracker.create("101", monday()).await.unwrap();

        assert_eq!(record.machine_id.as_str(), "ID101");
        assert_eq!(record.period, PeriodKey::new(2026, 34));
        assert_eq!(record.date_added, monday());
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_numbers() {
        let t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();

        let err = t.tracker.create("101", tuesday()).await.unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateMachine(_)));

        let records = t.tracker.list(MachineFilter::All, tuesday()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date_added, monday());
    }

    #[tokio::test]
    async fn create_rejects_empty_numbers() {
        let t = test_tracker().await;

        let err = t.tracker.create("  ", monday()).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidMachineNumber(_)));
    }

    #[tokio::test]
    async fn complete_fails_for_unknown_machines() {
        let t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();

        let err = t
            .tracker
            .complete(&MachineId::from_number("999"), tuesday())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::MachineNotFound(_)));

        let pending = t
            .tracker
            .list(MachineFilter::Pending, tuesday())
            .await
            .unwrap();
        assert_eq!(machine_ids(&pending), ["ID101"]);
    }

    #[tokio::test]
    async fn complete_stamps_the_record_and_queues_one_notification() {
        let mut t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();

        let record = t
            .tracker
            .complete(&MachineId::from_number("101"), tuesday())
            .await
            .unwrap();
        assert!(record.completed);
        assert_eq!(record.date_completed, Some(tuesday()));

        let pending = t
            .tracker
            .list(MachineFilter::Pending, tuesday())
            .await
            .unwrap();
        assert!(pending.is_empty());
        let all = t.tracker.list(MachineFilter::All, tuesday()).await.unwrap();
        assert_eq!(machine_ids(&all), ["ID101"]);
        assert!(all[0].completed);

        let notifications = t.notification_repo.list_notifications(None, 50).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(
            notifications[0].subject,
            "Machine ID101 Analysis Completed"
        );
        assert_eq!(notifications[0].status, NotificationStatus::Pending);

        let message = t.receiver.try_recv().unwrap();
        assert!(matches!(message, NotificationMessage::Deliver(id) if id == notifications[0].id));
    }

    #[tokio::test]
    async fn completing_twice_is_a_no_op() {
        let t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();

        let first = t
            .tracker
            .complete(&MachineId::from_number("101"), tuesday())
            .await
            .unwrap();
        let wednesday = NaiveDate::from_ymd_opt(2026, 8, 19).unwrap();
        let second = t
            .tracker
            .complete(&MachineId::from_number("101"), wednesday)
            .await
            .unwrap();

        assert_eq!(first.date_completed, Some(tuesday()));
        assert_eq!(second.date_completed, first.date_completed);

        let notifications = t.notification_repo.list_notifications(None, 50).await.unwrap();
        assert_eq!(notifications.len(), 1);
    }

    #[tokio::test]
    async fn list_returns_records_in_insertion_order() {
        let t = test_tracker().await;
        t.tracker.create("103", monday()).await.unwrap();
        t.tracker.create("101", monday()).await.unwrap();
        t.tracker.create("102", tuesday()).await.unwrap();

        let all = t.tracker.list(MachineFilter::All, tuesday()).await.unwrap();
        assert_eq!(machine_ids(&all), ["ID103", "ID101", "ID102"]);
    }

    #[tokio::test]
    async fn rollover_is_skipped_off_the_boundary_day() {
        let t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();
        t.tracker
            .complete(&MachineId::from_number("101"), monday())
            .await
            .unwrap();

        let result = t.tracker.rollover_if_due(tuesday()).await.unwrap();
        assert!(result.is_none());

        let all = t.tracker.list(MachineFilter::All, tuesday()).await.unwrap();
        assert_eq!(all.len(), 1);
        let archived = t
            .machine_repo
            .archived(PeriodKey::new(2026, 34))
            .await
            .unwrap();
        assert!(archived.is_empty());
    }

    #[tokio::test]
    async fn rollover_archives_completed_and_carries_pending() {
        let t = test_tracker().await;
        for number in ["101", "102", "103", "104", "105"] {
            t.tracker.create(number, monday()).await.unwrap();
        }
        t.tracker
            .complete(&MachineId::from_number("101"), tuesday())
            .await
            .unwrap();
        t.tracker
            .complete(&MachineId::from_number("102"), tuesday())
            .await
            .unwrap();

        let result = t.tracker.rollover_if_due(friday()).await.unwrap().unwrap();
        assert_eq!(result.period, PeriodKey::new(2026, 34));
        assert_eq!(result.next_period, PeriodKey::new(2026, 35));
        assert_eq!(result.archived, 2);
        assert_eq!(result.carried, 3);

        let archived = t
            .machine_repo
            .archived(PeriodKey::new(2026, 34))
            .await
            .unwrap();
        assert_eq!(machine_ids(&archived), ["ID101", "ID102"]);
        assert!(archived.iter().all(|r| r.completed));

        let carried = t.tracker.list(MachineFilter::All, friday()).await.unwrap();
        assert_eq!(machine_ids(&carried), ["ID103", "ID104", "ID105"]);
        assert!(carried.iter().all(|r| !r.completed));
        assert!(carried
            .iter()
            .all(|r| r.period == PeriodKey::new(2026, 35)));

        // Repeated boundary-day access does not archive twice.
        let again = t.tracker.rollover_if_due(friday()).await.unwrap();
        assert!(again.is_none());
        let archived = t
            .machine_repo
            .archived(PeriodKey::new(2026, 34))
            .await
            .unwrap();
        assert_eq!(archived.len(), 2);
    }

    #[tokio::test]
    async fn rollover_leaves_existing_next_period_records_alone() {
        let t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();
        t.tracker.create("102", monday()).await.unwrap();
        t.tracker
            .complete(&MachineId::from_number("102"), tuesday())
            .await
            .unwrap();

        // A record already filed under the following week.
        let seeded = MachineRecord::new(
            MachineId::from_number("300"),
            PeriodKey::new(2026, 35),
            tuesday(),
        );
        t.machine_repo.insert(&seeded).await.unwrap();

        let result = t.tracker.rollover_if_due(friday()).await.unwrap().unwrap();
        assert_eq!(result.archived, 1);
        assert_eq!(result.carried, 1);

        let next = t.tracker.list(MachineFilter::All, friday()).await.unwrap();
        assert_eq!(machine_ids(&next), ["ID101", "ID300"]);
    }

    #[tokio::test]
    async fn carry_skips_ids_already_present_in_the_next_period() {
        let t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();

        let seeded = MachineRecord::new(
            MachineId::from_number("101"),
            PeriodKey::new(2026, 35),
            tuesday(),
        );
        t.machine_repo.insert(&seeded).await.unwrap();

        let result = t.tracker.rollover_if_due(friday()).await.unwrap().unwrap();
        assert_eq!(result.archived, 0);
        assert_eq!(result.carried, 0);

        let next = t.tracker.list(MachineFilter::All, friday()).await.unwrap();
        assert_eq!(machine_ids(&next), ["ID101"]);
        assert_eq!(next[0].date_added, tuesday());
    }

    #[tokio::test]
    async fn missed_boundary_rolls_over_on_the_next_one() {
        let t = test_tracker().await;
        t.tracker.create("101", monday()).await.unwrap();
        t.tracker.create("102", monday()).await.unwrap();
        t.tracker
            .complete(&MachineId::from_number("101"), tuesday())
            .await
            .unwrap();

        // Nobody touched the tracker on the 21st; the next access is the
        // following Friday, in week 35.
        let next_friday = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let result = t
            .tracker
            .rollover_if_due(next_friday)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.period, PeriodKey::new(2026, 35));
        assert_eq!(result.next_period, PeriodKey::new(2026, 36));
        assert_eq!(result.archived, 1);
        assert_eq!(result.carried, 1);

        let carried = t
            .tracker
            .list(MachineFilter::All, next_friday)
            .await
            .unwrap();
        assert_eq!(machine_ids(&carried), ["ID102"]);
        assert_eq!(carried[0].period, PeriodKey::new(2026, 36));
    }

    #[tokio::test]
    async fn boundary_day_operations_run_the_rollover_first() {
        let t = test_tracker().await;

        // First access ever happens on a Friday: the (empty) rollover runs
        // before the create, so the new record lands in the next period.
        let record = t.tracker.create("101", friday()).await.unwrap();
        assert_eq!(record.period, PeriodKey::new(2026, 35));

        let rollovers = t.machine_repo.list_rollovers().await.unwrap();
        assert_eq!(rollovers.len(), 1);
        assert_eq!(rollovers[0].period, PeriodKey::new(2026, 34));
        assert_eq!(rollovers[0].archived, 0);
        assert_eq!(rollovers[0].carried, 0);
    }

    #[tokio::test]
    async fn export_covers_both_archive_and_active_store() {
        let t = test_tracker().await;
        for number in ["101", "102", "103"] {
            t.tracker.create(number, monday()).await.unwrap();
        }
        t.tracker
            .complete(&MachineId::from_number("101"), tuesday())
            .await
            .unwrap();
        t.tracker.rollover_if_due(friday()).await.unwrap();

        let archived_csv = t
            .tracker
            .export(Some(PeriodKey::new(2026, 34)), friday())
            .await
            .unwrap();
        let lines: Vec<&str> = archived_csv.lines().collect();
        assert_eq!(
            lines[0],
            "machine_id,week,year,date_added,date_completed,completed"
        );
        assert_eq!(lines[1], "ID101,34,2026,2026-08-17,2026-08-18,true");
        assert_eq!(lines.len(), 2);

        let active_csv = t
            .tracker
            .export(Some(PeriodKey::new(2026, 35)), friday())
            .await
            .unwrap();
        let lines: Vec<&str> = active_csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("ID102,35,2026,2026-08-17,,false"));
        assert!(lines[2].starts_with("ID103,35,2026,2026-08-17,,false"));

        // No explicit period means the active one.
        let default_csv = t.tracker.export(None, friday()).await.unwrap();
        assert_eq!(default_csv, active_csv);
    }
}
