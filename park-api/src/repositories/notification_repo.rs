use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::{MachineId, NewNotification, Notification, NotificationStatus};

use super::repo_error::RepositoryError;

pub trait NotificationRepository {
    async fn enqueue(&self, notification: &NewNotification) -> Result<i64, RepositoryError>;
    async fn get_notification(&self, id: i64) -> Result<Notification, RepositoryError>;
    async fn list_notifications(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<Notification>, RepositoryError>;
    async fn pending_ids(&self) -> Result<Vec<i64>, RepositoryError>;
    async fn mark_sent(&self, id: i64, delivered_at: NaiveDateTime) -> Result<(), RepositoryError>;
    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), RepositoryError>;
}

pub struct NotificationRepositoryImpl {
    pool: SqlitePool,
}

impl NotificationRepositoryImpl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    machine_id: String,
    recipient: String,
    subject: String,
    body: String,
    status: String,
    error: Option<String>,
    created_at: NaiveDateTime,
    delivered_at: Option<NaiveDateTime>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            machine_id: MachineId::from(row.machine_id),
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            status: NotificationStatus::from(row.status),
            error: row.error,
            created_at: row.created_at,
            delivered_at: row.delivered_at,
        }
    }
}

impl NotificationRepository for NotificationRepositoryImpl {
    async fn enqueue(&self, notification: &NewNotification) -> Result<i64, RepositoryError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO notifications (machine_id, recipient, subject, body, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(notification.machine_id.as_str())
        .bind(notification.recipient.as_ref())
        .bind(&notification.subject)
        .bind(&notification.body)
        .bind(Utc::now().naive_utc())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_notification(&self, id: i64) -> Result<Notification, RepositoryError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, machine_id, recipient, subject, body, status, error,
                   created_at, delivered_at
            FROM notifications
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        Ok(row.into())
    }

    /// Most recent notifications first, optionally filtered by status.
    async fn list_notifications(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, NotificationRow>(
                    r#"
                    SELECT id, machine_id, recipient, subject, body, status, error,
                           created_at, delivered_at
                    FROM notifications
                    WHERE status = ?
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(status.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, NotificationRow>(
                    r#"
                    SELECT id, machine_id, recipient, subject, body, status, error,
                           created_at, delivered_at
                    FROM notifications
                    ORDER BY id DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn pending_ids(&self) -> Result<Vec<i64>, RepositoryError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM notifications
            WHERE status = 'Pending'
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn mark_sent(&self, id: i64, delivered_at: NaiveDateTime) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'Sent', delivered_at = ?, error = NULL
            WHERE id = ?
            "#,
        )
        .bind(delivered_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'Failed', error = ?
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
