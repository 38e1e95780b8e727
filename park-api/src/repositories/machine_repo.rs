use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::domain::{MachineFilter, MachineId, MachineRecord, PeriodKey, Rollover, RolloverResult};

use super::repo_error::{is_unique_violation, RepositoryError};

pub trait MachineRepository {
    async fn ensure_active_period(&self, today: NaiveDate) -> Result<PeriodKey, RepositoryError>;
    async fn insert(&self, record: &MachineRecord) -> Result<(), RepositoryError>;
    async fn get(
        &self,
        machine_id: &MachineId,
        period: PeriodKey,
    ) -> Result<MachineRecord, RepositoryError>;
    async fn list(
        &self,
        period: PeriodKey,
        filter: MachineFilter,
    ) -> Result<Vec<MachineRecord>, RepositoryError>;
    async fn complete(
        &self,
        machine_id: &MachineId,
        period: PeriodKey,
        date_completed: NaiveDate,
    ) -> Result<MachineRecord, RepositoryError>;
    async fn archived(&self, period: PeriodKey) -> Result<Vec<MachineRecord>, RepositoryError>;
    async fn rollover(
        &self,
        period: PeriodKey,
        next_period: PeriodKey,
        performed_at: NaiveDateTime,
    ) -> Result<Option<RolloverResult>, RepositoryError>;
    async fn list_rollovers(&self) -> Result<Vec<Rollover>, RepositoryError>;
}

pub struct MachineRepositoryImpl {
    pool: SqlitePool,
}

impl MachineRepositoryImpl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MachineRow {
    machine_id: String,
    week: i64,
    year: i64,
    date_added: NaiveDate,
    date_completed: Option<NaiveDate>,
    completed: bool,
}

impl From<MachineRow> for MachineRecord {
    fn from(row: MachineRow) -> Self {
        Self {
            machine_id: MachineId::from(row.machine_id),
            period: PeriodKey::new(row.year as i32, row.week as u32),
            date_added: row.date_added,
            date_completed: row.date_completed,
            completed: row.completed,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RolloverRow {
    week: i64,
    year: i64,
    performed_at: NaiveDateTime,
    archived_count: i64,
    carried_count: i64,
}

impl From<RolloverRow> for Rollover {
    fn from(row: RolloverRow) -> Self {
        Self {
            period: PeriodKey::new(row.year as i32, row.week as u32),
            performed_at: row.performed_at,
            archived: row.archived_count as u64,
            carried: row.carried_count as u64,
        }
    }
}

impl MachineRepository for MachineRepositoryImpl {
    /// Returns the period the active store belongs to, initializing the
    /// pointer on first access. The pointer only moves forward through
    /// rollovers, never by the calendar alone.
    async fn ensure_active_period(&self, today: NaiveDate) -> Result<PeriodKey, RepositoryError> {
        let current = PeriodKey::from_date(today);
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO active_period (id, week, year)
            VALUES (1, ?, ?)
            "#,
        )
        .bind(current.week as i64)
        .bind(current.year as i64)
        .execute(&self.pool)
        .await?;

        let (week, year): (i64, i64) = sqlx::query_as(
            r#"
            SELECT week, year
            FROM active_period
            WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PeriodKey::new(year as i32, week as u32))
    }

    async fn insert(&self, record: &MachineRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO machines (machine_id, week, year, date_added, date_completed, completed)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.machine_id.as_str())
        .bind(record.period.week as i64)
        .bind(record.period.year as i64)
        .bind(record.date_added)
        .bind(record.date_completed)
        .bind(record.completed)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                RepositoryError::Duplicate(record.machine_id.to_string())
            } else {
                err.into()
            }
        })?;

        Ok(())
    }

    async fn get(
        &self,
        machine_id: &MachineId,
        period: PeriodKey,
    ) -> Result<MachineRecord, RepositoryError> {
        let row = sqlx::query_as::<_, MachineRow>(
            r#"
            SELECT machine_id, week, year, date_added, date_completed, completed
            FROM machines
            WHERE machine_id = ? AND week = ? AND year = ?
            "#,
        )
        .bind(machine_id.as_str())
        .bind(period.week as i64)
        .bind(period.year as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(machine_id.to_string()))?;

        Ok(row.into())
    }

    async fn list(
        &self,
        period: PeriodKey,
        filter: MachineFilter,
    ) -> Result<Vec<MachineRecord>, RepositoryError> {
        let query = match filter {
            MachineFilter::All => {
                r#"
                SELECT machine_id, week, year, date_added, date_completed, completed
                FROM machines
                WHERE week = ? AND year = ?
                ORDER BY rowid
                "#
            }
            MachineFilter::Pending => {
                r#"
                SELECT machine_id, week, year, date_added, date_completed, completed
                FROM machines
                WHERE week = ? AND year = ? AND completed = 0
                ORDER BY rowid
                "#
            }
        };

        let rows = sqlx::query_as::<_, MachineRow>(query)
            .bind(period.week as i64)
            .bind(period.year as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(MachineRecord::from).collect())
    }

    async fn complete(
        &self,
        machine_id: &MachineId,
        period: PeriodKey,
        date_completed: NaiveDate,
    ) -> Result<MachineRecord, RepositoryError> {
        let row = sqlx::query_as::<_, MachineRow>(
            r#"
            UPDATE machines
            SET completed = 1, date_completed = ?
            WHERE machine_id = ? AND week = ? AND year = ?
            RETURNING machine_id, week, year, date_added, date_completed, completed
            "#,
        )
        .bind(date_completed)
        .bind(machine_id.as_str())
        .bind(period.week as i64)
        .bind(period.year as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(machine_id.to_string()))?;

        Ok(row.into())
    }

    async fn archived(&self, period: PeriodKey) -> Result<Vec<MachineRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, MachineRow>(
            r#"
            SELECT machine_id, week, year, date_added, date_completed, completed
            FROM machine_archive
            WHERE week = ? AND year = ?
            ORDER BY rowid
            "#,
        )
        .bind(period.week as i64)
        .bind(period.year as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(MachineRecord::from).collect())
    }

    /// Performs the rollover for `period` in one transaction, or returns
    /// `None` if it was already performed.
    async fn rollover(
        &self,
        period: PeriodKey,
        next_period: PeriodKey,
        performed_at: NaiveDateTime,
    ) -> Result<Option<RolloverResult>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let already_done: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM rollovers WHERE week = ? AND year = ?")
                .bind(period.week as i64)
                .bind(period.year as i64)
                .fetch_optional(&mut *tx)
                .await?;
        if already_done.is_some() {
            return Ok(None);
        }

        // Archive completed records under the boundary period. The archive
        // is write-once; OR IGNORE leaves existing rows untouched.
        let archived = sqlx::query(
            r#"
            INSERT OR IGNORE INTO machine_archive
                (machine_id, week, year, date_added, date_completed, completed, archived_at)
            SELECT machine_id, ?, ?, date_added, date_completed, completed, ?
            FROM machines
            WHERE completed = 1
            ORDER BY rowid
            "#,
        )
        .bind(period.week as i64)
        .bind(period.year as i64)
        .bind(performed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM machines WHERE completed = 1")
            .execute(&mut *tx)
            .await?;

        // Carry pending records forward in place so they keep their
        // insertion order. An id already filed under the next period wins
        // the collision; the stale row is swept out below.
        let carried = sqlx::query(
            r#"
            UPDATE OR IGNORE machines
            SET week = ?, year = ?
            WHERE week != ? OR year != ?
            "#,
        )
        .bind(next_period.week as i64)
        .bind(next_period.year as i64)
        .bind(next_period.week as i64)
        .bind(next_period.year as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM machines WHERE week != ? OR year != ?")
            .bind(next_period.week as i64)
            .bind(next_period.year as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE active_period SET week = ?, year = ? WHERE id = 1")
            .bind(next_period.week as i64)
            .bind(next_period.year as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO rollovers (week, year, performed_at, archived_count, carried_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(period.week as i64)
        .bind(period.year as i64)
        .bind(performed_at)
        .bind(archived as i64)
        .bind(carried as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(RolloverResult {
            period,
            next_period,
            archived,
            carried,
        }))
    }

    async fn list_rollovers(&self) -> Result<Vec<Rollover>, RepositoryError> {
        let rows = sqlx::query_as::<_, RolloverRow>(
            r#"
            SELECT week, year, performed_at, archived_count, carried_count
            FROM rollovers
            ORDER BY year, week
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Rollover::from).collect())
    }
}
