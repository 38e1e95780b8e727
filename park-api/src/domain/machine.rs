use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::PeriodKey;

/// Identifier of a tracked machine: the operator-supplied number with an
/// `ID` prefix, assigned at creation and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    pub fn from_number(number: &str) -> Self {
        Self(format!("ID{}", number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MachineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single machine's tracked analysis status within one period.
///
/// Invariant: `completed` is true exactly when `date_completed` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRecord {
    pub machine_id: MachineId,
    pub period: PeriodKey,
    pub date_added: NaiveDate,
    pub date_completed: Option<NaiveDate>,
    pub completed: bool,
}

impl MachineRecord {
    pub fn new(machine_id: MachineId, period: PeriodKey, date_added: NaiveDate) -> Self {
        Self {
            machine_id,
            period,
            date_added,
            date_completed: None,
            completed: false,
        }
    }
}

/// Listing scope for the active record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MachineFilter {
    All,
    Pending,
}

/// Outcome of a boundary-day rollover: which period was archived, which
/// period the pending records were carried into, and how many of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloverResult {
    pub period: PeriodKey,
    pub next_period: PeriodKey,
    pub archived: u64,
    pub carried: u64,
}

/// A performed rollover, as recorded in the audit log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollover {
    pub period: PeriodKey,
    pub performed_at: NaiveDateTime,
    pub archived: u64,
    pub carried: u64,
}
