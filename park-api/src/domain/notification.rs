use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{Email, MachineId};

/// Delivery state of a queued notification. `Failed` is terminal; failed
/// sends are surfaced through the API rather than retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl From<String> for NotificationStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "Sent" => NotificationStatus::Sent,
            "Failed" => NotificationStatus::Failed,
            _ => NotificationStatus::Pending,
        }
    }
}

/// A queued completion email, persisted before delivery is attempted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub machine_id: MachineId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
    pub delivered_at: Option<NaiveDateTime>,
}

pub struct NewNotification {
    pub machine_id: MachineId,
    pub recipient: Email,
    pub subject: String,
    pub body: String,
}

impl NewNotification {
    /// The completion email for a machine, addressed to the configured
    /// recipient.
    pub fn completion(machine_id: MachineId, recipient: Email, date_completed: NaiveDate) -> Self {
        let subject = format!("Machine {} Analysis Completed", machine_id);
        let body = format!(
            "The analysis for machine {} was marked as completed on {}.",
            machine_id, date_completed
        );

        Self {
            machine_id,
            recipient,
            subject,
            body,
        }
    }
}

/// Messages understood by the notification dispatcher.
#[derive(Debug, Clone)]
pub enum NotificationMessage {
    Deliver(i64),
}
