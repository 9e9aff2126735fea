//! Notifications sent to readers

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A waitlisted book was passed on to the reader as a new request
    WaitlistPromoted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::WaitlistPromoted => "waitlist_promoted",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waitlist_promoted" => Ok(NotificationKind::WaitlistPromoted),
            other => Err(AppError::Validation(format!(
                "Unknown notification kind '{}'",
                other
            ))),
        }
    }
}

/// Stored one-way message to a borrower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: i32,
    pub borrower_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub book_id: Option<i32>,
    pub loan_id: Option<i32>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: i32,
    pub borrower_id: String,
    pub kind: String,
    pub message: String,
    pub book_id: Option<i32>,
    pub loan_id: Option<i32>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: row.id,
            borrower_id: row.borrower_id,
            kind: row.kind.parse()?,
            message: row.message,
            book_id: row.book_id,
            loan_id: row.loan_id,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

/// Insert payload for a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub borrower_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub book_id: Option<i32>,
    pub loan_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Alerts derived from loan state at read time, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LoanOverdue,
    LoanDueSoon,
    RateBook,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReaderAlert {
    pub kind: AlertKind,
    pub loan_id: i32,
    pub book_id: i32,
    pub message: String,
    /// Date the alert is about (due date or return date)
    pub date: DateTime<Utc>,
}
