//! Loan model, its status state machine and the lifecycle commands

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::book::BookSummary;
use crate::error::{AppError, AppResult};

/// Loan status.
///
/// `requested -> approved -> returned` is the main path, `requested -> rejected`
/// the alternate one. `rejected` and `returned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Requested,
    Approved,
    Rejected,
    Returned,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 4] = [
        LoanStatus::Requested,
        LoanStatus::Approved,
        LoanStatus::Rejected,
        LoanStatus::Returned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Requested => "requested",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Returned => "returned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Returned)
    }

    /// Validate a transition, returning the new status
    pub fn transition(self, next: LoanStatus) -> AppResult<LoanStatus> {
        let legal = matches!(
            (self, next),
            (LoanStatus::Requested, LoanStatus::Approved)
                | (LoanStatus::Requested, LoanStatus::Rejected)
                | (LoanStatus::Approved, LoanStatus::Returned)
        );
        if legal {
            Ok(next)
        } else {
            Err(AppError::InvalidState(format!(
                "Cannot move a {} loan to {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(LoanStatus::Requested),
            "approved" => Ok(LoanStatus::Approved),
            "rejected" => Ok(LoanStatus::Rejected),
            "returned" => Ok(LoanStatus::Returned),
            other => Err(AppError::Validation(format!("Unknown loan status '{}'", other))),
        }
    }
}

/// One borrowing transaction. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub borrower_id: String,
    pub requested_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Return time for `returned`, decision time for `rejected`. Metadata only:
    /// the status is authoritative.
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    /// Staff member who last actioned the loan
    pub actioned_by: Option<String>,
    /// Set when the waitlist passed a freed copy through to this loan
    pub copy_reserved: bool,
}

impl Loan {
    /// Requested, or approved and not yet returned
    pub fn is_open(&self) -> bool {
        matches!(self.status, LoanStatus::Requested | LoanStatus::Approved)
            && self.returned_at.is_none()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Approved && self.returned_at.is_none() && now > self.due_date
    }
}

/// Loan row as stored in PostgreSQL
#[derive(Debug, Clone, FromRow)]
pub struct LoanRow {
    pub id: i32,
    pub book_id: i32,
    pub borrower_id: String,
    pub requested_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: String,
    pub actioned_by: Option<String>,
    pub copy_reserved: bool,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Loan {
            id: row.id,
            book_id: row.book_id,
            borrower_id: row.borrower_id,
            requested_at: row.requested_at,
            due_date: row.due_date,
            returned_at: row.returned_at,
            status: row.status.parse()?,
            actioned_by: row.actioned_by,
            copy_reserved: row.copy_reserved,
        })
    }
}

/// Insert payload for a loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub book_id: i32,
    pub borrower_id: String,
    pub requested_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub actioned_by: Option<String>,
    pub copy_reserved: bool,
}

/// Partial update of a loan; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanPatch {
    pub status: Option<LoanStatus>,
    pub returned_at: Option<DateTime<Utc>>,
    pub actioned_by: Option<String>,
}

/// Store-level loan filter. Results are ordered newest request first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub borrower_id: Option<String>,
    pub book_id: Option<i32>,
    /// Empty means any status
    pub statuses: Vec<LoanStatus>,
    /// Only loans with no return timestamp
    pub unreturned: bool,
    /// Only loans due strictly before this instant
    pub due_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl LoanFilter {
    /// Open loans of one borrower
    pub fn open_for(borrower_id: &str) -> Self {
        Self {
            borrower_id: Some(borrower_id.to_string()),
            statuses: vec![LoanStatus::Requested, LoanStatus::Approved],
            unreturned: true,
            ..Default::default()
        }
    }

    /// Approved, unreturned loans whose due date has passed at `now`
    pub fn overdue_at(now: DateTime<Utc>) -> Self {
        Self {
            statuses: vec![LoanStatus::Approved],
            unreturned: true,
            due_before: Some(now),
            ..Default::default()
        }
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        self.borrower_id
            .as_deref()
            .map_or(true, |b| loan.borrower_id == b)
            && self.book_id.map_or(true, |b| loan.book_id == b)
            && (self.statuses.is_empty() || self.statuses.contains(&loan.status))
            && (!self.unreturned || loan.returned_at.is_none())
            && self.due_before.map_or(true, |t| loan.due_date < t)
    }
}

/// Loan with book details and the derived overdue flag
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    /// Absent when the details read fell back to plain loan rows
    pub book: Option<BookSummary>,
    pub is_overdue: bool,
}

impl LoanDetails {
    pub fn new(loan: Loan, book: Option<BookSummary>, now: DateTime<Utc>) -> Self {
        let is_overdue = loan.is_overdue(now);
        Self {
            loan,
            book,
            is_overdue,
        }
    }
}

/// Reader asks to borrow a book
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RequestLoanCommand {
    #[validate(length(min = 1, message = "Borrower is required"))]
    pub borrower_id: String,
    pub book_id: i32,
    pub duration_days: i64,
}

/// Librarian approves a requested loan
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ApproveCommand {
    pub loan_id: i32,
    #[validate(length(min = 1, message = "Acting staff is required"))]
    pub acting_staff: String,
    /// Let stock go below zero
    #[serde(default)]
    pub force: bool,
}

/// Librarian rejects a requested loan
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RejectCommand {
    pub loan_id: i32,
    #[validate(length(min = 1, message = "Acting staff is required"))]
    pub acting_staff: String,
}

/// Librarian receives a returned copy
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReturnCommand {
    pub loan_id: i32,
    #[validate(length(min = 1, message = "Acting staff is required"))]
    pub acting_staff: String,
}

/// Librarian lends a book directly, bypassing the request step
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ManualLoanCommand {
    pub book_id: i32,
    #[validate(length(min = 1, message = "Borrower is required"))]
    pub borrower_id: String,
    pub duration_days: i64,
    #[validate(length(min = 1, message = "Acting staff is required"))]
    pub acting_staff: String,
    /// Let stock go below zero
    #[serde(default)]
    pub force: bool,
}

/// Listing filter exposed to callers. `status` also accepts the derived `overdue`.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub status: Option<String>,
    pub borrower_id: Option<String>,
    pub book_id: Option<i32>,
    /// Page number (1-based)
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
