//! Waitlist model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::book::BookSummary;

/// A reader's place in line for a book. Consumed by the dispatcher in
/// `(entered_at, id)` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WaitlistEntry {
    pub id: i32,
    pub book_id: i32,
    pub borrower_id: String,
    pub entered_at: DateTime<Utc>,
}

/// Insert payload for a waitlist entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWaitlistEntry {
    pub book_id: i32,
    pub borrower_id: String,
    pub entered_at: DateTime<Utc>,
}

/// Store-level waitlist filter. Results are always FIFO ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitlistFilter {
    pub book_id: Option<i32>,
    pub borrower_id: Option<String>,
    pub limit: Option<i64>,
}

impl WaitlistFilter {
    pub fn for_book(book_id: i32) -> Self {
        Self {
            book_id: Some(book_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &WaitlistEntry) -> bool {
        self.book_id.map_or(true, |b| entry.book_id == b)
            && self
                .borrower_id
                .as_deref()
                .map_or(true, |b| entry.borrower_id == b)
    }
}

/// Reader joins the queue of a book
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct JoinWaitlistCommand {
    pub book_id: i32,
    #[validate(length(min = 1, message = "Borrower is required"))]
    pub borrower_id: String,
}

/// Entry with its 1-based place in the queue of its book
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueuedEntry {
    #[serde(flatten)]
    pub entry: WaitlistEntry,
    pub position: usize,
    pub book: Option<BookSummary>,
}
