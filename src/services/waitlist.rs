//! Waitlist: joining and leaving queues, and the dispatcher that hands a freed
//! copy to the next reader in line.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookSummary,
        loan::{Loan, LoanFilter, LoanStatus, NewLoan},
        notification::{NewNotification, Notification, NotificationKind},
        waitlist::{JoinWaitlistCommand, NewWaitlistEntry, QueuedEntry, WaitlistEntry, WaitlistFilter},
        Book,
    },
    repository::{Store, StoreTx},
    services::stock,
};

/// What happened to a freed copy. Exactly one branch per freed copy.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The copy went to the next eligible reader as a new requested loan
    Reassigned {
        loan: Loan,
        entry: WaitlistEntry,
        notification: Notification,
    },
    /// Nobody eligible was waiting; the copy went back on the shelf.
    /// `available` is `None` when the ledger was already at total.
    Restocked { available: Option<i32> },
}

/// Hands freed copies to waitlisted readers
#[derive(Debug, Clone)]
pub struct WaitlistDispatcher {
    loan_days: i64,
}

impl WaitlistDispatcher {
    pub fn new(loan_days: i64) -> Self {
        Self { loan_days }
    }

    /// Route one freed copy of `book`. Runs inside the caller's unit of work so the
    /// copy is never visible as neither reserved nor available.
    pub async fn dispatch(
        &self,
        tx: &mut dyn StoreTx,
        book: &Book,
        now: DateTime<Utc>,
    ) -> AppResult<DispatchOutcome> {
        let queue = tx
            .find_waitlist_entries(&WaitlistFilter::for_book(book.id))
            .await?;

        for entry in queue {
            if tx
                .count_loans(&LoanFilter::open_for(&entry.borrower_id))
                .await?
                > 0
            {
                tracing::debug!(
                    book_id = book.id,
                    borrower_id = %entry.borrower_id,
                    "Skipping waitlisted reader with an open loan"
                );
                continue;
            }
            return self.promote(tx, book, entry, now).await;
        }

        let available = stock::restock(tx, book).await?;
        tracing::info!(book_id = book.id, ?available, "Returned copy restocked");
        Ok(DispatchOutcome::Restocked { available })
    }

    async fn promote(
        &self,
        tx: &mut dyn StoreTx,
        book: &Book,
        entry: WaitlistEntry,
        now: DateTime<Utc>,
    ) -> AppResult<DispatchOutcome> {
        let loan = tx
            .insert_loan(&NewLoan {
                book_id: book.id,
                borrower_id: entry.borrower_id.clone(),
                requested_at: now,
                due_date: now + Duration::days(self.loan_days),
                status: LoanStatus::Requested,
                actioned_by: None,
                copy_reserved: true,
            })
            .await?;

        if !tx.delete_waitlist_entry(entry.id).await? {
            return Err(AppError::NotFound(format!(
                "Waitlist entry {} vanished during dispatch",
                entry.id
            )));
        }

        let notification = tx
            .insert_notification(&NewNotification {
                borrower_id: entry.borrower_id.clone(),
                kind: NotificationKind::WaitlistPromoted,
                message: format!(
                    "\"{}\" is back and a loan request was created for you automatically.",
                    book.title
                ),
                book_id: Some(book.id),
                loan_id: Some(loan.id),
                created_at: now,
            })
            .await?;

        tracing::info!(
            book_id = book.id,
            loan_id = loan.id,
            borrower_id = %entry.borrower_id,
            "Returned copy passed to next reader in line"
        );

        Ok(DispatchOutcome::Reassigned {
            loan,
            entry,
            notification,
        })
    }
}

/// Leave a queue. With `borrower_id` set the caller is the reader and may only
/// remove their own entry; without it the caller is staff.
#[derive(Debug, Clone)]
pub struct RemoveFromWaitlist {
    pub entry_id: i32,
    pub borrower_id: Option<String>,
}

#[derive(Clone)]
pub struct WaitlistService {
    store: Arc<dyn Store>,
}

impl WaitlistService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Join the queue of a book, whatever its current stock
    pub async fn join(&self, cmd: JoinWaitlistCommand) -> AppResult<WaitlistEntry> {
        cmd.validate()?;
        let mut tx = self.store.begin().await?;

        let book = tx
            .find_book(cmd.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", cmd.book_id)))?;

        let existing = tx
            .count_waitlist_entries(&WaitlistFilter {
                book_id: Some(book.id),
                borrower_id: Some(cmd.borrower_id.clone()),
                limit: None,
            })
            .await?;
        if existing > 0 {
            return Err(AppError::Conflict(format!(
                "Borrower {} is already waiting for \"{}\"",
                cmd.borrower_id, book.title
            )));
        }

        let entry = tx
            .insert_waitlist_entry(&NewWaitlistEntry {
                book_id: book.id,
                borrower_id: cmd.borrower_id,
                entered_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;

        if book.available > 0 {
            tracing::debug!(book_id = book.id, "Reader joined a queue for a book on the shelf");
        }
        tracing::info!(book_id = book.id, entry_id = entry.id, "Reader joined waitlist");
        Ok(entry)
    }

    pub async fn remove(&self, cmd: RemoveFromWaitlist) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let entry = tx
            .find_waitlist_entry(cmd.entry_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Waitlist entry {} not found", cmd.entry_id))
            })?;

        if let Some(borrower_id) = &cmd.borrower_id {
            if &entry.borrower_id != borrower_id {
                return Err(AppError::Authorization(
                    "Readers can only leave their own queues".to_string(),
                ));
            }
        }

        tx.delete_waitlist_entry(entry.id).await?;
        tx.commit().await?;
        tracing::info!(entry_id = entry.id, book_id = entry.book_id, "Waitlist entry removed");
        Ok(())
    }

    /// Queue entries, FIFO, with their position in the queue of their book
    pub async fn list(&self, book_id: Option<i32>) -> AppResult<Vec<QueuedEntry>> {
        let mut tx = self.store.begin().await?;
        let entries = tx
            .find_waitlist_entries(&WaitlistFilter {
                book_id,
                ..Default::default()
            })
            .await?;
        with_positions(tx.as_mut(), entries).await
    }

    /// Queues a reader is standing in
    pub async fn for_borrower(&self, borrower_id: &str) -> AppResult<Vec<QueuedEntry>> {
        let mut tx = self.store.begin().await?;
        let own = tx
            .find_waitlist_entries(&WaitlistFilter {
                borrower_id: Some(borrower_id.to_string()),
                ..Default::default()
            })
            .await?;

        let mut queued = Vec::with_capacity(own.len());
        for entry in own {
            let queue = tx
                .find_waitlist_entries(&WaitlistFilter::for_book(entry.book_id))
                .await?;
            let position = queue.iter().position(|e| e.id == entry.id).unwrap_or(0) + 1;
            let book = tx.find_book(entry.book_id).await?.as_ref().map(BookSummary::from);
            queued.push(QueuedEntry {
                entry,
                position,
                book,
            });
        }
        Ok(queued)
    }

    /// 1-based place of a reader in the queue of one book, `None` when not queued
    pub async fn position(&self, borrower_id: &str, book_id: i32) -> AppResult<Option<usize>> {
        let mut tx = self.store.begin().await?;
        let queue = tx
            .find_waitlist_entries(&WaitlistFilter::for_book(book_id))
            .await?;
        Ok(queue
            .iter()
            .position(|e| e.borrower_id == borrower_id)
            .map(|p| p + 1))
    }
}

async fn with_positions(
    tx: &mut dyn StoreTx,
    entries: Vec<WaitlistEntry>,
) -> AppResult<Vec<QueuedEntry>> {
    let mut positions: HashMap<i32, usize> = HashMap::new();
    let mut books: HashMap<i32, Option<BookSummary>> = HashMap::new();
    let mut queued = Vec::with_capacity(entries.len());

    for entry in entries {
        let position = positions.entry(entry.book_id).or_insert(0);
        *position += 1;
        let position = *position;

        if !books.contains_key(&entry.book_id) {
            let summary = tx.find_book(entry.book_id).await?.as_ref().map(BookSummary::from);
            books.insert(entry.book_id, summary);
        }
        let book = books.get(&entry.book_id).cloned().flatten();

        queued.push(QueuedEntry {
            entry,
            position,
            book,
        });
    }
    Ok(queued)
}
