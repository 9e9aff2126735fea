//! Persistence boundary.
//!
//! Services never talk to a database directly: every unit of work opens a
//! [`StoreTx`] through [`Store::begin`], performs its reads and writes on it and
//! commits. Dropping a transaction without committing discards all of its writes,
//! so a failure anywhere in a lifecycle operation leaves no partial state.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookPatch, BookQuery, BookSummary, NewBook, RatingSummary, StockTotals},
        comment::{Comment, CommentFilter, NewComment},
        loan::{Loan, LoanFilter, LoanPatch, NewLoan},
        notification::{NewNotification, Notification},
        waitlist::{NewWaitlistEntry, WaitlistEntry, WaitlistFilter},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Entry point to the backing store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit of work. Reads and writes on the returned transaction are
    /// isolated from concurrent units of work touching the same rows.
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;
}

/// One unit of work against the store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreTx: Send {
    // Books
    async fn insert_book(&mut self, book: &NewBook) -> AppResult<Book>;
    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>>;
    /// Like `find_book`, and holds the book row until commit
    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>>;
    async fn update_book(&mut self, id: i32, patch: &BookPatch) -> AppResult<Option<Book>>;
    async fn delete_book(&mut self, id: i32) -> AppResult<bool>;
    async fn find_books(&mut self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)>;
    async fn list_genres(&mut self) -> AppResult<Vec<String>>;
    async fn stock_totals(&mut self) -> AppResult<StockTotals>;

    // Stock ledger primitives. Each is a single atomic conditional update and
    // returns the new `available`, or `None` when the condition did not hold.

    /// `available - 1`, refused at zero unless `allow_negative`
    async fn decrement_available(&mut self, book_id: i32, allow_negative: bool)
        -> AppResult<Option<i32>>;
    /// `available + 1`, refused once `available` has reached `total`
    async fn increment_available(&mut self, book_id: i32) -> AppResult<Option<i32>>;
    /// Overwrite `available`, refused outside `0..=total`
    async fn set_available(&mut self, book_id: i32, available: i32) -> AppResult<Option<i32>>;

    // Loans
    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;
    async fn find_loan(&mut self, id: i32) -> AppResult<Option<Loan>>;
    /// Like `find_loan`, and holds the loan row until commit
    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<Loan>>;
    async fn update_loan(&mut self, id: i32, patch: &LoanPatch) -> AppResult<Option<Loan>>;
    async fn find_loans(&mut self, filter: &LoanFilter) -> AppResult<Vec<Loan>>;
    /// Loans joined with their book summary
    async fn find_loan_details(
        &mut self,
        filter: &LoanFilter,
    ) -> AppResult<Vec<(Loan, Option<BookSummary>)>>;
    async fn count_loans(&mut self, filter: &LoanFilter) -> AppResult<i64>;
    /// `(book_id, loan count)` pairs, most borrowed first
    async fn most_borrowed(&mut self, limit: i64) -> AppResult<Vec<(i32, i64)>>;
    /// `(genre, loan count)` pairs, most borrowed first. Books without a genre are skipped.
    async fn loans_by_genre(&mut self, limit: i64) -> AppResult<Vec<(String, i64)>>;

    // Waitlist
    async fn insert_waitlist_entry(&mut self, entry: &NewWaitlistEntry)
        -> AppResult<WaitlistEntry>;
    async fn find_waitlist_entry(&mut self, id: i32) -> AppResult<Option<WaitlistEntry>>;
    async fn delete_waitlist_entry(&mut self, id: i32) -> AppResult<bool>;
    /// FIFO ordered
    async fn find_waitlist_entries(
        &mut self,
        filter: &WaitlistFilter,
    ) -> AppResult<Vec<WaitlistEntry>>;
    async fn count_waitlist_entries(&mut self, filter: &WaitlistFilter) -> AppResult<i64>;

    // Notifications
    async fn insert_notification(&mut self, n: &NewNotification) -> AppResult<Notification>;
    /// Newest first
    async fn find_notifications(&mut self, borrower_id: &str) -> AppResult<Vec<Notification>>;
    /// Marks a notification of `borrower_id` as read
    async fn mark_notification_read(
        &mut self,
        id: i32,
        borrower_id: &str,
    ) -> AppResult<Option<Notification>>;

    // Comments
    async fn insert_comment(&mut self, c: &NewComment) -> AppResult<Comment>;
    async fn find_comment(&mut self, id: i32) -> AppResult<Option<Comment>>;
    async fn set_comment_decision(
        &mut self,
        id: i32,
        approved: bool,
        decided_at: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<Option<Comment>>;
    async fn delete_comment(&mut self, id: i32) -> AppResult<bool>;
    /// Newest first
    async fn find_comments(&mut self, filter: &CommentFilter) -> AppResult<Vec<Comment>>;
    /// Approved ratings of the given books. Unrated books have no summary.
    async fn rating_summaries(&mut self, book_ids: &[i32]) -> AppResult<Vec<RatingSummary>>;

    /// Make every write of this unit of work visible. Any further use of the
    /// transaction fails.
    async fn commit(&mut self) -> AppResult<()>;
}
