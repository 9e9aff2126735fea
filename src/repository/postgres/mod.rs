//! PostgreSQL store.
//!
//! Each unit of work is one database transaction. Lifecycle operations take row
//! locks (`SELECT ... FOR UPDATE`) on the loan and then the book they touch, so two
//! staff members acting on the same book are serialized, and stock moves through
//! single conditional `UPDATE ... RETURNING` statements rather than read-then-write.

mod books;
mod comments;
mod loans;
mod notifications;
mod waitlist;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use super::{Store, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookPatch, BookQuery, BookSummary, NewBook, RatingSummary, StockTotals},
        comment::{Comment, CommentFilter, NewComment},
        loan::{Loan, LoanFilter, LoanPatch, NewLoan},
        notification::{NewNotification, Notification},
        waitlist::{NewWaitlistEntry, WaitlistEntry, WaitlistFilter},
    },
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

/// Open database transaction. Rolled back on drop unless committed.
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or_else(|| {
            AppError::StorageUnavailable("Transaction already committed".to_string())
        })
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_book(&mut self, book: &NewBook) -> AppResult<Book> {
        books::insert(self.conn()?, book).await
    }

    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        books::find(self.conn()?, id, false).await
    }

    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        books::find(self.conn()?, id, true).await
    }

    async fn update_book(&mut self, id: i32, patch: &BookPatch) -> AppResult<Option<Book>> {
        books::update(self.conn()?, id, patch).await
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<bool> {
        books::delete(self.conn()?, id).await
    }

    async fn find_books(&mut self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        books::find_many(self.conn()?, query).await
    }

    async fn list_genres(&mut self) -> AppResult<Vec<String>> {
        books::genres(self.conn()?).await
    }

    async fn stock_totals(&mut self) -> AppResult<StockTotals> {
        books::totals(self.conn()?).await
    }

    async fn decrement_available(
        &mut self,
        book_id: i32,
        allow_negative: bool,
    ) -> AppResult<Option<i32>> {
        books::decrement_available(self.conn()?, book_id, allow_negative).await
    }

    async fn increment_available(&mut self, book_id: i32) -> AppResult<Option<i32>> {
        books::increment_available(self.conn()?, book_id).await
    }

    async fn set_available(&mut self, book_id: i32, available: i32) -> AppResult<Option<i32>> {
        books::set_available(self.conn()?, book_id, available).await
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        loans::insert(self.conn()?, loan).await
    }

    async fn find_loan(&mut self, id: i32) -> AppResult<Option<Loan>> {
        loans::find(self.conn()?, id, false).await
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<Loan>> {
        loans::find(self.conn()?, id, true).await
    }

    async fn update_loan(&mut self, id: i32, patch: &LoanPatch) -> AppResult<Option<Loan>> {
        loans::update(self.conn()?, id, patch).await
    }

    async fn find_loans(&mut self, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        loans::find_many(self.conn()?, filter).await
    }

    async fn find_loan_details(
        &mut self,
        filter: &LoanFilter,
    ) -> AppResult<Vec<(Loan, Option<BookSummary>)>> {
        loans::find_details(self.conn()?, filter).await
    }

    async fn count_loans(&mut self, filter: &LoanFilter) -> AppResult<i64> {
        loans::count(self.conn()?, filter).await
    }

    async fn most_borrowed(&mut self, limit: i64) -> AppResult<Vec<(i32, i64)>> {
        loans::most_borrowed(self.conn()?, limit).await
    }

    async fn loans_by_genre(&mut self, limit: i64) -> AppResult<Vec<(String, i64)>> {
        loans::by_genre(self.conn()?, limit).await
    }

    async fn insert_waitlist_entry(
        &mut self,
        entry: &NewWaitlistEntry,
    ) -> AppResult<WaitlistEntry> {
        waitlist::insert(self.conn()?, entry).await
    }

    async fn find_waitlist_entry(&mut self, id: i32) -> AppResult<Option<WaitlistEntry>> {
        waitlist::find(self.conn()?, id).await
    }

    async fn delete_waitlist_entry(&mut self, id: i32) -> AppResult<bool> {
        waitlist::delete(self.conn()?, id).await
    }

    async fn find_waitlist_entries(
        &mut self,
        filter: &WaitlistFilter,
    ) -> AppResult<Vec<WaitlistEntry>> {
        waitlist::find_many(self.conn()?, filter).await
    }

    async fn count_waitlist_entries(&mut self, filter: &WaitlistFilter) -> AppResult<i64> {
        waitlist::count(self.conn()?, filter).await
    }

    async fn insert_notification(&mut self, n: &NewNotification) -> AppResult<Notification> {
        notifications::insert(self.conn()?, n).await
    }

    async fn find_notifications(&mut self, borrower_id: &str) -> AppResult<Vec<Notification>> {
        notifications::find_for_borrower(self.conn()?, borrower_id).await
    }

    async fn mark_notification_read(
        &mut self,
        id: i32,
        borrower_id: &str,
    ) -> AppResult<Option<Notification>> {
        notifications::mark_read(self.conn()?, id, borrower_id).await
    }

    async fn insert_comment(&mut self, c: &NewComment) -> AppResult<Comment> {
        comments::insert(self.conn()?, c).await
    }

    async fn find_comment(&mut self, id: i32) -> AppResult<Option<Comment>> {
        comments::find(self.conn()?, id).await
    }

    async fn set_comment_decision(
        &mut self,
        id: i32,
        approved: bool,
        decided_at: DateTime<Utc>,
    ) -> AppResult<Option<Comment>> {
        comments::set_decision(self.conn()?, id, approved, decided_at).await
    }

    async fn delete_comment(&mut self, id: i32) -> AppResult<bool> {
        comments::delete(self.conn()?, id).await
    }

    async fn find_comments(&mut self, filter: &CommentFilter) -> AppResult<Vec<Comment>> {
        comments::find_many(self.conn()?, filter).await
    }

    async fn rating_summaries(&mut self, book_ids: &[i32]) -> AppResult<Vec<RatingSummary>> {
        comments::rating_summaries(self.conn()?, book_ids).await
    }

    async fn commit(&mut self) -> AppResult<()> {
        let tx = self.tx.take().ok_or_else(|| {
            AppError::StorageUnavailable("Transaction already committed".to_string())
        })?;
        tx.commit().await?;
        Ok(())
    }
}
