//! In-memory store.
//!
//! Units of work are serialized by one async mutex and run against a private copy
//! of the state that replaces the shared state only on commit. It mirrors the
//! constraints of the PostgreSQL schema (unique waitlist entry per reader and book,
//! one open loan per reader, referential checks on delete) so both backends fail the
//! same way.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

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

#[derive(Debug, Clone, Default)]
struct MemoryState {
    books: BTreeMap<i32, Book>,
    loans: BTreeMap<i32, Loan>,
    waitlist: BTreeMap<i32, WaitlistEntry>,
    notifications: BTreeMap<i32, Notification>,
    comments: BTreeMap<i32, Comment>,
    last_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }
}

/// Write budget before injected storage failures start. Negative means disabled.
#[derive(Debug)]
struct FaultPlan {
    writes_left: AtomicI64,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            writes_left: AtomicI64::new(-1),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultPlan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `writes` more writes succeed, then fail every write with
    /// `StorageUnavailable` until [`MemoryStore::clear_faults`]
    pub fn fail_after_writes(&self, writes: u32) {
        self.faults
            .writes_left
            .store(i64::from(writes), Ordering::SeqCst);
    }

    pub fn clear_faults(&self) {
        self.faults.writes_left.store(-1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            working,
            faults: self.faults.clone(),
        }))
    }
}

pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
    faults: Arc<FaultPlan>,
}

impl MemoryTx {
    fn state(&mut self) -> AppResult<&mut MemoryState> {
        if self.guard.is_none() {
            return Err(AppError::StorageUnavailable(
                "Transaction already committed".to_string(),
            ));
        }
        Ok(&mut self.working)
    }

    fn state_for_write(&mut self) -> AppResult<&mut MemoryState> {
        let left = self.faults.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(AppError::StorageUnavailable(
                "Injected storage failure".to_string(),
            ));
        }
        if left > 0 {
            self.faults.writes_left.fetch_sub(1, Ordering::SeqCst);
        }
        self.state()
    }
}

fn has_open_loan(state: &MemoryState, borrower_id: &str, except: Option<i32>) -> bool {
    state
        .loans
        .values()
        .any(|l| l.borrower_id == borrower_id && l.is_open() && Some(l.id) != except)
}

fn sort_newest_first(loans: &mut [Loan]) {
    loans.sort_by(|a, b| {
        b.requested_at
            .cmp(&a.requested_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

fn paginate<T>(items: Vec<T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let offset = offset.unwrap_or(0).max(0) as usize;
    let limit = limit.map_or(usize::MAX, |l| l.max(0) as usize);
    items.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_book(&mut self, book: &NewBook) -> AppResult<Book> {
        let state = self.state_for_write()?;
        if book.available > book.total {
            return Err(AppError::StockAnomaly(
                "Available copies exceed total copies".to_string(),
            ));
        }
        let id = state.next_id();
        let created = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            genre: book.genre.clone(),
            publisher: book.publisher.clone(),
            total: book.total,
            available: book.available,
            cover_url: book.cover_url.clone(),
            location: book.location.clone(),
            description: book.description.clone(),
        };
        state.books.insert(id, created.clone());
        Ok(created)
    }

    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.state()?.books.get(&id).cloned())
    }

    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        // The whole store is already held by this transaction
        self.find_book(id).await
    }

    async fn update_book(&mut self, id: i32, patch: &BookPatch) -> AppResult<Option<Book>> {
        let state = self.state_for_write()?;
        let Some(book) = state.books.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(total) = patch.total {
            if book.available > total {
                return Err(AppError::StockAnomaly(
                    "Available copies exceed total copies".to_string(),
                ));
            }
            book.total = total;
        }
        if let Some(v) = &patch.title {
            book.title = v.clone();
        }
        if let Some(v) = &patch.author {
            book.author = v.clone();
        }
        if patch.genre.is_some() {
            book.genre = patch.genre.clone();
        }
        if patch.publisher.is_some() {
            book.publisher = patch.publisher.clone();
        }
        if patch.cover_url.is_some() {
            book.cover_url = patch.cover_url.clone();
        }
        if patch.location.is_some() {
            book.location = patch.location.clone();
        }
        if patch.description.is_some() {
            book.description = patch.description.clone();
        }
        Ok(Some(book.clone()))
    }

    async fn delete_book(&mut self, id: i32) -> AppResult<bool> {
        let state = self.state_for_write()?;
        let referenced = state.loans.values().any(|l| l.book_id == id)
            || state.waitlist.values().any(|w| w.book_id == id)
            || state.comments.values().any(|c| c.book_id == id);
        if referenced {
            return Err(AppError::Conflict(format!(
                "Book {} is referenced by loans, waitlist entries or comments",
                id
            )));
        }
        Ok(state.books.remove(&id).is_some())
    }

    async fn find_books(&mut self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let state = self.state()?;
        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        let total = books.len() as i64;
        let (limit, offset) = query.limit_offset();
        Ok((paginate(books, Some(limit), Some(offset)), total))
    }

    async fn list_genres(&mut self) -> AppResult<Vec<String>> {
        let state = self.state()?;
        let mut genres: Vec<String> = state
            .books
            .values()
            .filter_map(|b| b.genre.clone())
            .filter(|g| !g.is_empty())
            .collect();
        genres.sort();
        genres.dedup();
        Ok(genres)
    }

    async fn stock_totals(&mut self) -> AppResult<StockTotals> {
        let state = self.state()?;
        Ok(state
            .books
            .values()
            .fold(StockTotals::default(), |acc, b| StockTotals {
                books: acc.books + 1,
                total_copies: acc.total_copies + i64::from(b.total),
                available_copies: acc.available_copies + i64::from(b.available),
            }))
    }

    async fn decrement_available(
        &mut self,
        book_id: i32,
        allow_negative: bool,
    ) -> AppResult<Option<i32>> {
        let state = self.state_for_write()?;
        let Some(book) = state.books.get_mut(&book_id) else {
            return Ok(None);
        };
        if book.available <= 0 && !allow_negative {
            return Ok(None);
        }
        book.available -= 1;
        Ok(Some(book.available))
    }

    async fn increment_available(&mut self, book_id: i32) -> AppResult<Option<i32>> {
        let state = self.state_for_write()?;
        let Some(book) = state.books.get_mut(&book_id) else {
            return Ok(None);
        };
        if book.available >= book.total {
            return Ok(None);
        }
        book.available += 1;
        Ok(Some(book.available))
    }

    async fn set_available(&mut self, book_id: i32, available: i32) -> AppResult<Option<i32>> {
        let state = self.state_for_write()?;
        let Some(book) = state.books.get_mut(&book_id) else {
            return Ok(None);
        };
        if available < 0 || available > book.total {
            return Ok(None);
        }
        book.available = available;
        Ok(Some(available))
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        let state = self.state_for_write()?;
        if !state.books.contains_key(&loan.book_id) {
            return Err(AppError::NotFound(format!("Book {} not found", loan.book_id)));
        }
        let created = Loan {
            id: 0,
            book_id: loan.book_id,
            borrower_id: loan.borrower_id.clone(),
            requested_at: loan.requested_at,
            due_date: loan.due_date,
            returned_at: None,
            status: loan.status,
            actioned_by: loan.actioned_by.clone(),
            copy_reserved: loan.copy_reserved,
        };
        if created.is_open() && has_open_loan(state, &loan.borrower_id, None) {
            return Err(AppError::Conflict(format!(
                "Borrower {} already has an open loan",
                loan.borrower_id
            )));
        }
        let id = state.next_id();
        let created = Loan { id, ..created };
        state.loans.insert(id, created.clone());
        Ok(created)
    }

    async fn find_loan(&mut self, id: i32) -> AppResult<Option<Loan>> {
        Ok(self.state()?.loans.get(&id).cloned())
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<Loan>> {
        self.find_loan(id).await
    }

    async fn update_loan(&mut self, id: i32, patch: &LoanPatch) -> AppResult<Option<Loan>> {
        let state = self.state_for_write()?;
        let Some(mut loan) = state.loans.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(status) = patch.status {
            loan.status = status;
        }
        if patch.returned_at.is_some() {
            loan.returned_at = patch.returned_at;
        }
        if patch.actioned_by.is_some() {
            loan.actioned_by = patch.actioned_by.clone();
        }
        if loan.is_open() && has_open_loan(state, &loan.borrower_id, Some(id)) {
            return Err(AppError::Conflict(format!(
                "Borrower {} already has an open loan",
                loan.borrower_id
            )));
        }
        state.loans.insert(id, loan.clone());
        Ok(Some(loan))
    }

    async fn find_loans(&mut self, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let state = self.state()?;
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        sort_newest_first(&mut loans);
        Ok(paginate(loans, filter.limit, filter.offset))
    }

    async fn find_loan_details(
        &mut self,
        filter: &LoanFilter,
    ) -> AppResult<Vec<(Loan, Option<BookSummary>)>> {
        let loans = self.find_loans(filter).await?;
        let state = self.state()?;
        Ok(loans
            .into_iter()
            .map(|l| {
                let book = state.books.get(&l.book_id).map(BookSummary::from);
                (l, book)
            })
            .collect())
    }

    async fn count_loans(&mut self, filter: &LoanFilter) -> AppResult<i64> {
        let state = self.state()?;
        Ok(state.loans.values().filter(|l| filter.matches(l)).count() as i64)
    }

    async fn most_borrowed(&mut self, limit: i64) -> AppResult<Vec<(i32, i64)>> {
        let state = self.state()?;
        let mut counts: BTreeMap<i32, i64> = BTreeMap::new();
        for loan in state.loans.values() {
            *counts.entry(loan.book_id).or_default() += 1;
        }
        let mut ranked: Vec<(i32, i64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(paginate(ranked, Some(limit), None))
    }

    async fn loans_by_genre(&mut self, limit: i64) -> AppResult<Vec<(String, i64)>> {
        let state = self.state()?;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for loan in state.loans.values() {
            let genre = state.books.get(&loan.book_id).and_then(|b| b.genre.as_deref());
            if let Some(genre) = genre.filter(|g| !g.is_empty()) {
                *counts.entry(genre.to_string()).or_default() += 1;
            }
        }
        let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(paginate(ranked, Some(limit), None))
    }

    async fn insert_waitlist_entry(
        &mut self,
        entry: &NewWaitlistEntry,
    ) -> AppResult<WaitlistEntry> {
        let state = self.state_for_write()?;
        if !state.books.contains_key(&entry.book_id) {
            return Err(AppError::NotFound(format!("Book {} not found", entry.book_id)));
        }
        let duplicate = state
            .waitlist
            .values()
            .any(|w| w.book_id == entry.book_id && w.borrower_id == entry.borrower_id);
        if duplicate {
            return Err(AppError::Conflict(format!(
                "Borrower {} is already waiting for book {}",
                entry.borrower_id, entry.book_id
            )));
        }
        let id = state.next_id();
        let created = WaitlistEntry {
            id,
            book_id: entry.book_id,
            borrower_id: entry.borrower_id.clone(),
            entered_at: entry.entered_at,
        };
        state.waitlist.insert(id, created.clone());
        Ok(created)
    }

    async fn find_waitlist_entry(&mut self, id: i32) -> AppResult<Option<WaitlistEntry>> {
        Ok(self.state()?.waitlist.get(&id).cloned())
    }

    async fn delete_waitlist_entry(&mut self, id: i32) -> AppResult<bool> {
        Ok(self.state_for_write()?.waitlist.remove(&id).is_some())
    }

    async fn find_waitlist_entries(
        &mut self,
        filter: &WaitlistFilter,
    ) -> AppResult<Vec<WaitlistEntry>> {
        let state = self.state()?;
        let mut entries: Vec<WaitlistEntry> = state
            .waitlist
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.entered_at.cmp(&b.entered_at).then_with(|| a.id.cmp(&b.id)));
        Ok(paginate(entries, filter.limit, None))
    }

    async fn count_waitlist_entries(&mut self, filter: &WaitlistFilter) -> AppResult<i64> {
        let state = self.state()?;
        Ok(state.waitlist.values().filter(|w| filter.matches(w)).count() as i64)
    }

    async fn insert_notification(&mut self, n: &NewNotification) -> AppResult<Notification> {
        let state = self.state_for_write()?;
        let id = state.next_id();
        let created = Notification {
            id,
            borrower_id: n.borrower_id.clone(),
            kind: n.kind,
            message: n.message.clone(),
            book_id: n.book_id,
            loan_id: n.loan_id,
            read: false,
            created_at: n.created_at,
        };
        state.notifications.insert(id, created.clone());
        Ok(created)
    }

    async fn find_notifications(&mut self, borrower_id: &str) -> AppResult<Vec<Notification>> {
        let state = self.state()?;
        let mut found: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| n.borrower_id == borrower_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn mark_notification_read(
        &mut self,
        id: i32,
        borrower_id: &str,
    ) -> AppResult<Option<Notification>> {
        let state = self.state_for_write()?;
        Ok(state
            .notifications
            .get_mut(&id)
            .filter(|n| n.borrower_id == borrower_id)
            .map(|n| {
                n.read = true;
                n.clone()
            }))
    }

    async fn insert_comment(&mut self, c: &NewComment) -> AppResult<Comment> {
        let state = self.state_for_write()?;
        if !state.books.contains_key(&c.book_id) {
            return Err(AppError::NotFound(format!("Book {} not found", c.book_id)));
        }
        let id = state.next_id();
        let created = Comment {
            id,
            book_id: c.book_id,
            borrower_id: c.borrower_id.clone(),
            body: c.body.clone(),
            rating: c.rating,
            approved: None,
            created_at: c.created_at,
            decided_at: None,
        };
        state.comments.insert(id, created.clone());
        Ok(created)
    }

    async fn find_comment(&mut self, id: i32) -> AppResult<Option<Comment>> {
        Ok(self.state()?.comments.get(&id).cloned())
    }

    async fn set_comment_decision(
        &mut self,
        id: i32,
        approved: bool,
        decided_at: DateTime<Utc>,
    ) -> AppResult<Option<Comment>> {
        let state = self.state_for_write()?;
        Ok(state.comments.get_mut(&id).map(|c| {
            c.approved = Some(approved);
            c.decided_at = Some(decided_at);
            c.clone()
        }))
    }

    async fn delete_comment(&mut self, id: i32) -> AppResult<bool> {
        Ok(self.state_for_write()?.comments.remove(&id).is_some())
    }

    async fn find_comments(&mut self, filter: &CommentFilter) -> AppResult<Vec<Comment>> {
        let state = self.state()?;
        let mut found: Vec<Comment> = state
            .comments
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn rating_summaries(&mut self, book_ids: &[i32]) -> AppResult<Vec<RatingSummary>> {
        let state = self.state()?;
        let mut sums: BTreeMap<i32, (i64, i64)> = BTreeMap::new();
        for c in state.comments.values() {
            if c.approved != Some(true) || !book_ids.contains(&c.book_id) {
                continue;
            }
            if let Some(rating) = c.rating.filter(|r| *r > 0) {
                let (total, count) = sums.entry(c.book_id).or_default();
                *total += i64::from(rating);
                *count += 1;
            }
        }
        Ok(sums
            .into_iter()
            .map(|(book_id, (total, count))| RatingSummary {
                book_id,
                average: total as f64 / count as f64,
                count,
            })
            .collect())
    }

    async fn commit(&mut self) -> AppResult<()> {
        let mut guard = self.guard.take().ok_or_else(|| {
            AppError::StorageUnavailable("Transaction already committed".to_string())
        })?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_book(total: i32) -> NewBook {
        NewBook {
            title: "Vidas Secas".to_string(),
            author: "Graciliano Ramos".to_string(),
            genre: Some("Romance".to_string()),
            publisher: None,
            total,
            available: total,
            cover_url: None,
            location: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_book(&new_book(1)).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.stock_totals().await.unwrap().books, 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let book = tx.insert_book(&new_book(2)).await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.find_book(book.id).await.is_err());
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find_book(book.id).await.unwrap().unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_stock_primitives_are_bounded() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let book = tx.insert_book(&new_book(1)).await.unwrap();

        assert_eq!(tx.increment_available(book.id).await.unwrap(), None);
        assert_eq!(tx.decrement_available(book.id, false).await.unwrap(), Some(0));
        assert_eq!(tx.decrement_available(book.id, false).await.unwrap(), None);
        assert_eq!(tx.decrement_available(book.id, true).await.unwrap(), Some(-1));
        assert_eq!(tx.set_available(book.id, 2).await.unwrap(), None);
        assert_eq!(tx.set_available(book.id, 1).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_waitlist_entry_conflicts() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let book = tx.insert_book(&new_book(1)).await.unwrap();
        let entry = NewWaitlistEntry {
            book_id: book.id,
            borrower_id: "2024010".to_string(),
            entered_at: Utc::now(),
        };
        tx.insert_waitlist_entry(&entry).await.unwrap();
        assert!(matches!(
            tx.insert_waitlist_entry(&entry).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::new();
        store.fail_after_writes(1);
        let mut tx = store.begin().await.unwrap();
        tx.insert_book(&new_book(1)).await.unwrap();
        assert!(matches!(
            tx.insert_book(&new_book(1)).await,
            Err(AppError::StorageUnavailable(_))
        ));
        store.clear_faults();
        assert!(tx.insert_book(&new_book(1)).await.is_ok());
    }
}
