//! Statistics service

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        book::BookSummary,
        loan::{LoanFilter, LoanStatus},
        stats::{DashboardStats, GenreShare, TopBook},
        waitlist::WaitlistFilter,
    },
    repository::Store,
};

/// Number of books in the "most borrowed" ranking
const TOP_BOOKS: i64 = 5;
/// Number of genres in the loan breakdown
const TOP_GENRES: i64 = 5;

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn Store>,
}

impl StatsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Librarian dashboard, read in a single unit of work so the counts agree
    pub async fn dashboard(&self, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let mut tx = self.store.begin().await?;

        let stock = tx.stock_totals().await?;
        let open_loans = tx
            .count_loans(&LoanFilter {
                statuses: vec![LoanStatus::Requested, LoanStatus::Approved],
                unreturned: true,
                ..Default::default()
            })
            .await?;
        let pending_requests = tx
            .count_loans(&LoanFilter {
                statuses: vec![LoanStatus::Requested],
                ..Default::default()
            })
            .await?;
        let overdue_loans = tx.count_loans(&LoanFilter::overdue_at(now)).await?;
        let waitlist_entries = tx
            .count_waitlist_entries(&WaitlistFilter::default())
            .await?;

        let mut top_books = Vec::new();
        for (book_id, loans) in tx.most_borrowed(TOP_BOOKS).await? {
            // Books are never deleted while loans reference them
            if let Some(book) = tx.find_book(book_id).await? {
                top_books.push(TopBook {
                    book: BookSummary::from(&book),
                    loans,
                });
            }
        }

        let all_loans = tx.count_loans(&LoanFilter::default()).await?;
        let top_genres = tx
            .loans_by_genre(TOP_GENRES)
            .await?
            .into_iter()
            .map(|(genre, loans)| GenreShare::new(genre, loans, all_loans))
            .collect();

        Ok(DashboardStats {
            stock,
            open_loans,
            pending_requests,
            overdue_loans,
            waitlist_entries,
            top_books,
            top_genres,
        })
    }
}
