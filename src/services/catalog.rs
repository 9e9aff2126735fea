//! Catalog management service

use std::{collections::HashMap, sync::Arc};

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{
            BookListing, BookPage, BookQuery, CorrectStock, CreateBook, NewBook, RatingSummary,
            UpdateBook,
        },
        loan::LoanFilter,
        waitlist::WaitlistFilter,
        Book,
    },
    repository::{Store, StoreTx},
    services::stock,
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Search books by title, author or genre, with their reader ratings.
    /// If ratings cannot be read for a schema or permission reason, the page
    /// is still served with every book unrated.
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<BookPage> {
        let mut tx = self.store.begin().await?;
        let (books, total) = tx.find_books(query).await?;

        let ids: Vec<i32> = books.iter().map(|b| b.id).collect();
        let ratings: HashMap<i32, RatingSummary> = match tx.rating_summaries(&ids).await {
            Ok(found) => found.into_iter().map(|r| (r.book_id, r)).collect(),
            Err(AppError::Schema(reason)) => {
                tracing::warn!("Rating read failed ({}), listing books unrated", reason);
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        let books = books
            .into_iter()
            .map(|book| match ratings.get(&book.id) {
                Some(r) => BookListing {
                    rating: r.average,
                    rating_count: r.count,
                    book,
                },
                None => BookListing::unrated(book),
            })
            .collect();
        Ok(BookPage { books, total })
    }

    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        let mut tx = self.store.begin().await?;
        find_book(tx.as_mut(), id).await
    }

    pub async fn genres(&self) -> AppResult<Vec<String>> {
        let mut tx = self.store.begin().await?;
        tx.list_genres().await
    }

    /// Create a book. `available` defaults to `total`.
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let book = NewBook::from(book);
        if book.available > book.total {
            return Err(AppError::Validation(format!(
                "Available copies ({}) cannot exceed total copies ({})",
                book.available, book.total
            )));
        }

        let mut tx = self.store.begin().await?;
        let created = tx.insert_book(&book).await?;
        tx.commit().await?;
        tracing::info!(book_id = created.id, "Book '{}' added to catalog", created.title);
        Ok(created)
    }

    /// Update descriptive fields or the number of owned copies.
    /// `available` is never touched here; see [`CatalogService::correct_stock`].
    pub async fn update_book(&self, id: i32, patch: UpdateBook) -> AppResult<Book> {
        patch.validate()?;
        let mut tx = self.store.begin().await?;
        let current = lock_book(tx.as_mut(), id).await?;

        if let Some(total) = patch.total {
            if total < current.available {
                return Err(AppError::Validation(format!(
                    "Total copies ({}) cannot drop below copies on the shelf ({})",
                    total, current.available
                )));
            }
        }

        let updated = tx
            .update_book(id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))?;
        tx.commit().await?;
        tracing::info!(book_id = id, "Book updated");
        Ok(updated)
    }

    /// Delete a book nobody has borrowed or is waiting for
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let book = lock_book(tx.as_mut(), id).await?;

        let loans = tx
            .count_loans(&LoanFilter {
                book_id: Some(id),
                ..Default::default()
            })
            .await?;
        let waiting = tx
            .count_waitlist_entries(&WaitlistFilter::for_book(id))
            .await?;
        if loans > 0 || waiting > 0 {
            return Err(AppError::Conflict(format!(
                "Book '{}' has {} loan(s) and {} waitlist entr(ies) and cannot be deleted",
                book.title, loans, waiting
            )));
        }

        if !tx.delete_book(id).await? {
            return Err(AppError::NotFound(format!("Book {} not found", id)));
        }
        tx.commit().await?;
        tracing::info!(book_id = id, "Book '{}' removed from catalog", book.title);
        Ok(())
    }

    /// Librarian override of the shelf count, within `0..=total`
    pub async fn correct_stock(
        &self,
        id: i32,
        correction: CorrectStock,
        acting_staff: &str,
    ) -> AppResult<Book> {
        correction.validate()?;
        let mut tx = self.store.begin().await?;
        let book = lock_book(tx.as_mut(), id).await?;
        let available =
            stock::correct(tx.as_mut(), &book, correction.available, acting_staff).await?;
        tx.commit().await?;
        Ok(Book { available, ..book })
    }
}

async fn find_book(tx: &mut dyn StoreTx, id: i32) -> AppResult<Book> {
    tx.find_book(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
}

async fn lock_book(tx: &mut dyn StoreTx, id: i32) -> AppResult<Book> {
    tx.lock_book(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
}
