//! Book (catalog item) model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Catalog item. `available` is owned by the loan lifecycle; catalog edits never write it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    /// Copies owned
    pub total: i32,
    /// Copies on the shelf
    pub available: i32,
    pub cover_url: Option<String>,
    /// Shelf location
    pub location: Option<String>,
    pub description: Option<String>,
}

impl Book {
    /// Copies currently out of the shelf (lent or reserved)
    pub fn copies_out(&self) -> i32 {
        self.total - self.available
    }
}

/// Short book representation attached to loans and rankings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookSummary {
    pub id: i32,
    pub title: String,
    pub author: String,
}

impl From<&Book> for BookSummary {
    fn from(b: &Book) -> Self {
        Self {
            id: b.id,
            title: b.title.clone(),
            author: b.author.clone(),
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total: i32,
    /// Defaults to `total`
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available: Option<i32>,
    pub cover_url: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Update book request (descriptive fields and owned copies)
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total: Option<i32>,
    pub cover_url: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Librarian override of the shelf count
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CorrectStock {
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available: i32,
}

/// Insert payload for a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub publisher: Option<String>,
    pub total: i32,
    pub available: i32,
    pub cover_url: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl From<CreateBook> for NewBook {
    fn from(c: CreateBook) -> Self {
        Self {
            available: c.available.unwrap_or(c.total),
            title: c.title,
            author: c.author,
            genre: c.genre,
            publisher: c.publisher,
            total: c.total,
            cover_url: c.cover_url,
            location: c.location,
            description: c.description,
        }
    }
}

/// Partial update of a book. Has no `available` field on purpose: stock goes
/// through the ledger primitives of the store.
pub type BookPatch = UpdateBook;

/// Query parameters for the catalog
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Case-insensitive match on title or author
    pub search: Option<String>,
    pub genre: Option<String>,
    /// Page number (1-based)
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    pub fn matches(&self, book: &Book) -> bool {
        let search_ok = self.search.as_deref().map_or(true, |s| {
            let s = s.to_lowercase();
            book.title.to_lowercase().contains(&s) || book.author.to_lowercase().contains(&s)
        });
        let genre_ok = self
            .genre
            .as_deref()
            .map_or(true, |g| book.genre.as_deref() == Some(g));
        search_ok && genre_ok
    }

    pub fn limit_offset(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(12).clamp(1, 200);
        (per_page, (page - 1).saturating_mul(per_page))
    }
}

/// Approved reader ratings of one book
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct RatingSummary {
    pub book_id: i32,
    pub average: f64,
    pub count: i64,
}

/// Catalog entry with its reader rating
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BookListing {
    #[serde(flatten)]
    pub book: Book,
    /// Average approved rating, 0 when unrated
    pub rating: f64,
    pub rating_count: i64,
}

impl BookListing {
    pub fn unrated(book: Book) -> Self {
        Self {
            book,
            rating: 0.0,
            rating_count: 0,
        }
    }
}

/// Paginated catalog page
#[derive(Debug, Serialize, ToSchema)]
pub struct BookPage {
    pub books: Vec<BookListing>,
    pub total: i64,
}

/// Catalog-wide copy counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StockTotals {
    pub books: i64,
    pub total_copies: i64,
    pub available_copies: i64,
}
