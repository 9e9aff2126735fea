//! Stock ledger.
//!
//! `Book.available` moves only through these functions: one copy out per approval
//! or manual loan, one copy back per restock, and the librarian correction. A copy
//! handed from a return straight to a waitlisted reader never touches the ledger.

use crate::{
    error::{AppError, AppResult},
    models::Book,
    repository::StoreTx,
};

/// Take one copy off the shelf for `book`.
///
/// At zero stock this fails with `StockAnomaly` unless `force` is set, in which
/// case the count goes negative.
pub async fn take_copy(tx: &mut dyn StoreTx, book: &Book, force: bool) -> AppResult<i32> {
    match tx.decrement_available(book.id, force).await? {
        Some(available) if available < 0 => {
            tracing::warn!(
                book_id = book.id,
                available,
                "Forced loan drove stock of '{}' below zero",
                book.title
            );
            Ok(available)
        }
        Some(available) => Ok(available),
        None => {
            tracing::warn!(
                book_id = book.id,
                total = book.total,
                "Refused to take a copy of '{}': no copies available",
                book.title
            );
            Err(AppError::StockAnomaly(format!(
                "No copies of book {} available; catalog counts may have drifted",
                book.id
            )))
        }
    }
}

/// Put one copy back on the shelf. Returns the new count, or `None` when the
/// ledger already shows every owned copy on the shelf.
pub async fn restock(tx: &mut dyn StoreTx, book: &Book) -> AppResult<Option<i32>> {
    let available = tx.increment_available(book.id).await?;
    match available {
        Some(available) => {
            tracing::debug!(book_id = book.id, available, "Copy back on the shelf");
        }
        None => {
            tracing::warn!(
                book_id = book.id,
                total = book.total,
                "Stock of '{}' already at total, returned copy not counted",
                book.title
            );
        }
    }
    Ok(available)
}

/// Librarian override of the shelf count
pub async fn correct(
    tx: &mut dyn StoreTx,
    book: &Book,
    available: i32,
    acting_staff: &str,
) -> AppResult<i32> {
    let updated = tx
        .set_available(book.id, available)
        .await?
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Available copies must be between 0 and {}",
                book.total
            ))
        })?;
    tracing::info!(
        book_id = book.id,
        previous = book.available,
        available = updated,
        acting_staff,
        "Stock corrected manually"
    );
    Ok(updated)
}
