//! Catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::book::{Book, BookPage, BookQuery, CorrectStock, CreateBook, UpdateBook},
    AppState,
};

use super::Session;

/// Search the catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books", body = BookPage)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<BookPage>> {
    Ok(Json(state.services.catalog.search_books(&query).await?))
}

/// Distinct genres in the catalog
#[utoipa::path(
    get,
    path = "/books/genres",
    tag = "books",
    responses(
        (status = 200, description = "Genres, sorted", body = Vec<String>)
    )
)]
pub async fn list_genres(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    Ok(Json(state.services.catalog.genres().await?))
}

#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(State(state): State<AppState>, Path(id): Path<i32>) -> AppResult<Json<Book>> {
    Ok(Json(state.services.catalog.get_book(id).await?))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid book"),
        (status = 403, description = "Librarian access required")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    session: Session,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    session.require_staff()?;
    let book = state.services.catalog.create_book(book).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
    Json(patch): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    session.require_staff()?;
    Ok(Json(state.services.catalog.update_book(id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has loans or waitlist entries")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    session.require_staff()?;
    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Override the number of copies on the shelf
#[utoipa::path(
    put,
    path = "/books/{id}/stock",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    request_body = CorrectStock,
    responses(
        (status = 200, description = "Stock corrected", body = Book),
        (status = 400, description = "Count outside 0..=total")
    )
)]
pub async fn correct_stock(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
    Json(correction): Json<CorrectStock>,
) -> AppResult<Json<Book>> {
    let staff = session.require_staff()?;
    Ok(Json(
        state.services.catalog.correct_stock(id, correction, staff).await?,
    ))
}
