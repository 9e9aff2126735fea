//! Comment and rating endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::comment::{Comment, CreateComment, ModerateComment},
    AppState,
};

use super::Session;

#[utoipa::path(
    post,
    path = "/comments",
    tag = "comments",
    request_body = CreateComment,
    responses(
        (status = 201, description = "Comment awaiting moderation", body = Comment),
        (status = 400, description = "Empty comment or rating outside 1..=5"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn submit_comment(
    State(state): State<AppState>,
    session: Session,
    Json(comment): Json<CreateComment>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let borrower_id = session.require_borrower()?;
    let comment = state.services.comments.submit(borrower_id, comment).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Approved comments of a book
#[utoipa::path(
    get,
    path = "/books/{id}/comments",
    tag = "comments",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Approved comments, newest first", body = Vec<Comment>)
    )
)]
pub async fn list_book_comments(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(state.services.comments.list_for_book(book_id).await?))
}

#[utoipa::path(
    get,
    path = "/me/comments",
    tag = "comments",
    responses(
        (status = 200, description = "Reader's comments", body = Vec<Comment>)
    )
)]
pub async fn my_comments(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<Comment>>> {
    let borrower_id = session.require_borrower()?;
    Ok(Json(state.services.comments.list_for_borrower(borrower_id).await?))
}

/// Moderation queue
#[utoipa::path(
    get,
    path = "/comments/pending",
    tag = "comments",
    responses(
        (status = 200, description = "Comments awaiting a decision", body = Vec<Comment>),
        (status = 403, description = "Librarian access required")
    )
)]
pub async fn list_pending(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<Comment>>> {
    session.require_staff()?;
    Ok(Json(state.services.comments.list_pending().await?))
}

#[utoipa::path(
    put,
    path = "/comments/{id}/moderation",
    tag = "comments",
    params(("id" = i32, Path, description = "Comment ID")),
    request_body = ModerateComment,
    responses(
        (status = 200, description = "Decision recorded", body = Comment),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn moderate_comment(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
    Json(decision): Json<ModerateComment>,
) -> AppResult<Json<Comment>> {
    let staff = session.require_staff()?;
    Ok(Json(
        state
            .services
            .comments
            .moderate(id, decision.approved, staff)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/comments/{id}",
    tag = "comments",
    params(("id" = i32, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Comment belongs to another reader"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let owner = if session.is_staff() {
        None
    } else {
        Some(session.require_borrower()?)
    };
    state.services.comments.delete(id, owner).await?;
    Ok(StatusCode::NO_CONTENT)
}
