//! Waitlist endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::waitlist::{JoinWaitlistCommand, QueuedEntry, WaitlistEntry},
    services::waitlist::RemoveFromWaitlist,
    AppState,
};

use super::Session;

#[derive(Deserialize, ToSchema)]
pub struct JoinWaitlistRequest {
    pub book_id: i32,
}

#[derive(Deserialize, IntoParams)]
pub struct WaitlistQuery {
    /// Restrict to the queue of one book
    pub book_id: Option<i32>,
}

/// Queue for a book
#[utoipa::path(
    post,
    path = "/waitlist",
    tag = "waitlist",
    request_body = JoinWaitlistRequest,
    responses(
        (status = 201, description = "Joined the queue", body = WaitlistEntry),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Already queued for this book")
    )
)]
pub async fn join_waitlist(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<JoinWaitlistRequest>,
) -> AppResult<(StatusCode, Json<WaitlistEntry>)> {
    let borrower_id = session.require_borrower()?;
    let entry = state
        .services
        .waitlist
        .join(JoinWaitlistCommand {
            book_id: request.book_id,
            borrower_id: borrower_id.to_string(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Leave a queue. Librarians may remove any entry.
#[utoipa::path(
    delete,
    path = "/waitlist/{id}",
    tag = "waitlist",
    params(("id" = i32, Path, description = "Waitlist entry ID")),
    responses(
        (status = 204, description = "Entry removed"),
        (status = 403, description = "Entry belongs to another reader"),
        (status = 404, description = "Entry not found")
    )
)]
pub async fn leave_waitlist(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    let borrower_id = if session.is_staff() {
        None
    } else {
        Some(session.require_borrower()?.to_string())
    };
    state
        .services
        .waitlist
        .remove(RemoveFromWaitlist {
            entry_id: id,
            borrower_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Queues with positions (librarian view)
#[utoipa::path(
    get,
    path = "/waitlist",
    tag = "waitlist",
    params(WaitlistQuery),
    responses(
        (status = 200, description = "Queue entries, FIFO", body = Vec<QueuedEntry>)
    )
)]
pub async fn list_waitlist(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<WaitlistQuery>,
) -> AppResult<Json<Vec<QueuedEntry>>> {
    session.require_staff()?;
    Ok(Json(state.services.waitlist.list(query.book_id).await?))
}

/// Queues the calling reader is in
#[utoipa::path(
    get,
    path = "/me/waitlist",
    tag = "waitlist",
    responses(
        (status = 200, description = "Reader's queue positions", body = Vec<QueuedEntry>)
    )
)]
pub async fn my_waitlist(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<QueuedEntry>>> {
    let borrower_id = session.require_borrower()?;
    Ok(Json(state.services.waitlist.for_borrower(borrower_id).await?))
}
