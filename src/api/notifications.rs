//! Reader notification endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::{
    error::AppResult,
    models::notification::{Notification, ReaderAlert},
    AppState,
};

use super::Session;

#[utoipa::path(
    get,
    path = "/me/notifications",
    tag = "notifications",
    responses(
        (status = 200, description = "Notifications, newest first", body = Vec<Notification>)
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<Notification>>> {
    let borrower_id = session.require_borrower()?;
    Ok(Json(state.services.notifications.list(borrower_id).await?))
}

#[utoipa::path(
    post,
    path = "/me/notifications/{id}/read",
    tag = "notifications",
    params(("id" = i32, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked as read", body = Notification),
        (status = 404, description = "Notification not found")
    )
)]
pub async fn mark_read(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
) -> AppResult<Json<Notification>> {
    let borrower_id = session.require_borrower()?;
    Ok(Json(
        state.services.notifications.mark_read(id, borrower_id).await?,
    ))
}

/// Overdue, due-soon and rate-this-book alerts
#[utoipa::path(
    get,
    path = "/me/alerts",
    tag = "notifications",
    responses(
        (status = 200, description = "Alerts computed from current loans", body = Vec<ReaderAlert>)
    )
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<ReaderAlert>>> {
    let borrower_id = session.require_borrower()?;
    Ok(Json(
        state
            .services
            .notifications
            .alerts(borrower_id, Utc::now())
            .await?,
    ))
}
