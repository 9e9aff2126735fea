//! Statistics endpoints

use axum::{extract::State, Json};
use chrono::Utc;

use crate::{error::AppResult, models::stats::DashboardStats, AppState};

use super::Session;

/// Librarian dashboard figures
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardStats),
        (status = 403, description = "Librarian access required")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<DashboardStats>> {
    session.require_staff()?;
    Ok(Json(state.services.stats.dashboard(Utc::now()).await?))
}
