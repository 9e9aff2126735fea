//! API handlers for the school library REST endpoints

pub mod books;
pub mod comments;
pub mod health;
pub mod loans;
pub mod notifications;
pub mod openapi;
pub mod stats;
pub mod waitlist;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, AppState};

/// Header carrying the reader (student) identity
pub const BORROWER_HEADER: &str = "x-borrower-id";
/// Header carrying the acting librarian's name
pub const STAFF_HEADER: &str = "x-staff-name";

/// Caller identity as passed by the front end. Identities are opaque and taken
/// at face value; authenticating them happens upstream.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub borrower_id: Option<String>,
    pub staff_name: Option<String>,
}

impl Session {
    fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            borrower_id: read(BORROWER_HEADER),
            staff_name: read(STAFF_HEADER),
        }
    }

    /// Name of the acting librarian
    pub fn require_staff(&self) -> Result<&str, AppError> {
        self.staff_name
            .as_deref()
            .ok_or_else(|| AppError::Authorization("Librarian access required".to_string()))
    }

    /// Identity of the calling reader
    pub fn require_borrower(&self) -> Result<&str, AppError> {
        self.borrower_id
            .as_deref()
            .ok_or_else(|| AppError::Authorization("Reader identity required".to_string()))
    }

    pub fn is_staff(&self) -> bool {
        self.staff_name.is_some()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Session::from_headers(&parts.headers))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/genres", get(books::list_genres))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/stock", put(books::correct_stock))
        .route("/books/:id/comments", get(comments::list_book_comments))
        // Loans
        .route("/loans", get(loans::list_loans).post(loans::request_loan))
        .route("/loans/manual", post(loans::create_manual_loan))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/approve", post(loans::approve_loan))
        .route("/loans/:id/reject", post(loans::reject_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        // Waitlist
        .route("/waitlist", get(waitlist::list_waitlist).post(waitlist::join_waitlist))
        .route("/waitlist/:id", delete(waitlist::leave_waitlist))
        // Comments
        .route("/comments", post(comments::submit_comment))
        .route("/comments/pending", get(comments::list_pending))
        .route("/comments/:id", delete(comments::delete_comment))
        .route("/comments/:id/moderation", put(comments::moderate_comment))
        // Current reader
        .route("/me/loans", get(loans::my_loans))
        .route("/me/waitlist", get(waitlist::my_waitlist))
        .route("/me/comments", get(comments::my_comments))
        .route("/me/notifications", get(notifications::list_notifications))
        .route("/me/notifications/:id/read", post(notifications::mark_read))
        .route("/me/alerts", get(notifications::list_alerts))
        // Statistics
        .route("/stats", get(stats::get_stats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(BORROWER_HEADER, HeaderValue::from_static("2024001"));
        headers.insert(STAFF_HEADER, HeaderValue::from_static("  "));

        let session = Session::from_headers(&headers);
        assert_eq!(session.require_borrower().unwrap(), "2024001");
        assert!(matches!(session.require_staff(), Err(AppError::Authorization(_))));
        assert!(!session.is_staff());
    }
}
