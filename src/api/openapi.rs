//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, comments, health, loans, notifications, stats, waitlist};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "School Library API",
        version = "0.3.0",
        description = "Catalog, loan lifecycle and waitlist REST API for a school library",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::list_genres,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::correct_stock,
        // Loans
        loans::request_loan,
        loans::create_manual_loan,
        loans::list_loans,
        loans::my_loans,
        loans::get_loan,
        loans::approve_loan,
        loans::reject_loan,
        loans::return_loan,
        // Waitlist
        waitlist::join_waitlist,
        waitlist::leave_waitlist,
        waitlist::list_waitlist,
        waitlist::my_waitlist,
        // Notifications
        notifications::list_notifications,
        notifications::mark_read,
        notifications::list_alerts,
        // Comments
        comments::submit_comment,
        comments::list_book_comments,
        comments::my_comments,
        comments::list_pending,
        comments::moderate_comment,
        comments::delete_comment,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::BookSummary,
            crate::models::book::BookPage,
            crate::models::book::BookListing,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::CorrectStock,
            crate::models::book::StockTotals,
            // Loans
            loans::RequestLoanRequest,
            loans::ManualLoanRequest,
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::LoanDetails,
            crate::models::loan::LoanQuery,
            crate::services::loans::Transition,
            crate::services::waitlist::DispatchOutcome,
            // Waitlist
            waitlist::JoinWaitlistRequest,
            crate::models::waitlist::WaitlistEntry,
            crate::models::waitlist::QueuedEntry,
            // Notifications
            crate::models::notification::Notification,
            crate::models::notification::NotificationKind,
            crate::models::notification::ReaderAlert,
            crate::models::notification::AlertKind,
            // Comments
            crate::models::comment::Comment,
            crate::models::comment::CreateComment,
            crate::models::comment::ModerateComment,
            // Stats
            crate::models::stats::DashboardStats,
            crate::models::stats::TopBook,
            crate::models::stats::GenreShare,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "loans", description = "Loan lifecycle"),
        (name = "waitlist", description = "Waitlist queues"),
        (name = "notifications", description = "Reader notifications and alerts"),
        (name = "comments", description = "Comments, ratings and moderation"),
        (name = "stats", description = "Statistics")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
