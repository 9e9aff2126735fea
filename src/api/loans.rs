//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::loan::{
        ApproveCommand, Loan, LoanDetails, LoanQuery, ManualLoanCommand, RejectCommand,
        RequestLoanCommand, ReturnCommand,
    },
    services::loans::Transition,
    AppState,
};

use super::Session;

/// Reader loan request
#[derive(Deserialize, ToSchema)]
pub struct RequestLoanRequest {
    pub book_id: i32,
    /// One of the configured loan durations
    pub duration_days: i64,
}

/// Librarian-created loan
#[derive(Deserialize, ToSchema)]
pub struct ManualLoanRequest {
    pub book_id: i32,
    pub borrower_id: String,
    pub duration_days: i64,
    /// Lend even when no copy is on the shelf
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize, IntoParams)]
pub struct ApproveParams {
    /// Approve even when no copy is on the shelf
    #[serde(default)]
    pub force: bool,
}

/// Ask to borrow a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = RequestLoanRequest,
    responses(
        (status = 201, description = "Loan requested", body = Loan),
        (status = 400, description = "Unsupported duration"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Reader already has an open loan")
    )
)]
pub async fn request_loan(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<RequestLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let borrower_id = session.require_borrower()?;
    let loan = state
        .services
        .loans
        .request_loan(RequestLoanCommand {
            borrower_id: borrower_id.to_string(),
            book_id: request.book_id,
            duration_days: request.duration_days,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Lend a book directly, without a prior request
#[utoipa::path(
    post,
    path = "/loans/manual",
    tag = "loans",
    request_body = ManualLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 409, description = "Reader already has an open loan"),
        (status = 422, description = "No copy available")
    )
)]
pub async fn create_manual_loan(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<ManualLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let staff = session.require_staff()?;
    let loan = state
        .services
        .loans
        .create_manual_loan(ManualLoanCommand {
            book_id: request.book_id,
            borrower_id: request.borrower_id,
            duration_days: request.duration_days,
            acting_staff: staff.to_string(),
            force: request.force,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// List loans (librarian view)
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    params(LoanQuery),
    responses(
        (status = 200, description = "Loans, newest first", body = Vec<LoanDetails>),
        (status = 403, description = "Librarian access required")
    )
)]
pub async fn list_loans(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    session.require_staff()?;
    Ok(Json(state.services.loans.list_loans(&query).await?))
}

/// Loan history of the calling reader
#[utoipa::path(
    get,
    path = "/me/loans",
    tag = "loans",
    responses(
        (status = 200, description = "Reader's loans, newest first", body = Vec<LoanDetails>)
    )
)]
pub async fn my_loans(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let borrower_id = session.require_borrower()?;
    Ok(Json(state.services.loans.borrower_history(borrower_id).await?))
}

#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan", body = LoanDetails),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(id).await?;
    if !session.is_staff() && session.borrower_id.as_deref() != Some(loan.loan.borrower_id.as_str()) {
        return Err(AppError::Authorization(
            "Readers can only see their own loans".to_string(),
        ));
    }
    Ok(Json(loan))
}

#[utoipa::path(
    post,
    path = "/loans/{id}/approve",
    tag = "loans",
    params(("id" = i32, Path, description = "Loan ID"), ApproveParams),
    responses(
        (status = 200, description = "Loan approved", body = Loan),
        (status = 409, description = "Loan is not requested"),
        (status = 422, description = "No copy available")
    )
)]
pub async fn approve_loan(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
    Query(params): Query<ApproveParams>,
) -> AppResult<Json<Loan>> {
    let staff = session.require_staff()?;
    let loan = state
        .services
        .loans
        .approve(ApproveCommand {
            loan_id: id,
            acting_staff: staff.to_string(),
            force: params.force,
        })
        .await?;
    Ok(Json(loan))
}

#[utoipa::path(
    post,
    path = "/loans/{id}/reject",
    tag = "loans",
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan rejected", body = Transition),
        (status = 409, description = "Loan is not requested")
    )
)]
pub async fn reject_loan(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
) -> AppResult<Json<Transition>> {
    let staff = session.require_staff()?;
    let transition = state
        .services
        .loans
        .reject(RejectCommand {
            loan_id: id,
            acting_staff: staff.to_string(),
        })
        .await?;
    Ok(Json(transition))
}

/// Receive a returned copy; it goes to the next reader in line or back on the shelf
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(("id" = i32, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Book returned", body = Transition),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan is not out")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i32>,
) -> AppResult<Json<Transition>> {
    let staff = session.require_staff()?;
    let transition = state
        .services
        .loans
        .return_book(ReturnCommand {
            loan_id: id,
            acting_staff: staff.to_string(),
        })
        .await?;
    Ok(Json(transition))
}
