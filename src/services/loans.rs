//! Loan lifecycle engine.
//!
//! Owns every status transition of a loan and drives the stock ledger and the
//! waitlist dispatcher from inside the same unit of work, so a transition either
//! lands completely or not at all.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        book::BookSummary,
        loan::{
            ApproveCommand, Loan, LoanDetails, LoanFilter, LoanPatch, LoanQuery, LoanStatus,
            ManualLoanCommand, NewLoan, RejectCommand, RequestLoanCommand, ReturnCommand,
        },
        Book,
    },
    repository::{Store, StoreTx},
    services::{
        stock,
        waitlist::{DispatchOutcome, WaitlistDispatcher},
    },
};

/// Longest loan a librarian may create by hand
const MAX_MANUAL_LOAN_DAYS: i64 = 365;

/// Result of a transition that may free a copy
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Transition {
    pub loan: Loan,
    /// Present when the transition freed a copy
    pub dispatch: Option<DispatchOutcome>,
}

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn Store>,
    dispatcher: WaitlistDispatcher,
    policy: LoansConfig,
}

impl LoansService {
    pub fn new(store: Arc<dyn Store>, policy: LoansConfig) -> Self {
        Self {
            store,
            dispatcher: WaitlistDispatcher::new(policy.waitlist_loan_days),
            policy,
        }
    }

    /// Reader asks for a book. Stock is not required and not touched.
    pub async fn request_loan(&self, cmd: RequestLoanCommand) -> AppResult<Loan> {
        cmd.validate()?;
        if !self.policy.allowed_durations_days.contains(&cmd.duration_days) {
            return Err(AppError::Validation(format!(
                "Loan duration must be one of {:?} days",
                self.policy.allowed_durations_days
            )));
        }

        let mut tx = self.store.begin().await?;
        let book = find_book(tx.as_mut(), cmd.book_id).await?;
        ensure_no_open_loan(tx.as_mut(), &cmd.borrower_id).await?;

        let now = Utc::now();
        let loan = tx
            .insert_loan(&NewLoan {
                book_id: book.id,
                borrower_id: cmd.borrower_id,
                requested_at: now,
                due_date: now + Duration::days(cmd.duration_days),
                status: LoanStatus::Requested,
                actioned_by: None,
                copy_reserved: false,
            })
            .await?;
        tx.commit().await?;

        if book.available <= 0 {
            tracing::debug!(book_id = book.id, "Loan requested for a book with no stock");
        }
        tracing::info!(loan_id = loan.id, book_id = book.id, "Loan requested");
        Ok(loan)
    }

    /// Approve a requested loan, taking a copy off the shelf unless the waitlist
    /// already reserved one for it
    pub async fn approve(&self, cmd: ApproveCommand) -> AppResult<Loan> {
        cmd.validate()?;
        let mut tx = self.store.begin().await?;

        let loan = lock_loan(tx.as_mut(), cmd.loan_id).await?;
        let status = loan.status.transition(LoanStatus::Approved)?;
        let book = lock_book(tx.as_mut(), loan.book_id).await?;

        if !loan.copy_reserved {
            stock::take_copy(tx.as_mut(), &book, cmd.force).await?;
        }

        let loan = update_loan(
            tx.as_mut(),
            loan.id,
            LoanPatch {
                status: Some(status),
                returned_at: None,
                actioned_by: Some(cmd.acting_staff.clone()),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            book_id = book.id,
            acting_staff = %cmd.acting_staff,
            forced = cmd.force,
            "Loan approved"
        );
        Ok(loan)
    }

    /// Reject a requested loan. A copy the waitlist reserved for it is routed
    /// again to the next reader or the shelf.
    pub async fn reject(&self, cmd: RejectCommand) -> AppResult<Transition> {
        cmd.validate()?;
        let mut tx = self.store.begin().await?;

        let loan = lock_loan(tx.as_mut(), cmd.loan_id).await?;
        let status = loan.status.transition(LoanStatus::Rejected)?;
        let now = Utc::now();

        let loan = update_loan(
            tx.as_mut(),
            loan.id,
            LoanPatch {
                status: Some(status),
                returned_at: Some(now),
                actioned_by: Some(cmd.acting_staff.clone()),
            },
        )
        .await?;

        let dispatch = if loan.copy_reserved {
            let book = lock_book(tx.as_mut(), loan.book_id).await?;
            Some(self.dispatcher.dispatch(tx.as_mut(), &book, now).await?)
        } else {
            None
        };
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            acting_staff = %cmd.acting_staff,
            released_reserved_copy = dispatch.is_some(),
            "Loan rejected"
        );
        Ok(Transition { loan, dispatch })
    }

    /// Receive a returned copy and route it through the waitlist dispatcher
    pub async fn return_book(&self, cmd: ReturnCommand) -> AppResult<Transition> {
        cmd.validate()?;
        let mut tx = self.store.begin().await?;

        let loan = lock_loan(tx.as_mut(), cmd.loan_id).await?;
        if loan.returned_at.is_some() {
            return Err(AppError::InvalidState(format!(
                "Loan {} already has a return timestamp",
                loan.id
            )));
        }
        let status = loan.status.transition(LoanStatus::Returned)?;
        let book = lock_book(tx.as_mut(), loan.book_id).await?;
        let now = Utc::now();

        let loan = update_loan(
            tx.as_mut(),
            loan.id,
            LoanPatch {
                status: Some(status),
                returned_at: Some(now),
                actioned_by: Some(cmd.acting_staff.clone()),
            },
        )
        .await?;

        let dispatch = self.dispatcher.dispatch(tx.as_mut(), &book, now).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            book_id = book.id,
            acting_staff = %cmd.acting_staff,
            reassigned = matches!(dispatch, DispatchOutcome::Reassigned { .. }),
            "Book returned"
        );
        Ok(Transition {
            loan,
            dispatch: Some(dispatch),
        })
    }

    /// Librarian lends a book directly. The one-open-loan rule still applies;
    /// `force` only lets stock go below zero.
    pub async fn create_manual_loan(&self, cmd: ManualLoanCommand) -> AppResult<Loan> {
        cmd.validate()?;
        if !(1..=MAX_MANUAL_LOAN_DAYS).contains(&cmd.duration_days) {
            return Err(AppError::Validation(format!(
                "Loan duration must be between 1 and {} days",
                MAX_MANUAL_LOAN_DAYS
            )));
        }

        let mut tx = self.store.begin().await?;
        let book = lock_book(tx.as_mut(), cmd.book_id).await?;
        ensure_no_open_loan(tx.as_mut(), &cmd.borrower_id).await?;
        stock::take_copy(tx.as_mut(), &book, cmd.force).await?;

        let now = Utc::now();
        let loan = tx
            .insert_loan(&NewLoan {
                book_id: book.id,
                borrower_id: cmd.borrower_id,
                requested_at: now,
                due_date: now + Duration::days(cmd.duration_days),
                status: LoanStatus::Approved,
                actioned_by: Some(cmd.acting_staff.clone()),
                copy_reserved: false,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            book_id = book.id,
            acting_staff = %cmd.acting_staff,
            forced = cmd.force,
            "Manual loan created"
        );
        Ok(loan)
    }

    pub async fn get_loan(&self, id: i32) -> AppResult<LoanDetails> {
        let mut tx = self.store.begin().await?;
        let loan = tx
            .find_loan(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", id)))?;
        let book = tx.find_book(loan.book_id).await?.as_ref().map(BookSummary::from);
        Ok(LoanDetails::new(loan, book, Utc::now()))
    }

    /// List loans newest first. `status` accepts any loan status or `overdue`.
    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<LoanDetails>> {
        let now = Utc::now();
        let mut filter = match query.status.as_deref() {
            None | Some("") | Some("all") => LoanFilter::default(),
            Some("overdue") => LoanFilter::overdue_at(now),
            Some(status) => LoanFilter {
                statuses: vec![status.parse()?],
                ..Default::default()
            },
        };
        filter.borrower_id = query.borrower_id.clone();
        filter.book_id = query.book_id;

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(50).clamp(1, 500);
        filter.limit = Some(per_page);
        filter.offset = Some((page - 1).saturating_mul(per_page));

        self.read_details(&filter, now).await
    }

    /// Full loan history of one reader
    pub async fn borrower_history(&self, borrower_id: &str) -> AppResult<Vec<LoanDetails>> {
        let filter = LoanFilter {
            borrower_id: Some(borrower_id.to_string()),
            ..Default::default()
        };
        self.read_details(&filter, Utc::now()).await
    }

    /// Loans with book details. When the joined read fails for a schema or
    /// permission reason, plain loan rows are returned instead.
    async fn read_details(
        &self,
        filter: &LoanFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<LoanDetails>> {
        let rows = {
            let mut tx = self.store.begin().await?;
            tx.find_loan_details(filter).await
        };

        let rows = match rows {
            Err(AppError::Schema(reason)) => {
                tracing::warn!("Loan details read failed ({}), using plain loan rows", reason);
                // The failed statement poisons its transaction; read in a fresh one
                let mut tx = self.store.begin().await?;
                tx.find_loans(filter)
                    .await?
                    .into_iter()
                    .map(|loan| (loan, None))
                    .collect()
            }
            other => other?,
        };

        Ok(rows
            .into_iter()
            .map(|(loan, book)| LoanDetails::new(loan, book, now))
            .collect())
    }

    /// Requested or approved, not yet returned
    pub async fn count_open(&self) -> AppResult<i64> {
        let mut tx = self.store.begin().await?;
        tx.count_loans(&LoanFilter {
            statuses: vec![LoanStatus::Requested, LoanStatus::Approved],
            unreturned: true,
            ..Default::default()
        })
        .await
    }

    /// Requests waiting for a librarian decision
    pub async fn count_pending(&self) -> AppResult<i64> {
        let mut tx = self.store.begin().await?;
        tx.count_loans(&LoanFilter {
            statuses: vec![LoanStatus::Requested],
            ..Default::default()
        })
        .await
    }

    pub async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let mut tx = self.store.begin().await?;
        tx.count_loans(&LoanFilter::overdue_at(now)).await
    }
}

async fn find_book(tx: &mut dyn StoreTx, id: i32) -> AppResult<Book> {
    tx.find_book(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
}

async fn lock_book(tx: &mut dyn StoreTx, id: i32) -> AppResult<Book> {
    tx.lock_book(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
}

async fn lock_loan(tx: &mut dyn StoreTx, id: i32) -> AppResult<Loan> {
    tx.lock_loan(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", id)))
}

async fn update_loan(tx: &mut dyn StoreTx, id: i32, patch: LoanPatch) -> AppResult<Loan> {
    tx.update_loan(id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", id)))
}

async fn ensure_no_open_loan(tx: &mut dyn StoreTx, borrower_id: &str) -> AppResult<()> {
    if tx.count_loans(&LoanFilter::open_for(borrower_id)).await? > 0 {
        return Err(AppError::Conflict(format!(
            "Borrower {} already has an open loan; return it before borrowing another book",
            borrower_id
        )));
    }
    Ok(())
}
