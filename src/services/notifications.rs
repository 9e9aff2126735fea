//! Reader notifications: stored waitlist promotions plus alerts derived from
//! loan state at read time.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        comment::CommentFilter,
        loan::{LoanFilter, LoanStatus},
        notification::{AlertKind, Notification, ReaderAlert},
    },
    repository::Store,
};

#[derive(Clone)]
pub struct NotificationsService {
    store: Arc<dyn Store>,
    due_soon: Duration,
    rating_window: Duration,
}

impl NotificationsService {
    pub fn new(store: Arc<dyn Store>, policy: &LoansConfig) -> Self {
        Self {
            store,
            due_soon: Duration::days(policy.due_soon_days),
            rating_window: Duration::days(policy.rating_window_days),
        }
    }

    /// Stored notifications of a reader, newest first
    pub async fn list(&self, borrower_id: &str) -> AppResult<Vec<Notification>> {
        let mut tx = self.store.begin().await?;
        tx.find_notifications(borrower_id).await
    }

    pub async fn mark_read(&self, id: i32, borrower_id: &str) -> AppResult<Notification> {
        let mut tx = self.store.begin().await?;
        let notification = tx
            .mark_notification_read(id, borrower_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;
        tx.commit().await?;
        Ok(notification)
    }

    /// Overdue and due-soon loans, and recently returned books the reader has
    /// not reviewed yet
    pub async fn alerts(&self, borrower_id: &str, now: DateTime<Utc>) -> AppResult<Vec<ReaderAlert>> {
        let mut tx = self.store.begin().await?;
        let loans = tx
            .find_loan_details(&LoanFilter {
                borrower_id: Some(borrower_id.to_string()),
                statuses: vec![LoanStatus::Approved, LoanStatus::Returned],
                ..Default::default()
            })
            .await?;
        let reviewed: HashSet<i32> = tx
            .find_comments(&CommentFilter {
                borrower_id: Some(borrower_id.to_string()),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|c| c.book_id)
            .collect();

        let mut alerts = Vec::new();
        for (loan, book) in loans {
            let title = book
                .map(|b| b.title)
                .unwrap_or_else(|| format!("book #{}", loan.book_id));

            match loan.status {
                LoanStatus::Approved if loan.returned_at.is_none() => {
                    if loan.is_overdue(now) {
                        let days = (now - loan.due_date).num_days();
                        alerts.push(ReaderAlert {
                            kind: AlertKind::LoanOverdue,
                            loan_id: loan.id,
                            book_id: loan.book_id,
                            message: format!("\"{}\" is {} day(s) overdue.", title, days),
                            date: loan.due_date,
                        });
                    } else if loan.due_date - now <= self.due_soon {
                        let days = (loan.due_date - now).num_days();
                        alerts.push(ReaderAlert {
                            kind: AlertKind::LoanDueSoon,
                            loan_id: loan.id,
                            book_id: loan.book_id,
                            message: format!("\"{}\" is due in {} day(s).", title, days),
                            date: loan.due_date,
                        });
                    }
                }
                LoanStatus::Returned => {
                    let Some(returned_at) = loan.returned_at else {
                        continue;
                    };
                    if now - returned_at <= self.rating_window && !reviewed.contains(&loan.book_id) {
                        alerts.push(ReaderAlert {
                            kind: AlertKind::RateBook,
                            loan_id: loan.id,
                            book_id: loan.book_id,
                            message: format!("How was \"{}\"? Leave a rating.", title),
                            date: returned_at,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            book::NewBook,
            comment::NewComment,
            loan::{LoanPatch, NewLoan},
        },
        repository::{MemoryStore, StoreTx},
    };

    async fn seed_book(tx: &mut dyn StoreTx, title: &str) -> i32 {
        tx.insert_book(&NewBook {
            title: title.to_string(),
            author: "Cecília Meireles".to_string(),
            genre: None,
            publisher: None,
            total: 3,
            available: 3,
            cover_url: None,
            location: None,
            description: None,
        })
        .await
        .unwrap()
        .id
    }

    fn approved(book_id: i32, borrower: &str, due: DateTime<Utc>) -> NewLoan {
        NewLoan {
            book_id,
            borrower_id: borrower.to_string(),
            requested_at: due - Duration::days(7),
            due_date: due,
            status: LoanStatus::Approved,
            actioned_by: Some("Ana".to_string()),
            copy_reserved: false,
        }
    }

    #[tokio::test]
    async fn test_alerts_cover_overdue_due_soon_and_rating() {
        let store = Arc::new(MemoryStore::new());
        let service = NotificationsService::new(store.clone(), &LoansConfig::default());
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        let late = seed_book(tx.as_mut(), "Romanceiro da Inconfidência").await;
        let soon = seed_book(tx.as_mut(), "Ou Isto ou Aquilo").await;
        let rated = seed_book(tx.as_mut(), "Viagem").await;
        let unrated = seed_book(tx.as_mut(), "Mar Absoluto").await;

        // Returned loans first; each reader holds one open loan at a time
        for (book, reviewed) in [(rated, true), (unrated, false)] {
            let loan = tx
                .insert_loan(&approved(book, "A", now - Duration::days(5)))
                .await
                .unwrap();
            tx.update_loan(
                loan.id,
                &LoanPatch {
                    status: Some(LoanStatus::Returned),
                    returned_at: Some(now - Duration::days(2)),
                    actioned_by: None,
                },
            )
            .await
            .unwrap();
            if reviewed {
                tx.insert_comment(&NewComment {
                    book_id: book,
                    borrower_id: "A".to_string(),
                    body: "Lindo".to_string(),
                    rating: Some(5),
                    created_at: now,
                })
                .await
                .unwrap();
            }
        }
        tx.insert_loan(&approved(late, "A", now - Duration::days(3)))
            .await
            .unwrap();
        tx.insert_loan(&approved(soon, "B", now + Duration::days(2)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut kinds: Vec<(AlertKind, i32)> = service
            .alerts("A", now)
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.kind, a.book_id))
            .collect();
        kinds.sort_by_key(|(_, book)| *book);
        assert_eq!(
            kinds,
            vec![(AlertKind::LoanOverdue, late), (AlertKind::RateBook, unrated)]
        );

        let b = service.alerts("B", now).await.unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].kind, AlertKind::LoanDueSoon);
    }

    #[tokio::test]
    async fn test_mark_read_of_foreign_notification() {
        let store = Arc::new(MemoryStore::new());
        let service = NotificationsService::new(store, &LoansConfig::default());
        assert!(matches!(
            service.mark_read(1, "A").await,
            Err(AppError::NotFound(_))
        ));
    }
}
