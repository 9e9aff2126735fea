//! Notification queries

use sqlx::PgConnection;

use crate::{
    error::AppResult,
    models::notification::{NewNotification, Notification, NotificationRow},
};

pub async fn insert(conn: &mut PgConnection, n: &NewNotification) -> AppResult<Notification> {
    let row = sqlx::query_as::<_, NotificationRow>(
        r#"
        INSERT INTO notifications (borrower_id, kind, message, book_id, loan_id, read, created_at)
        VALUES ($1, $2, $3, $4, $5, FALSE, $6)
        RETURNING id, borrower_id, kind, message, book_id, loan_id, read, created_at
        "#,
    )
    .bind(&n.borrower_id)
    .bind(n.kind.as_str())
    .bind(&n.message)
    .bind(n.book_id)
    .bind(n.loan_id)
    .bind(n.created_at)
    .fetch_one(conn)
    .await?;
    row.try_into()
}

pub async fn find_for_borrower(conn: &mut PgConnection, borrower_id: &str) -> AppResult<Vec<Notification>> {
    sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, borrower_id, kind, message, book_id, loan_id, read, created_at
        FROM notifications
        WHERE borrower_id = $1
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(borrower_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Notification::try_from)
    .collect()
}

pub async fn mark_read(conn: &mut PgConnection, id: i32, borrower_id: &str) -> AppResult<Option<Notification>> {
    sqlx::query_as::<_, NotificationRow>(
        r#"
        UPDATE notifications SET read = TRUE
        WHERE id = $1 AND borrower_id = $2
        RETURNING id, borrower_id, kind, message, book_id, loan_id, read, created_at
        "#,
    )
    .bind(id)
    .bind(borrower_id)
    .fetch_optional(conn)
    .await?
    .map(Notification::try_from)
    .transpose()
}
