//! Comment queries

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::{
        book::RatingSummary,
        comment::{Comment, CommentFilter, Moderation, NewComment},
    },
};

const COLUMNS: &str = "id, book_id, borrower_id, body, rating, approved, created_at, decided_at";

pub async fn insert(conn: &mut PgConnection, c: &NewComment) -> AppResult<Comment> {
    let query = format!(
        r#"
        INSERT INTO comments (book_id, borrower_id, body, rating, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        COLUMNS
    );
    let created = sqlx::query_as::<_, Comment>(&query)
        .bind(c.book_id)
        .bind(&c.borrower_id)
        .bind(&c.body)
        .bind(c.rating)
        .bind(c.created_at)
        .fetch_one(conn)
        .await?;
    Ok(created)
}

pub async fn find(conn: &mut PgConnection, id: i32) -> AppResult<Option<Comment>> {
    let query = format!("SELECT {} FROM comments WHERE id = $1", COLUMNS);
    let comment = sqlx::query_as::<_, Comment>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(comment)
}

pub async fn set_decision(
    conn: &mut PgConnection,
    id: i32,
    approved: bool,
    decided_at: DateTime<Utc>,
) -> AppResult<Option<Comment>> {
    let query = format!(
        "UPDATE comments SET approved = $2, decided_at = $3 WHERE id = $1 RETURNING {}",
        COLUMNS
    );
    let comment = sqlx::query_as::<_, Comment>(&query)
        .bind(id)
        .bind(approved)
        .bind(decided_at)
        .fetch_optional(conn)
        .await?;
    Ok(comment)
}

pub async fn delete(conn: &mut PgConnection, id: i32) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_many(conn: &mut PgConnection, filter: &CommentFilter) -> AppResult<Vec<Comment>> {
    let mut qb =
        QueryBuilder::<Postgres>::new(format!("SELECT {} FROM comments WHERE TRUE", COLUMNS));
    if let Some(book_id) = filter.book_id {
        qb.push(" AND book_id = ").push_bind(book_id);
    }
    if let Some(borrower_id) = &filter.borrower_id {
        qb.push(" AND borrower_id = ").push_bind(borrower_id.clone());
    }
    match filter.moderation {
        Some(Moderation::Pending) => {
            qb.push(" AND approved IS NULL");
        }
        Some(Moderation::Approved) => {
            qb.push(" AND approved = TRUE");
        }
        Some(Moderation::Rejected) => {
            qb.push(" AND approved = FALSE");
        }
        None => {}
    }
    qb.push(" ORDER BY created_at DESC, id DESC");
    let comments = qb.build_query_as::<Comment>().fetch_all(conn).await?;
    Ok(comments)
}

pub async fn rating_summaries(
    conn: &mut PgConnection,
    book_ids: &[i32],
) -> AppResult<Vec<RatingSummary>> {
    let summaries = sqlx::query_as::<_, RatingSummary>(
        r#"
        SELECT book_id, AVG(rating)::FLOAT8 AS average, COUNT(*)::BIGINT AS count
        FROM comments
        WHERE approved = TRUE AND rating > 0 AND book_id = ANY($1)
        GROUP BY book_id
        "#,
    )
    .bind(book_ids)
    .fetch_all(conn)
    .await?;
    Ok(summaries)
}
