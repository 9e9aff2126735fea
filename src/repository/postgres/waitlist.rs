//! Waitlist queries

use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::waitlist::{NewWaitlistEntry, WaitlistEntry, WaitlistFilter},
};

pub async fn insert(conn: &mut PgConnection, entry: &NewWaitlistEntry) -> AppResult<WaitlistEntry> {
    let created = sqlx::query_as::<_, WaitlistEntry>(
        r#"
        INSERT INTO waitlist (book_id, borrower_id, entered_at)
        VALUES ($1, $2, $3)
        RETURNING id, book_id, borrower_id, entered_at
        "#,
    )
    .bind(entry.book_id)
    .bind(&entry.borrower_id)
    .bind(entry.entered_at)
    .fetch_one(conn)
    .await?;
    Ok(created)
}

pub async fn find(conn: &mut PgConnection, id: i32) -> AppResult<Option<WaitlistEntry>> {
    let entry = sqlx::query_as::<_, WaitlistEntry>(
        "SELECT id, book_id, borrower_id, entered_at FROM waitlist WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub async fn delete(conn: &mut PgConnection, id: i32) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM waitlist WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &WaitlistFilter) {
    if let Some(book_id) = filter.book_id {
        qb.push(" AND book_id = ").push_bind(book_id);
    }
    if let Some(borrower_id) = &filter.borrower_id {
        qb.push(" AND borrower_id = ").push_bind(borrower_id.clone());
    }
}

pub async fn find_many(conn: &mut PgConnection, filter: &WaitlistFilter) -> AppResult<Vec<WaitlistEntry>> {
    let mut qb = QueryBuilder::<Postgres>::new(
        "SELECT id, book_id, borrower_id, entered_at FROM waitlist WHERE TRUE",
    );
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY entered_at, id");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    let entries = qb.build_query_as::<WaitlistEntry>().fetch_all(conn).await?;
    Ok(entries)
}

pub async fn count(conn: &mut PgConnection, filter: &WaitlistFilter) -> AppResult<i64> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM waitlist WHERE TRUE");
    push_filters(&mut qb, filter);
    let count: i64 = qb.build_query_scalar::<i64>().fetch_one(conn).await?;
    Ok(count)
}
