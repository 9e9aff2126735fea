//! Book queries

use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::book::{Book, BookPatch, BookQuery, NewBook, StockTotals},
};

const COLUMNS: &str =
    "id, title, author, genre, publisher, total, available, cover_url, location, description";

pub async fn insert(conn: &mut PgConnection, book: &NewBook) -> AppResult<Book> {
    let query = format!(
        r#"
        INSERT INTO books (title, author, genre, publisher, total, available, cover_url, location, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        COLUMNS
    );
    let created = sqlx::query_as::<_, Book>(&query)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.genre)
        .bind(&book.publisher)
        .bind(book.total)
        .bind(book.available)
        .bind(&book.cover_url)
        .bind(&book.location)
        .bind(&book.description)
        .fetch_one(conn)
        .await?;
    Ok(created)
}

pub async fn find(conn: &mut PgConnection, id: i32, for_update: bool) -> AppResult<Option<Book>> {
    let query = format!(
        "SELECT {} FROM books WHERE id = $1{}",
        COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let book = sqlx::query_as::<_, Book>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(book)
}

pub async fn update(conn: &mut PgConnection, id: i32, patch: &BookPatch) -> AppResult<Option<Book>> {
    let query = format!(
        r#"
        UPDATE books SET
            title = COALESCE($2, title),
            author = COALESCE($3, author),
            genre = COALESCE($4, genre),
            publisher = COALESCE($5, publisher),
            total = COALESCE($6, total),
            cover_url = COALESCE($7, cover_url),
            location = COALESCE($8, location),
            description = COALESCE($9, description)
        WHERE id = $1
        RETURNING {}
        "#,
        COLUMNS
    );
    let book = sqlx::query_as::<_, Book>(&query)
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.author)
        .bind(&patch.genre)
        .bind(&patch.publisher)
        .bind(patch.total)
        .bind(&patch.cover_url)
        .bind(&patch.location)
        .bind(&patch.description)
        .fetch_optional(conn)
        .await?;
    Ok(book)
}

pub async fn delete(conn: &mut PgConnection, id: i32) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(genre) = &query.genre {
        qb.push(" AND genre = ").push_bind(genre.clone());
    }
}

pub async fn find_many(conn: &mut PgConnection, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books WHERE TRUE");
    push_filters(&mut count, query);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *conn).await?;

    let (limit, offset) = query.limit_offset();
    let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM books WHERE TRUE", COLUMNS));
    push_filters(&mut select, query);
    select
        .push(" ORDER BY title, id LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    let books = select.build_query_as::<Book>().fetch_all(&mut *conn).await?;

    Ok((books, total))
}

pub async fn genres(conn: &mut PgConnection) -> AppResult<Vec<String>> {
    let genres = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT genre FROM books WHERE genre IS NOT NULL AND genre <> '' ORDER BY genre",
    )
    .fetch_all(conn)
    .await?;
    Ok(genres)
}

pub async fn totals(conn: &mut PgConnection) -> AppResult<StockTotals> {
    let (books, total_copies, available_copies) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT COUNT(*)::BIGINT,
               COALESCE(SUM(total), 0)::BIGINT,
               COALESCE(SUM(available), 0)::BIGINT
        FROM books
        "#,
    )
    .fetch_one(conn)
    .await?;
    Ok(StockTotals {
        books,
        total_copies,
        available_copies,
    })
}

pub async fn decrement_available(
    conn: &mut PgConnection,
    id: i32,
    allow_negative: bool,
) -> AppResult<Option<i32>> {
    let available = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE books SET available = available - 1
        WHERE id = $1 AND (available > 0 OR $2)
        RETURNING available
        "#,
    )
    .bind(id)
    .bind(allow_negative)
    .fetch_optional(conn)
    .await?;
    Ok(available)
}

pub async fn increment_available(conn: &mut PgConnection, id: i32) -> AppResult<Option<i32>> {
    let available = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE books SET available = available + 1
        WHERE id = $1 AND available < total
        RETURNING available
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(available)
}

pub async fn set_available(conn: &mut PgConnection, id: i32, available: i32) -> AppResult<Option<i32>> {
    let available = sqlx::query_scalar::<_, i32>(
        r#"
        UPDATE books SET available = $2
        WHERE id = $1 AND $2 >= 0 AND $2 <= total
        RETURNING available
        "#,
    )
    .bind(id)
    .bind(available)
    .fetch_optional(conn)
    .await?;
    Ok(available)
}
