//! Loan queries

use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::{
        book::BookSummary,
        loan::{Loan, LoanFilter, LoanPatch, LoanRow, NewLoan},
    },
};

const COLUMNS: &str = "l.id, l.book_id, l.borrower_id, l.requested_at, l.due_date, l.returned_at, \
                       l.status, l.actioned_by, l.copy_reserved";

const RETURNING: &str = "id, book_id, borrower_id, requested_at, due_date, returned_at, \
                         status, actioned_by, copy_reserved";

#[derive(FromRow)]
struct LoanDetailsRow {
    #[sqlx(flatten)]
    loan: LoanRow,
    book_title: Option<String>,
    book_author: Option<String>,
}

pub async fn insert(conn: &mut PgConnection, loan: &NewLoan) -> AppResult<Loan> {
    let query = format!(
        r#"
        INSERT INTO loans (book_id, borrower_id, requested_at, due_date, status, actioned_by, copy_reserved)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        RETURNING
    );
    let row = sqlx::query_as::<_, LoanRow>(&query)
        .bind(loan.book_id)
        .bind(&loan.borrower_id)
        .bind(loan.requested_at)
        .bind(loan.due_date)
        .bind(loan.status.as_str())
        .bind(&loan.actioned_by)
        .bind(loan.copy_reserved)
        .fetch_one(conn)
        .await?;
    row.try_into()
}

pub async fn find(conn: &mut PgConnection, id: i32, for_update: bool) -> AppResult<Option<Loan>> {
    let query = format!(
        "SELECT {} FROM loans l WHERE l.id = $1{}",
        COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, LoanRow>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(Loan::try_from)
        .transpose()
}

pub async fn update(conn: &mut PgConnection, id: i32, patch: &LoanPatch) -> AppResult<Option<Loan>> {
    let query = format!(
        r#"
        UPDATE loans SET
            status = COALESCE($2, status),
            returned_at = COALESCE($3, returned_at),
            actioned_by = COALESCE($4, actioned_by)
        WHERE id = $1
        RETURNING {}
        "#,
        RETURNING
    );
    sqlx::query_as::<_, LoanRow>(&query)
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.returned_at)
        .bind(&patch.actioned_by)
        .fetch_optional(conn)
        .await?
        .map(Loan::try_from)
        .transpose()
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &LoanFilter) {
    if let Some(borrower_id) = &filter.borrower_id {
        qb.push(" AND l.borrower_id = ").push_bind(borrower_id.clone());
    }
    if let Some(book_id) = filter.book_id {
        qb.push(" AND l.book_id = ").push_bind(book_id);
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.to_string()).collect();
        qb.push(" AND l.status = ANY(").push_bind(statuses).push(")");
    }
    if filter.unreturned {
        qb.push(" AND l.returned_at IS NULL");
    }
    if let Some(before) = filter.due_before {
        qb.push(" AND l.due_date < ").push_bind(before);
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, filter: &LoanFilter) {
    qb.push(" ORDER BY l.requested_at DESC, l.id DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = filter.offset {
        qb.push(" OFFSET ").push_bind(offset);
    }
}

pub async fn find_many(conn: &mut PgConnection, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM loans l WHERE TRUE", COLUMNS));
    push_filters(&mut qb, filter);
    push_page(&mut qb, filter);
    qb.build_query_as::<LoanRow>()
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(Loan::try_from)
        .collect()
}

pub async fn find_details(
    conn: &mut PgConnection,
    filter: &LoanFilter,
) -> AppResult<Vec<(Loan, Option<BookSummary>)>> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {}, b.title AS book_title, b.author AS book_author \
         FROM loans l LEFT JOIN books b ON b.id = l.book_id WHERE TRUE",
        COLUMNS
    ));
    push_filters(&mut qb, filter);
    push_page(&mut qb, filter);
    qb.build_query_as::<LoanDetailsRow>()
        .fetch_all(conn)
        .await?
        .into_iter()
        .map(|row| {
            let book = match (row.book_title, row.book_author) {
                (Some(title), Some(author)) => Some(BookSummary {
                    id: row.loan.book_id,
                    title,
                    author,
                }),
                _ => None,
            };
            Ok((Loan::try_from(row.loan)?, book))
        })
        .collect()
}

pub async fn count(conn: &mut PgConnection, filter: &LoanFilter) -> AppResult<i64> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans l WHERE TRUE");
    push_filters(&mut qb, filter);
    let count: i64 = qb.build_query_scalar::<i64>().fetch_one(conn).await?;
    Ok(count)
}

pub async fn most_borrowed(conn: &mut PgConnection, limit: i64) -> AppResult<Vec<(i32, i64)>> {
    let ranked = sqlx::query_as::<_, (i32, i64)>(
        r#"
        SELECT book_id, COUNT(*)::BIGINT AS loans
        FROM loans
        GROUP BY book_id
        ORDER BY loans DESC, book_id
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(ranked)
}

pub async fn by_genre(conn: &mut PgConnection, limit: i64) -> AppResult<Vec<(String, i64)>> {
    let ranked = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT b.genre, COUNT(*)::BIGINT AS loans
        FROM loans l
        JOIN books b ON b.id = l.book_id
        WHERE b.genre IS NOT NULL AND b.genre <> ''
        GROUP BY b.genre
        ORDER BY loans DESC, b.genre
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(ranked)
}
