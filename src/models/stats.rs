//! Dashboard statistics

use serde::Serialize;
use utoipa::ToSchema;

use super::book::{BookSummary, StockTotals};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TopBook {
    pub book: BookSummary,
    pub loans: i64,
}

/// Loans of one genre as a share of all loans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GenreShare {
    pub genre: String,
    pub loans: i64,
    /// Rounded to the nearest whole percent
    pub percentage: i64,
}

impl GenreShare {
    pub fn new(genre: String, loans: i64, all_loans: i64) -> Self {
        let percentage = if all_loans > 0 {
            (loans as f64 * 100.0 / all_loans as f64).round() as i64
        } else {
            0
        };
        Self {
            genre,
            loans,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardStats {
    pub stock: StockTotals,
    pub open_loans: i64,
    pub pending_requests: i64,
    pub overdue_loans: i64,
    pub waitlist_entries: i64,
    pub top_books: Vec<TopBook>,
    pub top_genres: Vec<GenreShare>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_share_rounds_to_whole_percent() {
        assert_eq!(GenreShare::new("Poesia".into(), 1, 3).percentage, 33);
        assert_eq!(GenreShare::new("Romance".into(), 2, 3).percentage, 67);
        assert_eq!(GenreShare::new("Conto".into(), 0, 0).percentage, 0);
    }
}
