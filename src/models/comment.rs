//! Reader comments and ratings, moderated by librarians

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// `approved` is `None` while pending, then `Some(true)` or `Some(false)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Comment {
    pub id: i32,
    pub book_id: i32,
    pub borrower_id: String,
    pub body: String,
    pub rating: Option<i16>,
    pub approved: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Moderation {
    Pending,
    Approved,
    Rejected,
}

impl Moderation {
    pub fn matches(&self, approved: Option<bool>) -> bool {
        match self {
            Moderation::Pending => approved.is_none(),
            Moderation::Approved => approved == Some(true),
            Moderation::Rejected => approved == Some(false),
        }
    }
}

/// Submit comment request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateComment {
    pub book_id: i32,
    #[validate(length(min = 1, max = 2000, message = "Comment must be 1 to 2000 characters"))]
    pub body: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub book_id: i32,
    pub borrower_id: String,
    pub body: String,
    pub rating: Option<i16>,
    pub created_at: DateTime<Utc>,
}

/// Store-level comment filter, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentFilter {
    pub book_id: Option<i32>,
    pub borrower_id: Option<String>,
    pub moderation: Option<Moderation>,
}

impl CommentFilter {
    pub fn matches(&self, c: &Comment) -> bool {
        self.book_id.map_or(true, |b| c.book_id == b)
            && self
                .borrower_id
                .as_deref()
                .map_or(true, |b| c.borrower_id == b)
            && self.moderation.map_or(true, |m| m.matches(c.approved))
    }
}

/// Moderation decision
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ModerateComment {
    pub approved: bool,
}
