//! Reader comments and ratings, with librarian moderation

use std::sync::Arc;

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::comment::{Comment, CommentFilter, CreateComment, Moderation, NewComment},
    repository::Store,
};

#[derive(Clone)]
pub struct CommentsService {
    store: Arc<dyn Store>,
}

impl CommentsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// New comments wait for moderation before they show up publicly
    pub async fn submit(
        &self,
        borrower_id: &str,
        mut comment: CreateComment,
    ) -> AppResult<Comment> {
        comment.body = comment.body.trim().to_string();
        comment.validate()?;
        let mut tx = self.store.begin().await?;
        if tx.find_book(comment.book_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Book {} not found", comment.book_id)));
        }
        let created = tx
            .insert_comment(&NewComment {
                book_id: comment.book_id,
                borrower_id: borrower_id.to_string(),
                body: comment.body,
                rating: comment.rating,
                created_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;
        tracing::info!(comment_id = created.id, book_id = created.book_id, "Comment submitted");
        Ok(created)
    }

    pub async fn moderate(
        &self,
        id: i32,
        approved: bool,
        acting_staff: &str,
    ) -> AppResult<Comment> {
        let mut tx = self.store.begin().await?;
        let comment = tx
            .set_comment_decision(id, approved, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", id)))?;
        tx.commit().await?;
        tracing::info!(comment_id = id, approved, acting_staff, "Comment moderated");
        Ok(comment)
    }

    /// Readers may delete their own comments; staff (`borrower_id = None`) any
    pub async fn delete(&self, id: i32, borrower_id: Option<&str>) -> AppResult<()> {
        let mut tx = self.store.begin().await?;
        let comment = tx
            .find_comment(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", id)))?;
        if let Some(borrower_id) = borrower_id {
            if comment.borrower_id != borrower_id {
                return Err(AppError::Authorization(
                    "Readers can only delete their own comments".to_string(),
                ));
            }
        }
        tx.delete_comment(id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Approved comments of a book, newest first
    pub async fn list_for_book(&self, book_id: i32) -> AppResult<Vec<Comment>> {
        self.find(CommentFilter {
            book_id: Some(book_id),
            moderation: Some(Moderation::Approved),
            ..Default::default()
        })
        .await
    }

    pub async fn list_for_borrower(&self, borrower_id: &str) -> AppResult<Vec<Comment>> {
        self.find(CommentFilter {
            borrower_id: Some(borrower_id.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Moderation queue
    pub async fn list_pending(&self) -> AppResult<Vec<Comment>> {
        self.find(CommentFilter {
            moderation: Some(Moderation::Pending),
            ..Default::default()
        })
        .await
    }

    async fn find(&self, filter: CommentFilter) -> AppResult<Vec<Comment>> {
        let mut tx = self.store.begin().await?;
        tx.find_comments(&filter).await
    }
}
