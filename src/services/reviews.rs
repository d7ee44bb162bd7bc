use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{StoreError, StoreResult};
use crate::models::Review;

#[derive(Clone)]
pub struct ReviewService {
    db_pool: SqlitePool,
}

impl ReviewService {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    async fn ensure_item_visible(&self, item: &str) -> StoreResult<()> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM items WHERE name = ? AND unlisted = 0")
                .bind(item)
                .fetch_optional(&self.db_pool)
                .await?;

        exists
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("Item '{}'", item)))
    }

    /// Reviews for an item, newest first
    pub async fn list_reviews(&self, item: &str) -> StoreResult<Vec<Review>> {
        self.ensure_item_visible(item).await?;

        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT id, item, username, rating, review_text, created_at
            FROM reviews
            WHERE item = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(item)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(reviews)
    }

    /// Anonymous reviews carry no username
    pub async fn add_review(
        &self,
        item: &str,
        username: Option<&str>,
        rating: i64,
        review_text: &str,
    ) -> StoreResult<Review> {
        if !(1..=5).contains(&rating) {
            return Err(StoreError::Invalid("Rating must be between 1 and 5".to_string()));
        }
        let review_text = review_text.trim();
        if review_text.is_empty() {
            return Err(StoreError::Invalid("Review text is required".to_string()));
        }
        self.ensure_item_visible(item).await?;

        let id = sqlx::query(
            r#"
            INSERT INTO reviews (item, username, rating, review_text, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(item)
        .bind(username)
        .bind(rating)
        .bind(review_text)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?
        .last_insert_rowid();

        tracing::info!(review_id = id, item = %item, rating, "Review added");

        let review = sqlx::query_as::<_, Review>(
            "SELECT id, item, username, rating, review_text, created_at FROM reviews WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(review)
    }

    pub async fn delete_review(&self, item: &str, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ? AND item = ?")
            .bind(id)
            .bind(item)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Review {}", id)));
        }

        tracing::info!(review_id = id, item = %item, "Review deleted");
        Ok(())
    }
}
