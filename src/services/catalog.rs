//! Catalog items and inventory

use std::path::PathBuf;

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    AvailabilityResponse, CreateItemRequest, Item, OrderLineRequest, Shortfall, UpdateItemRequest,
    ITEM_COLUMNS,
};

/// Public URL prefix of stored images
pub const IMAGE_URL_PREFIX: &str = "assets/images";

/// Collapse repeated lines for the same item, keeping first-seen order
pub fn merge_lines(lines: &[OrderLineRequest]) -> StoreResult<Vec<(String, i64)>> {
    let mut merged: Vec<(String, i64)> = Vec::new();
    for line in lines {
        let name = line.item.trim();
        match merged.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, quantity)) => {
                *quantity = quantity.checked_add(line.quantity).ok_or_else(|| {
                    StoreError::Invalid(format!("Quantity for '{}' is too large", name))
                })?;
            }
            None => merged.push((name.to_string(), line.quantity)),
        }
    }
    Ok(merged)
}

/// Check merged lines against the catalog on the given connection.
/// Returns the items that can be fulfilled and the shortfalls.
pub(crate) async fn assess_lines(
    conn: &mut SqliteConnection,
    lines: &[(String, i64)],
) -> Result<(Vec<(Item, i64)>, Vec<Shortfall>), sqlx::Error> {
    let mut ready = Vec::with_capacity(lines.len());
    let mut shortfalls = Vec::new();

    for (name, requested) in lines {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE name = ?",
            ITEM_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

        let shortfall = |available: i64, reason: &str| Shortfall {
            item: name.clone(),
            requested: *requested,
            available,
            reason: reason.to_string(),
        };

        match item {
            None => shortfalls.push(shortfall(0, "Item not found")),
            Some(item) if item.unlisted => shortfalls.push(shortfall(0, "Item not found")),
            Some(item) if item.sold_out => shortfalls.push(shortfall(0, "Item is sold out")),
            Some(item) if item.quantity < *requested => {
                shortfalls.push(shortfall(item.quantity, "Insufficient inventory"))
            }
            Some(item) => ready.push((item, *requested)),
        }
    }

    Ok((ready, shortfalls))
}

/// File name for an uploaded image: `<name>_<unix ts>.<ext>`
pub fn image_file_name(item_name: &str, extension: &str, timestamp: i64) -> String {
    let stem: String = item_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}.{}", stem, timestamp, extension.to_lowercase())
}

#[derive(Clone)]
pub struct CatalogService {
    db_pool: SqlitePool,
    upload_folder: PathBuf,
    max_file_size: usize,
}

impl CatalogService {
    pub fn new(db_pool: SqlitePool, upload_folder: PathBuf, max_file_size: usize) -> Self {
        Self {
            db_pool,
            upload_folder,
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    pub async fn list_items(&self, include_unlisted: bool) -> StoreResult<Vec<Item>> {
        let sql = if include_unlisted {
            format!("SELECT {} FROM items ORDER BY name", ITEM_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM items WHERE unlisted = 0 ORDER BY name",
                ITEM_COLUMNS
            )
        };

        let items = sqlx::query_as::<_, Item>(&sql)
            .fetch_all(&self.db_pool)
            .await?;

        Ok(items)
    }

    async fn find(&self, name: &str) -> StoreResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE name = ?",
            ITEM_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(item)
    }

    /// Unlisted items only resolve when `include_unlisted` is set
    pub async fn get_item(&self, name: &str, include_unlisted: bool) -> StoreResult<Item> {
        match self.find(name).await? {
            Some(item) if include_unlisted || !item.unlisted => Ok(item),
            _ => Err(StoreError::NotFound(format!("Item '{}'", name))),
        }
    }

    pub async fn create_item(&self, request: CreateItemRequest) -> StoreResult<Item> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::Invalid("Item name is required".to_string()));
        }
        if self.find(&name).await?.is_some() {
            return Err(StoreError::Conflict(format!("Item '{}' already exists", name)));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO items (name, description, price, image, sold_out, unlisted, quantity, created_at, updated_at)
            VALUES (?, ?, ?, NULL, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&name)
        .bind(&request.description)
        .bind(request.price)
        .bind(request.sold_out)
        .bind(request.unlisted)
        .bind(request.quantity)
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        tracing::info!(item = %name, price = request.price, quantity = request.quantity, "Item created");
        self.get_item(&name, true).await
    }

    pub async fn update_item(&self, name: &str, request: UpdateItemRequest) -> StoreResult<Item> {
        let result = sqlx::query(
            r#"
            UPDATE items SET
                description = COALESCE(?, description),
                price = COALESCE(?, price),
                quantity = COALESCE(?, quantity),
                sold_out = COALESCE(?, sold_out),
                unlisted = COALESCE(?, unlisted),
                updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(request.description)
        .bind(request.price)
        .bind(request.quantity)
        .bind(request.sold_out)
        .bind(request.unlisted)
        .bind(Utc::now())
        .bind(name)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Item '{}'", name)));
        }

        tracing::info!(item = %name, "Item updated");
        self.get_item(name, true).await
    }

    pub async fn delete_item(&self, name: &str) -> StoreResult<()> {
        let item = self.get_item(name, true).await?;

        sqlx::query("DELETE FROM items WHERE name = ?")
            .bind(name)
            .execute(&self.db_pool)
            .await?;

        if let Some(image) = item.image.as_deref() {
            self.remove_image_file(image).await;
        }

        tracing::info!(item = %name, "Item deleted");
        Ok(())
    }

    /// Store an uploaded image and point the item at it
    pub async fn attach_image(&self, name: &str, filename: &str, bytes: &[u8]) -> StoreResult<Item> {
        let item = self.get_item(name, true).await?;

        if !Config::is_allowed_image(filename) {
            return Err(StoreError::Invalid(
                "File type not allowed. Allowed types: png, jpg, jpeg, gif, webp".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(StoreError::Invalid("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_file_size {
            return Err(StoreError::FileTooLarge(self.max_file_size));
        }

        let extension = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        let file_name = image_file_name(&item.name, extension, Utc::now().timestamp());
        let path = self.upload_folder.join(&file_name);

        tokio::fs::create_dir_all(&self.upload_folder)
            .await
            .map_err(|e| StoreError::Internal(format!("Cannot create upload folder: {}", e)))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::Internal(format!("Cannot store image: {}", e)))?;

        let image_url = format!("{}/{}", IMAGE_URL_PREFIX, file_name);
        sqlx::query("UPDATE items SET image = ?, updated_at = ? WHERE name = ?")
            .bind(&image_url)
            .bind(Utc::now())
            .bind(&item.name)
            .execute(&self.db_pool)
            .await?;

        if let Some(previous) = item.image.as_deref().filter(|p| *p != image_url) {
            self.remove_image_file(previous).await;
        }

        tracing::info!(item = %item.name, path = %path.display(), size = bytes.len(), "Item image stored");
        self.get_item(&item.name, true).await
    }

    async fn remove_image_file(&self, image_url: &str) {
        let Some(file_name) = image_url.rsplit('/').next().filter(|f| !f.is_empty()) else {
            return;
        };
        let path = self.upload_folder.join(file_name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!(path = %path.display(), error = %e, "Old image not removed");
        }
    }

    pub async fn check_availability(
        &self,
        lines: &[OrderLineRequest],
    ) -> StoreResult<AvailabilityResponse> {
        let merged = merge_lines(lines)?;
        let mut conn = self.db_pool.acquire().await?;
        let (_, insufficient) = assess_lines(&mut conn, &merged).await?;

        Ok(if insufficient.is_empty() {
            AvailabilityResponse {
                available: true,
                message: "All items are available".to_string(),
                insufficient,
            }
        } else {
            AvailabilityResponse {
                available: false,
                message: format!("Insufficient inventory for {} item(s)", insufficient.len()),
                insufficient,
            }
        })
    }
}
