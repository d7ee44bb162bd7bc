//! Catalog and review handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use super::{AdminUser, OptionalUser};
use crate::error::ApiError;
use crate::models::{
    AvailabilityRequest, AvailabilityResponse, CreateItemRequest, CreateReviewRequest, Item,
    ItemListQuery, Review, UpdateItemRequest,
};
use crate::state::AppState;

/// GET /api/items - Listed items; admins may add `include_unlisted=true`
pub async fn list_items(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<ItemListQuery>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let is_admin = user.map(|u| u.is_admin).unwrap_or(false);
    let items = state
        .catalog_service
        .list_items(query.include_unlisted && is_admin)
        .await?;

    Ok(Json(items))
}

/// GET /api/items/:name
pub async fn get_item(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Path(name): Path<String>,
) -> Result<Json<Item>, ApiError> {
    let is_admin = user.map(|u| u.is_admin).unwrap_or(false);
    let item = state.catalog_service.get_item(&name, is_admin).await?;
    Ok(Json(item))
}

/// POST /api/items
pub async fn create_item(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    req.validate()?;

    let item = state.catalog_service.create_item(req).await?;
    tracing::info!(item = %item.name, admin = %admin.username, "Catalog item added");

    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /api/items/:name
pub async fn update_item(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(name): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<Item>, ApiError> {
    req.validate()?;
    let item = state.catalog_service.update_item(&name, req).await?;
    Ok(Json(item))
}

/// DELETE /api/items/:name
pub async fn delete_item(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog_service.delete_item(&name).await?;
    tracing::info!(item = %name, admin = %admin.username, "Catalog item removed");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/items/:name/image - multipart form with an `image` field
pub async fn upload_image(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(name): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Item>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ApiError::BadRequest("No file selected".to_string()))?;

        let bytes = field.bytes().await.map_err(|e| {
            ApiError::PayloadTooLarge(format!(
                "Upload rejected (max {} bytes): {}",
                state.catalog_service.max_file_size(),
                e
            ))
        })?;

        let item = state
            .catalog_service
            .attach_image(&name, &filename, &bytes)
            .await?;
        return Ok(Json(item));
    }

    Err(ApiError::BadRequest("Missing 'image' field".to_string()))
}

/// POST /api/items/availability
pub async fn check_availability(
    State(state): State<AppState>,
    Json(req): Json<AvailabilityRequest>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    req.validate()?;
    let report = state.catalog_service.check_availability(&req.items).await?;
    Ok(Json(report))
}

/// GET /api/items/:name/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Review>>, ApiError> {
    let reviews = state.review_service.list_reviews(&name).await?;
    Ok(Json(reviews))
}

/// POST /api/items/:name/reviews - signed-in users are credited, others post anonymously
pub async fn add_review(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Path(name): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    req.validate()?;

    let review = state
        .review_service
        .add_review(
            &name,
            user.as_ref().map(|u| u.username.as_str()),
            req.rating,
            &req.review_text,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(review)))
}

/// DELETE /api/items/:name/reviews/:id
pub async fn delete_review(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path((name, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    state.review_service.delete_review(&name, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
