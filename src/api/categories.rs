//! Category CRUD.

use axum::{Extension, Json, extract::State, http::StatusCode};

use super::dto::{
    CategoryResponse, CreateCategoryRequest, Data, SuccessResponse, UpdateCategoryRequest,
};
use super::error::ApiErrorResponse;
use super::extract::{ApiJson, ApiPath};
use super::handlers::AppState;
use crate::domain::{CategoryId, OwnerId};

/// Lists the caller's categories by name.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
pub async fn list_categories(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<Data<Vec<CategoryResponse>>>, ApiErrorResponse> {
    let categories = state.category_repository.list(&owner).await?;
    Ok(Json(Data::new(
        categories.into_iter().map(CategoryResponse::from).collect(),
    )))
}

/// Creates a category from `{"name": ..., "color": ...}`.
///
/// # Errors
///
/// - **400 Bad Request**: validation failure or store failure
pub async fn create_category(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(request): ApiJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Data<CategoryResponse>>), ApiErrorResponse> {
    let draft = request.into_draft()?;
    let category = state.category_repository.insert(&owner, draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(Data::new(CategoryResponse::from(category))),
    ))
}

/// Renames or recolours a category.
///
/// # Errors
///
/// - **400 Bad Request**: validation failure or store failure
/// - **404 Not Found**: the caller has no such category
pub async fn update_category(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateCategoryRequest>,
) -> Result<Json<Data<CategoryResponse>>, ApiErrorResponse> {
    let id = CategoryId::new(id);
    let patch = request.into_patch()?;
    let category = state
        .category_repository
        .update(&owner, id, &patch)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Category not found: {id}")))?;
    Ok(Json(Data::new(CategoryResponse::from(category))))
}

/// Deletes a category. Its todos become uncategorised.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
/// - **404 Not Found**: the caller has no such category
pub async fn delete_category(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Data<SuccessResponse>>, ApiErrorResponse> {
    let id = CategoryId::new(id);
    if state.category_repository.delete(&owner, id).await? {
        Ok(Json(Data::new(SuccessResponse::ok())))
    } else {
        Err(ApiErrorResponse::not_found(format!(
            "Category not found: {id}"
        )))
    }
}
