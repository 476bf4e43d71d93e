use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use std::sync::Arc;

use crate::db::services;
use crate::web::models::recipe_models::TagResponse;
use crate::web::{AppError, AppState};

// --- Route Handlers ---

async fn list_tags_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<TagResponse>>, AppError> {
    let tags = services::list_tags(&app_state.db_pool).await?;
    Ok(Json(tags.into_iter().map(TagResponse::from).collect()))
}

async fn get_tag_handler(
    State(app_state): State<Arc<AppState>>,
    Path(tag_id): Path<i32>,
) -> Result<Json<TagResponse>, AppError> {
    services::get_tag(&app_state.db_pool, tag_id)
        .await?
        .map(|tag| Json(TagResponse::from(tag)))
        .ok_or_else(|| AppError::NotFound("Tag not found.".to_string()))
}

// --- Router ---

pub fn create_tag_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tags_handler))
        .route("/{tag_id}", get(get_tag_handler))
}
