use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::services;
use crate::web::models::recipe_models::IngredientResponse;
use crate::web::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct IngredientListQuery {
    /// Name prefix.
    name: Option<String>,
}

// --- Route Handlers ---

async fn list_ingredients_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<IngredientListQuery>,
) -> Result<Json<Vec<IngredientResponse>>, AppError> {
    let ingredients = services::list_ingredients(&app_state.db_pool, query.name.as_deref()).await?;
    Ok(Json(ingredients.into_iter().map(IngredientResponse::from).collect()))
}

async fn get_ingredient_handler(
    State(app_state): State<Arc<AppState>>,
    Path(ingredient_id): Path<i32>,
) -> Result<Json<IngredientResponse>, AppError> {
    services::get_ingredient(&app_state.db_pool, ingredient_id)
        .await?
        .map(|ingredient| Json(IngredientResponse::from(ingredient)))
        .ok_or_else(|| AppError::NotFound("Ingredient not found.".to_string()))
}

// --- Router ---

pub fn create_ingredient_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_ingredients_handler))
        .route("/{ingredient_id}", get(get_ingredient_handler))
}
