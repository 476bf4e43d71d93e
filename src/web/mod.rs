use axum::{
    Router,
    http::Method,
    middleware as axum_middleware,
    routing::get,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::server::config::ServerConfig;
use crate::services::image_service::ImageStore;
use crate::web::{middleware::auth, routes::*};

pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;


pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabaseConnection,
    pub image_store: Arc<ImageStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn base_url(&self) -> &str {
        &self.config.public_base_url
    }
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(db_pool: DatabaseConnection, config: Arc<ServerConfig>) -> Router {
    let image_store = Arc::new(ImageStore::new(&config.media_dir));
    let media_service = ServeDir::new(&config.media_dir);

    let app_state = Arc::new(AppState {
        db_pool,
        image_store,
        config,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest(
            "/api/recipes",
            recipe_routes::create_recipe_router()
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
        )
        .nest("/api/tags", tag_routes::create_tag_router())
        .nest("/api/ingredients", ingredient_routes::create_ingredient_router())
        .nest(
            "/api/users",
            user_routes::create_user_router()
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::auth)),
        )
        .nest_service("/media", media_service)
        .with_state(app_state)
        .layer(cors)
}
