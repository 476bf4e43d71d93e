use axum::{
    Json, Router,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::db::services::{self, NewUser};
use crate::services::image_service::{AVATAR_FOLDER, media_url};
use crate::validation::FieldErrors;
use crate::web::models::AuthenticatedUser;
use crate::web::models::extract::{
    ImageUpload, JsonBody, REQUIRED_MESSAGE, is_multipart, multipart_error, multipart_rejection,
};
use crate::web::models::user_models::{
    AvatarRequest, AvatarResponse, RegisteredUserResponse, SubscriptionResponse, UserResponse,
};
use crate::web::{AppError, AppState};

const AVATAR_FIELD: &str = "avatar";

#[derive(Debug, Deserialize)]
pub struct RecipesLimitQuery {
    recipes_limit: Option<String>,
}

/// Avatar from either a JSON body (`{"avatar": "<data uri>"}`) or a
/// multipart form with an `avatar` file field. `None` when no avatar was sent.
pub struct AvatarUpload(Option<ImageUpload>);

impl<S: Send + Sync> FromRequest<S> for AvatarUpload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            let JsonBody(body) = JsonBody::<AvatarRequest>::from_request(req, state).await?;
            return Ok(AvatarUpload(
                body.avatar
                    .filter(|data_uri| !data_uri.trim().is_empty())
                    .map(ImageUpload::DataUri),
            ));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(multipart_rejection)?;
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() == Some(AVATAR_FIELD) {
                return Ok(AvatarUpload(Some(ImageUpload::from_field(field).await?)));
            }
        }
        Ok(AvatarUpload(None))
    }
}

// --- Route Handlers ---

async fn list_users_handler(
    State(app_state): State<Arc<AppState>>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = services::list_users(&app_state.db_pool).await?;
    let followed = match &viewer {
        Some(viewer) => {
            let ids = users.iter().map(|user| user.id).collect();
            services::followed_among(&app_state.db_pool, viewer.id, ids).await?
        }
        None => Default::default(),
    };
    Ok(Json(
        users
            .iter()
            .map(|user| {
                UserResponse::from_model(user, followed.contains(&user.id), app_state.base_url())
            })
            .collect(),
    ))
}

async fn register_user_handler(
    State(app_state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<NewUser>,
) -> Result<(StatusCode, Json<RegisteredUserResponse>), AppError> {
    let user = services::register_user(&app_state.db_pool, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn get_user_handler(
    State(app_state): State<Arc<AppState>>,
    viewer: Option<AuthenticatedUser>,
    Path(user_id): Path<i32>,
) -> Result<Json<UserResponse>, AppError> {
    let user = services::get_user(&app_state.db_pool, user_id).await?;
    let is_subscribed = match viewer {
        Some(viewer) => services::followed_among(&app_state.db_pool, viewer.id, vec![user.id])
            .await?
            .contains(&user.id),
        None => false,
    };
    Ok(Json(UserResponse::from_model(&user, is_subscribed, app_state.base_url())))
}

async fn me_handler(
    State(app_state): State<Arc<AppState>>,
    current: AuthenticatedUser,
) -> Result<Json<UserResponse>, AppError> {
    let user = services::get_user(&app_state.db_pool, current.id).await?;
    Ok(Json(UserResponse::from_model(&user, false, app_state.base_url())))
}

async fn get_avatar_handler(
    State(app_state): State<Arc<AppState>>,
    current: AuthenticatedUser,
) -> Result<Json<AvatarResponse>, AppError> {
    let user = services::get_user(&app_state.db_pool, current.id).await?;
    let avatar = UserResponse::from_model(&user, false, app_state.base_url()).avatar;
    Ok(Json(AvatarResponse { avatar }))
}

async fn set_avatar_handler(
    State(app_state): State<Arc<AppState>>,
    current: AuthenticatedUser,
    upload: AvatarUpload,
) -> Result<Json<AvatarResponse>, AppError> {
    let store = &app_state.image_store;
    let AvatarUpload(Some(upload)) = upload else {
        return Err(FieldErrors::single(AVATAR_FIELD, REQUIRED_MESSAGE).into());
    };
    let stored = upload
        .store(store, AVATAR_FOLDER)
        .await
        .map_err(|e| AppError::from_image(AVATAR_FIELD, e))?;

    let saved = services::set_avatar(&app_state.db_pool, current.id, Some(stored.clone())).await;
    let previous = match saved {
        Ok(previous) => previous,
        Err(e) => {
            if let Err(cleanup) = store.remove(&stored).await {
                warn!(path = %stored, error = %cleanup, "Failed to remove unsaved avatar.");
            }
            return Err(e.into());
        }
    };
    if let Some(previous) = previous {
        if let Err(e) = store.remove(&previous).await {
            warn!(path = %previous, error = %e, "Failed to remove replaced avatar.");
        }
    }

    Ok(Json(AvatarResponse {
        avatar: Some(media_url(app_state.base_url(), &stored)),
    }))
}

async fn delete_avatar_handler(
    State(app_state): State<Arc<AppState>>,
    current: AuthenticatedUser,
) -> Result<StatusCode, AppError> {
    let previous = services::set_avatar(&app_state.db_pool, current.id, None).await?;
    if let Some(previous) = previous {
        if let Err(e) = app_state.image_store.remove(&previous).await {
            warn!(path = %previous, error = %e, "Failed to remove deleted avatar.");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn subscriptions_handler(
    State(app_state): State<Arc<AppState>>,
    current: AuthenticatedUser,
    Query(query): Query<RecipesLimitQuery>,
) -> Result<Json<Vec<SubscriptionResponse>>, AppError> {
    let limit = services::parse_recipes_limit(query.recipes_limit.as_deref());
    let subscriptions = services::list_subscriptions(&app_state.db_pool, current.id, limit).await?;
    Ok(Json(
        subscriptions
            .iter()
            .map(|subscription| {
                SubscriptionResponse::from_subscription(subscription, app_state.base_url())
            })
            .collect(),
    ))
}

async fn subscribe_handler(
    State(app_state): State<Arc<AppState>>,
    current: AuthenticatedUser,
    Path(author_id): Path<i32>,
    Query(query): Query<RecipesLimitQuery>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), AppError> {
    let author = services::follow(&app_state.db_pool, current.id, author_id).await?;
    let limit = services::parse_recipes_limit(query.recipes_limit.as_deref());
    let subscription = services::load_subscription(&app_state.db_pool, author, limit).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from_subscription(&subscription, app_state.base_url())),
    ))
}

async fn unsubscribe_handler(
    State(app_state): State<Arc<AppState>>,
    current: AuthenticatedUser,
    Path(author_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    services::unfollow(&app_state.db_pool, current.id, author_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Router ---

pub fn create_user_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_users_handler).post(register_user_handler))
        .route("/me", get(me_handler))
        .route(
            "/me/avatar",
            get(get_avatar_handler)
                .put(set_avatar_handler)
                .post(set_avatar_handler)
                .patch(set_avatar_handler)
                .delete(delete_avatar_handler),
        )
        .route("/subscriptions", get(subscriptions_handler))
        .route("/{user_id}", get(get_user_handler))
        .route(
            "/{user_id}/subscribe",
            post(subscribe_handler).delete(unsubscribe_handler),
        )
}
