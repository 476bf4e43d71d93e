use axum::{
    Json, Router,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::Query;
use serde::{Deserialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::services::{
    self, IngredientAmount, NewRecipe, RecipeChanges, RecipeError, RecipeFilter,
};
use crate::services::image_service::RECIPE_IMAGE_FOLDER;
use crate::validation::FieldErrors;
use crate::web::models::AuthenticatedUser;
use crate::web::models::extract::{
    ImageUpload, JsonBody, REQUIRED_MESSAGE, is_multipart, multipart_error, multipart_rejection,
};
use crate::web::models::recipe_models::{RecipeRequest, RecipeResponse, RecipeShortResponse};
use crate::web::{AppError, AppState};

pub const SHOPPING_LIST_FILE_NAME: &str = "shopping_list.txt";

#[derive(Debug, Default, Deserialize)]
pub struct RecipeListQuery {
    #[serde(default)]
    tags: Vec<String>,
    author: Option<i32>,
    is_favorited: Option<String>,
    is_in_shopping_cart: Option<String>,
}

fn flag_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "True"))
}

impl RecipeListQuery {
    fn into_filter(self) -> RecipeFilter {
        RecipeFilter {
            tags: self.tags,
            author: self.author,
            is_favorited: flag_enabled(self.is_favorited.as_deref()),
            is_in_shopping_cart: flag_enabled(self.is_in_shopping_cart.as_deref()),
        }
    }
}

/// Recipe fields from a JSON body or a `multipart/form-data` form.
///
/// In a form, `image` is a file part (or a data URI value), `tags` and
/// `ingredients` are JSON values that may repeat, e.g. `tags=1`, `tags=[2,3]`,
/// `ingredients={"id":1,"amount":5}`.
#[derive(Debug, Default)]
pub struct RecipeSubmission {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<i32>>,
    pub image: Option<ImageUpload>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}

/// Every field a create request must carry.
pub struct CompleteRecipe {
    pub image: ImageUpload,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<i32>,
    pub ingredients: Vec<IngredientAmount>,
}

impl CompleteRecipe {
    fn into_new_recipe(self, image: String) -> NewRecipe {
        NewRecipe {
            name: self.name,
            image,
            text: self.text,
            cooking_time: self.cooking_time,
            tags: self.tags,
            ingredients: self.ingredients,
        }
    }
}

impl From<RecipeRequest> for RecipeSubmission {
    fn from(request: RecipeRequest) -> Self {
        Self {
            ingredients: request.ingredients,
            tags: request.tags,
            image: request.image.map(ImageUpload::DataUri),
            name: request.name,
            text: request.text,
            cooking_time: request.cooking_time,
        }
    }
}

impl RecipeSubmission {
    /// Reports every missing field at once.
    pub fn into_complete(self) -> Result<CompleteRecipe, FieldErrors> {
        let mut errors = FieldErrors::new();
        let present = [
            ("ingredients", self.ingredients.is_some()),
            ("tags", self.tags.is_some()),
            ("image", self.image.is_some()),
            ("name", self.name.is_some()),
            ("text", self.text.is_some()),
            ("cooking_time", self.cooking_time.is_some()),
        ];
        for (field, _) in present.iter().filter(|(_, is_present)| !is_present) {
            errors.add(field, REQUIRED_MESSAGE);
        }
        let (
            Some(image),
            Some(name),
            Some(text),
            Some(cooking_time),
            Some(tags),
            Some(ingredients),
        ) = (
            self.image,
            self.name,
            self.text,
            self.cooking_time,
            self.tags,
            self.ingredients,
        )
        else {
            return Err(errors);
        };
        Ok(CompleteRecipe {
            image,
            name,
            text,
            cooking_time,
            tags,
            ingredients,
        })
    }
}

/// Parses one form value holding either a single JSON item or an array.
fn parse_form_list<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, String> {
    let raw = raw.trim();
    let parsed = if raw.starts_with('[') {
        serde_json::from_str::<Vec<T>>(raw)
    } else {
        serde_json::from_str::<T>(raw).map(|item| vec![item])
    };
    parsed.map_err(|e| format!("Invalid value {raw:?}: {e}"))
}

async fn read_recipe_form(mut multipart: Multipart) -> Result<RecipeSubmission, AppError> {
    let mut submission = RecipeSubmission::default();
    let mut errors = FieldErrors::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "image" {
            submission.image = Some(ImageUpload::from_field(field).await?);
            continue;
        }
        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "name" => submission.name = Some(value),
            "text" => submission.text = Some(value),
            "cooking_time" => match value.trim().parse::<i32>() {
                Ok(cooking_time) => submission.cooking_time = Some(cooking_time),
                Err(_) => errors.add("cooking_time", "A valid integer is required."),
            },
            "tags" => match parse_form_list::<i32>(&value) {
                Ok(ids) => submission.tags.get_or_insert_with(Vec::new).extend(ids),
                Err(message) => errors.add("tags", message),
            },
            "ingredients" => match parse_form_list::<IngredientAmount>(&value) {
                Ok(items) => submission
                    .ingredients
                    .get_or_insert_with(Vec::new)
                    .extend(items),
                Err(message) => errors.add("ingredients", message),
            },
            _ => {}
        }
    }

    errors.into_result()?;
    Ok(submission)
}

impl<S: Send + Sync> FromRequest<S> for RecipeSubmission {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_multipart(&req) {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(multipart_rejection)?;
            return read_recipe_form(multipart).await;
        }
        let JsonBody(request) = JsonBody::<RecipeRequest>::from_request(req, state).await?;
        Ok(request.into())
    }
}

/// Best-effort cleanup of a stored image that is no longer referenced.
async fn discard_image(app_state: &AppState, path: &str) {
    if let Err(e) = app_state.image_store.remove(path).await {
        warn!(path, error = %e, "Failed to remove unreferenced image.");
    }
}

// --- Route Handlers ---

async fn list_recipes_handler(
    State(app_state): State<Arc<AppState>>,
    viewer: Option<AuthenticatedUser>,
    Query(query): Query<RecipeListQuery>,
) -> Result<Json<Vec<RecipeResponse>>, AppError> {
    let filter = query.into_filter();
    let recipes =
        services::list_recipes(&app_state.db_pool, &filter, viewer.map(|user| user.id)).await?;
    Ok(Json(
        recipes
            .into_iter()
            .map(|details| RecipeResponse::from_details(details, app_state.base_url()))
            .collect(),
    ))
}

async fn create_recipe_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    submission: RecipeSubmission,
) -> Result<(StatusCode, Json<RecipeResponse>), AppError> {
    let complete = submission.into_complete()?;
    let image = complete
        .image
        .store(&app_state.image_store, RECIPE_IMAGE_FOLDER)
        .await
        .map_err(|e| AppError::from_image("image", e))?;

    let new_recipe = complete.into_new_recipe(image.clone());
    match services::create_recipe(&app_state.db_pool, user.id, new_recipe).await {
        Ok(details) => Ok((
            StatusCode::CREATED,
            Json(RecipeResponse::from_details(details, app_state.base_url())),
        )),
        Err(e) => {
            discard_image(&app_state, &image).await;
            Err(e.into())
        }
    }
}

async fn get_recipe_handler(
    State(app_state): State<Arc<AppState>>,
    viewer: Option<AuthenticatedUser>,
    Path(recipe_id): Path<i32>,
) -> Result<Json<RecipeResponse>, AppError> {
    let details =
        services::get_recipe(&app_state.db_pool, recipe_id, viewer.map(|user| user.id)).await?;
    Ok(Json(RecipeResponse::from_details(details, app_state.base_url())))
}

async fn update_recipe_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(recipe_id): Path<i32>,
    payload: RecipeSubmission,
) -> Result<Json<RecipeResponse>, AppError> {
    // Ownership is checked before any new image is written.
    let existing = services::find_recipe(&app_state.db_pool, recipe_id).await?;
    if existing.author_id != user.id {
        return Err(RecipeError::Forbidden.into());
    }

    let new_image = match &payload.image {
        Some(upload) => Some(
            upload
                .store(&app_state.image_store, RECIPE_IMAGE_FOLDER)
                .await
                .map_err(|e| AppError::from_image("image", e))?,
        ),
        None => None,
    };

    let changes = RecipeChanges {
        name: payload.name,
        image: new_image.clone(),
        text: payload.text,
        cooking_time: payload.cooking_time,
        tags: payload.tags,
        ingredients: payload.ingredients,
    };

    match services::update_recipe(&app_state.db_pool, recipe_id, user.id, changes).await {
        Ok(details) => {
            if new_image.is_some() {
                discard_image(&app_state, &existing.image).await;
            }
            Ok(Json(RecipeResponse::from_details(details, app_state.base_url())))
        }
        Err(e) => {
            if let Some(path) = &new_image {
                discard_image(&app_state, path).await;
            }
            Err(e.into())
        }
    }
}

async fn delete_recipe_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(recipe_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    let deleted = services::delete_recipe(&app_state.db_pool, recipe_id, user.id).await?;
    discard_image(&app_state, &deleted.image).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(recipe_id): Path<i32>,
) -> Result<(StatusCode, Json<RecipeShortResponse>), AppError> {
    services::add_favorite(&app_state.db_pool, user.id, recipe_id).await?;
    let recipe = services::find_recipe(&app_state.db_pool, recipe_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecipeShortResponse::from_model(&recipe, app_state.base_url())),
    ))
}

async fn remove_favorite_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(recipe_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    services::remove_favorite(&app_state.db_pool, user.id, recipe_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_to_shopping_cart_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(recipe_id): Path<i32>,
) -> Result<(StatusCode, Json<RecipeShortResponse>), AppError> {
    services::add_to_shopping_cart(&app_state.db_pool, user.id, recipe_id).await?;
    let recipe = services::find_recipe(&app_state.db_pool, recipe_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(RecipeShortResponse::from_model(&recipe, app_state.base_url())),
    ))
}

async fn remove_from_shopping_cart_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(recipe_id): Path<i32>,
) -> Result<StatusCode, AppError> {
    services::remove_from_shopping_cart(&app_state.db_pool, user.id, recipe_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn download_shopping_cart_handler(
    State(app_state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let items = services::build_shopping_list(&app_state.db_pool, user.id).await?;
    info!(user_id = user.id, lines = items.len(), "Shopping list exported.");

    let disposition = format!("attachment; filename=\"{SHOPPING_LIST_FILE_NAME}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        services::render_plain_text(&items),
    ))
}

// --- Router ---

pub fn create_recipe_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_recipes_handler).post(create_recipe_handler))
        .route("/download_shopping_cart", get(download_shopping_cart_handler))
        .route(
            "/{recipe_id}",
            get(get_recipe_handler)
                .patch(update_recipe_handler)
                .delete(delete_recipe_handler),
        )
        .route(
            "/{recipe_id}/favorite",
            post(add_favorite_handler).delete(remove_favorite_handler),
        )
        .route(
            "/{recipe_id}/shopping_cart",
            post(add_to_shopping_cart_handler).delete(remove_from_shopping_cart_handler),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_flags() {
        let filter = RecipeListQuery {
            tags: vec!["lunch".to_string()],
            is_favorited: Some("1".to_string()),
            is_in_shopping_cart: Some("0".to_string()),
            ..Default::default()
        }
        .into_filter();

        assert_eq!(filter.tags, ["lunch"]);
        assert!(filter.is_favorited);
        assert!(!filter.is_in_shopping_cart);
        assert_eq!(filter.author, None);
    }

    #[test]
    fn test_incomplete_submission_lists_missing_fields() {
        let submission = RecipeSubmission {
            name: Some("Soup".to_string()),
            tags: Some(vec![1]),
            ..Default::default()
        };
        let errors = match submission.into_complete() {
            Err(errors) => errors,
            Ok(_) => panic!("expected missing fields"),
        };
        for field in ["ingredients", "image", "text", "cooking_time"] {
            assert_eq!(errors.messages(field), [REQUIRED_MESSAGE]);
        }
        assert!(!errors.contains("name"));
        assert!(!errors.contains("tags"));
    }

    #[test]
    fn test_form_lists_accept_one_item_or_array() {
        assert_eq!(parse_form_list::<i32>("3").unwrap(), [3]);
        assert_eq!(parse_form_list::<i32>(" [1, 2] ").unwrap(), [1, 2]);
        let items = parse_form_list::<IngredientAmount>(r#"{"id": 4, "amount": 10}"#).unwrap();
        assert_eq!(items, [IngredientAmount { id: 4, amount: 10 }]);
        assert!(parse_form_list::<i32>("two").is_err());
    }
}
