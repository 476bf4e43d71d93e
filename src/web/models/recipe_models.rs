use serde::{Deserialize, Serialize};

use crate::db::entities::{ingredient, recipe, tag};
use crate::db::services::{IngredientAmount, RecipeDetails};
use crate::services::image_service::media_url;
use crate::web::models::user_models::UserResponse;

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub id: i32,
    pub name: String,
    pub slug: String,
}

impl From<tag::Model> for TagResponse {
    fn from(tag: tag::Model) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            slug: tag.slug,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngredientResponse {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
}

impl From<ingredient::Model> for IngredientResponse {
    fn from(ingredient: ingredient::Model) -> Self {
        Self {
            id: ingredient.id,
            name: ingredient.name,
            measurement_unit: ingredient.measurement_unit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeIngredientResponse {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i32,
    pub tags: Vec<TagResponse>,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredientResponse>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeResponse {
    pub fn from_details(details: RecipeDetails, base_url: &str) -> Self {
        let author =
            UserResponse::from_model(&details.author, details.author_is_subscribed, base_url);
        Self {
            id: details.recipe.id,
            tags: details.tags.into_iter().map(TagResponse::from).collect(),
            author,
            ingredients: details
                .ingredients
                .into_iter()
                .map(|item| RecipeIngredientResponse {
                    id: item.ingredient.id,
                    name: item.ingredient.name,
                    measurement_unit: item.ingredient.measurement_unit,
                    amount: item.amount,
                })
                .collect(),
            is_favorited: details.is_favorited,
            is_in_shopping_cart: details.is_in_shopping_cart,
            image: media_url(base_url, &details.recipe.image),
            name: details.recipe.name,
            text: details.recipe.text,
            cooking_time: details.recipe.cooking_time,
        }
    }
}

/// Compact form used by favorites, the cart and subscriptions.
#[derive(Debug, Serialize)]
pub struct RecipeShortResponse {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShortResponse {
    pub fn from_model(recipe: &recipe::Model, base_url: &str) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: media_url(base_url, &recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

/// JSON body of recipe create and update. Every field is optional here so
/// that a create request missing several fields reports all of them.
/// `image` is a base64 data URI.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeRequest {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<i32>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
}
