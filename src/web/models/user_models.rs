use serde::{Deserialize, Serialize};

use crate::db::entities::user;
use crate::db::services::Subscription;
use crate::services::image_service::media_url;
use crate::web::models::recipe_models::RecipeShortResponse;

/// Public profile as seen by the requesting user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl UserResponse {
    pub fn from_model(user: &user::Model, is_subscribed: bool, base_url: &str) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
            avatar: user.avatar.as_deref().map(|path| media_url(base_url, path)),
        }
    }
}

/// Registration echo; never carries the password.
#[derive(Debug, Serialize)]
pub struct RegisteredUserResponse {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<user::Model> for RegisteredUserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub recipes: Vec<RecipeShortResponse>,
    pub recipes_count: u64,
}

impl SubscriptionResponse {
    /// Listed authors are followed by definition.
    pub fn from_subscription(subscription: &Subscription, base_url: &str) -> Self {
        Self {
            user: UserResponse::from_model(&subscription.author, true, base_url),
            recipes: subscription
                .recipes
                .iter()
                .map(|recipe| RecipeShortResponse::from_model(recipe, base_url))
                .collect(),
            recipes_count: subscription.recipes_count,
        }
    }
}
