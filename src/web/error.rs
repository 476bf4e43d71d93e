use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::services::{FollowError, MembershipError, RecipeError, UserError};
use crate::services::image_service::ImageError;
use crate::validation::FieldErrors;

/// Field name used for errors that do not belong to a single input field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(errors) => {
                return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::PasswordHashingError(msg) => {
                error!(error = %msg, "Password hashing failed.");
                (StatusCode::INTERNAL_SERVER_ERROR, "Password hashing error.".to_string())
            }
            AppError::DatabaseError(msg) => {
                error!(error = %msg, "Database error while handling request.");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error.".to_string())
            }
            AppError::InternalServerError(msg) => {
                error!(error = %msg, "Internal error while handling request.");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": error_message }))).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<RecipeError> for AppError {
    fn from(err: RecipeError) -> Self {
        match err {
            RecipeError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            RecipeError::NotFound(_) => AppError::NotFound("Recipe not found.".to_string()),
            RecipeError::Forbidden => {
                AppError::Forbidden("You do not have permission to modify this recipe.".to_string())
            }
            RecipeError::Validation(errors) => AppError::Validation(errors),
        }
    }
}

impl From<MembershipError> for AppError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            MembershipError::RecipeNotFound(_) => {
                AppError::NotFound("Recipe not found.".to_string())
            }
        }
    }
}

impl From<FollowError> for AppError {
    fn from(err: FollowError) -> Self {
        match err {
            FollowError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            FollowError::AuthorNotFound(_) => AppError::NotFound("User not found.".to_string()),
            FollowError::NotFollowing => AppError::NotFound(err.to_string()),
            FollowError::SelfFollow | FollowError::AlreadyFollowing => {
                AppError::Validation(FieldErrors::single(NON_FIELD_ERRORS, err.to_string()))
            }
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::DbErr(e) => AppError::DatabaseError(e.to_string()),
            UserError::NotFound(_) => AppError::NotFound("User not found.".to_string()),
            UserError::Validation(errors) => AppError::Validation(errors),
            UserError::PasswordHashing(e) => AppError::PasswordHashingError(e.to_string()),
        }
    }
}

impl AppError {
    /// Maps an image failure onto the request field that carried the image.
    pub fn from_image(field: &str, err: ImageError) -> Self {
        match err {
            ImageError::Io(e) => {
                AppError::InternalServerError(format!("Failed to store image: {e}"))
            }
            other => AppError::Validation(FieldErrors::single(field, other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_renders_field_map() {
        let (status, body) = render(FieldErrors::single("cooking_time", "Too small.").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "cooking_time": ["Too small."] }));
    }

    #[tokio::test]
    async fn test_service_errors_map_to_statuses() {
        let (status, body) = render(RecipeError::NotFound(3).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Recipe not found.");

        let (status, _) = render(RecipeError::Forbidden.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = render(FollowError::SelfFollow.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body[NON_FIELD_ERRORS][0], "You cannot subscribe to yourself.");

        let (status, _) = render(FollowError::NotFollowing.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = render(AppError::DatabaseError("connection reset".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database error.");
    }

    #[tokio::test]
    async fn test_image_errors_are_field_errors() {
        let (status, body) = render(AppError::from_image("image", ImageError::Empty)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["image"][0], "The submitted file is empty.");
    }
}
