use crate::db::entities::{prelude::*, user};
use crate::services::auth_service;
use crate::validation::FieldErrors;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Deserialize;
use tracing::info;

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const NAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Path segment reserved for the current-user endpoints.
const RESERVED_USERNAME: &str = "me";

static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid username pattern"));
static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"));

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("User not found: {0}")]
    NotFound(i32),
    #[error("Invalid user: {0}")]
    Validation(FieldErrors),
    #[error("Password hashing failed: {0}")]
    PasswordHashing(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn validate_required(errors: &mut FieldErrors, field: &str, value: &str, max_length: usize) {
    if value.trim().is_empty() {
        errors.add(field, "This field may not be blank.");
    } else if value.chars().count() > max_length {
        errors.add(
            field,
            format!("Ensure this field has no more than {max_length} characters."),
        );
    }
}

impl NewUser {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        validate_required(&mut errors, "username", &self.username, USERNAME_MAX_LENGTH);
        if !self.username.is_empty() && !USERNAME_PATTERN.is_match(&self.username) {
            errors.add(
                "username",
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        if self.username.eq_ignore_ascii_case(RESERVED_USERNAME) {
            errors.add("username", format!("The username \"{}\" is reserved.", self.username));
        }

        validate_required(&mut errors, "email", &self.email, EMAIL_MAX_LENGTH);
        if !self.email.is_empty() && !EMAIL_PATTERN.is_match(&self.email) {
            errors.add("email", "Enter a valid email address.");
        }

        validate_required(&mut errors, "first_name", &self.first_name, NAME_MAX_LENGTH);
        validate_required(&mut errors, "last_name", &self.last_name, NAME_MAX_LENGTH);

        if self.password.chars().count() < PASSWORD_MIN_LENGTH {
            errors.add(
                "password",
                format!(
                    "This password is too short. It must contain at least {PASSWORD_MIN_LENGTH} characters."
                ),
            );
        }
        if self.password.to_lowercase() == self.username.to_lowercase() {
            errors.add("password", "The password is too similar to the username.");
        }

        errors.into_result()
    }
}

/// Validates, checks uniqueness of email and username, and stores the user
/// with a bcrypt hash of the password.
pub async fn register_user<C: ConnectionTrait>(
    conn: &C,
    new_user: NewUser,
) -> Result<user::Model, UserError> {
    new_user.validate().map_err(UserError::Validation)?;

    let mut errors = FieldErrors::new();
    let email_taken = User::find()
        .filter(user::Column::Email.eq(&new_user.email))
        .one(conn)
        .await?
        .is_some();
    if email_taken {
        errors.add("email", "A user with that email already exists.");
    }
    let username_taken = User::find()
        .filter(user::Column::Username.eq(&new_user.username))
        .one(conn)
        .await?
        .is_some();
    if username_taken {
        errors.add("username", "A user with that username already exists.");
    }
    errors.into_result().map_err(UserError::Validation)?;

    let password_hash = auth_service::hash_password(&new_user.password)?;

    let saved = user::ActiveModel {
        email: Set(new_user.email),
        username: Set(new_user.username),
        first_name: Set(new_user.first_name),
        last_name: Set(new_user.last_name),
        password_hash: Set(password_hash),
        avatar: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    info!(user_id = saved.id, username = %saved.username, "User registered.");
    Ok(saved)
}

pub async fn get_user<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<user::Model, UserError> {
    User::find_by_id(user_id)
        .one(conn)
        .await?
        .ok_or(UserError::NotFound(user_id))
}

pub async fn list_users<C: ConnectionTrait>(conn: &C) -> Result<Vec<user::Model>, DbErr> {
    User::find().order_by_asc(user::Column::Id).all(conn).await
}

/// Replaces the stored avatar path (or clears it with `None`) and returns
/// the previous one so the caller can release the file.
pub async fn set_avatar<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    avatar: Option<String>,
) -> Result<Option<String>, UserError> {
    let existing = get_user(conn, user_id).await?;
    let previous = existing.avatar.clone();

    let mut active: user::ActiveModel = existing.into();
    active.avatar = Set(avatar);
    active.update(conn).await?;

    info!(user_id, "Avatar updated.");
    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_support::test_db;
    use crate::db::services::test_fixtures::insert_user;

    fn candidate(username: &str, email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: username.to_string(),
            first_name: "Ivan".to_string(),
            last_name: "Petrov".to_string(),
            password: "correct-horse".to_string(),
        }
    }

    #[test]
    fn test_username_rules() {
        assert!(candidate("chef.ivan+1@home", "ivan@example.com").validate().is_ok());

        let errors = candidate("bad name!", "ivan@example.com").validate().unwrap_err();
        assert!(errors.contains("username"));

        let errors = candidate("me", "ivan@example.com").validate().unwrap_err();
        assert!(errors.contains("username"));
    }

    #[test]
    fn test_password_and_email_rules() {
        let mut weak = candidate("ivan", "not-an-email");
        weak.password = "short".to_string();
        let errors = weak.validate().unwrap_err();
        assert!(errors.contains("email"));
        assert!(errors.contains("password"));

        let mut same = candidate("ivanpetrov", "ivan@example.com");
        same.password = "ivanpetrov".to_string();
        let errors = same.validate().unwrap_err();
        assert_eq!(errors.messages("password"), ["The password is too similar to the username."]);

        let mut same_ignoring_case = candidate("IvanPetrov", "ivan@example.com");
        same_ignoring_case.password = "ivanPETROV".to_string();
        let errors = same_ignoring_case.validate().unwrap_err();
        assert_eq!(errors.messages("password"), ["The password is too similar to the username."]);
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_rejects_duplicates() {
        let db = test_db().await;
        insert_user(&db, "taken").await;

        let user = register_user(&db, candidate("ivan", "ivan@example.com")).await.unwrap();
        assert_ne!(user.password_hash, "correct-horse");
        assert!(auth_service::verify_password("correct-horse", &user.password_hash).unwrap());

        match register_user(&db, candidate("taken", "ivan@example.com")).await {
            Err(UserError::Validation(errors)) => {
                assert!(errors.contains("email"));
                assert!(errors.contains("username"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(list_users(&db).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_avatar_returns_previous_path() {
        let db = test_db().await;
        let user = insert_user(&db, "ivan").await;

        let previous = set_avatar(&db, user.id, Some("users/a.png".to_string())).await.unwrap();
        assert_eq!(previous, None);
        let previous = set_avatar(&db, user.id, Some("users/b.png".to_string())).await.unwrap();
        assert_eq!(previous.as_deref(), Some("users/a.png"));
        let previous = set_avatar(&db, user.id, None).await.unwrap();
        assert_eq!(previous.as_deref(), Some("users/b.png"));

        assert_eq!(get_user(&db, user.id).await.unwrap().avatar, None);
        assert!(matches!(get_user(&db, 999).await, Err(UserError::NotFound(999))));
    }
}
