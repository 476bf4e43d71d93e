//! The `services` module provides the data-access API of the application.
//! It encapsulates all the SQL logic, so HTTP handlers and the seed commands
//! work with domain models without knowing the underlying schema or queries.
//!
//! Each sub-module owns one area (recipes, memberships, subscriptions, users,
//! catalog lookups, seeding). Their public items are re-exported here for
//! convenient access under `crate::db::services::`.

pub mod follow_service;
pub mod ingredient_service;
pub mod membership_service;
pub mod recipe_service;
pub mod seed_service;
pub mod shopping_list_service;
pub mod tag_service;
pub mod user_service;

pub use follow_service::*;
pub use ingredient_service::*;
pub use membership_service::*;
pub use recipe_service::*;
pub use seed_service::*;
pub use shopping_list_service::*;
pub use tag_service::*;
pub use user_service::*;

/// Row builders for service and router tests. Users are inserted directly,
/// bypassing password hashing.
#[cfg(test)]
pub(crate) mod test_fixtures {
    use crate::db::entities::{ingredient, recipe, tag, user};
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};

    pub async fn insert_user(db: &impl ConnectionTrait, username: &str) -> user::Model {
        user::ActiveModel {
            email: Set(format!("{username}@example.com")),
            username: Set(username.to_string()),
            first_name: Set("Test".to_string()),
            last_name: Set("User".to_string()),
            password_hash: Set("not-a-real-hash".to_string()),
            avatar: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    pub async fn insert_tag(db: &impl ConnectionTrait, name: &str, slug: &str) -> tag::Model {
        tag::ActiveModel {
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    pub async fn insert_ingredient(
        db: &impl ConnectionTrait,
        name: &str,
        unit: &str,
    ) -> ingredient::Model {
        ingredient::ActiveModel {
            name: Set(name.to_string()),
            measurement_unit: Set(unit.to_string()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    /// Bare recipe row without tag or ingredient links.
    pub async fn insert_recipe(
        db: &impl ConnectionTrait,
        author_id: i32,
        name: &str,
    ) -> recipe::Model {
        recipe::ActiveModel {
            author_id: Set(author_id),
            name: Set(name.to_string()),
            image: Set(format!("recipes/images/{}.png", name.to_lowercase())),
            text: Set("Cook it.".to_string()),
            cooking_time: Set(10),
            pub_date: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }
}
