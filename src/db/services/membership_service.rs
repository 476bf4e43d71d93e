//! Favorite and shopping-cart membership markers.
//!
//! Both are idempotent: adding an existing pair and removing an absent
//! pair succeed without touching the store. The returned flag tells
//! whether a row was actually written or removed.

use crate::db::entities::{favorite, prelude::*, shopping_cart};
use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Recipe not found: {0}")]
    RecipeNotFound(i32),
}

async fn ensure_recipe_exists<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
) -> Result<(), MembershipError> {
    Recipe::find_by_id(recipe_id)
        .one(conn)
        .await?
        .map(|_| ())
        .ok_or(MembershipError::RecipeNotFound(recipe_id))
}

/// A concurrent insert of the same pair surfaces as a unique violation,
/// which means the pair is present.
fn absorb_duplicate(result: Result<u64, DbErr>) -> Result<bool, MembershipError> {
    match result {
        Ok(rows) => Ok(rows > 0),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn add_favorite<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    recipe_id: i32,
) -> Result<bool, MembershipError> {
    ensure_recipe_exists(conn, recipe_id).await?;
    if Favorite::find_by_id((user_id, recipe_id)).one(conn).await?.is_some() {
        return Ok(false);
    }

    let entry = favorite::ActiveModel {
        user_id: Set(user_id),
        recipe_id: Set(recipe_id),
        created_at: Set(Utc::now()),
    };
    let added = absorb_duplicate(Favorite::insert(entry).exec_without_returning(conn).await)?;
    debug!(user_id, recipe_id, added, "Favorite added.");
    Ok(added)
}

pub async fn remove_favorite<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    recipe_id: i32,
) -> Result<bool, MembershipError> {
    ensure_recipe_exists(conn, recipe_id).await?;
    let result = Favorite::delete_many()
        .filter(favorite::Column::UserId.eq(user_id))
        .filter(favorite::Column::RecipeId.eq(recipe_id))
        .exec(conn)
        .await?;
    debug!(user_id, recipe_id, removed = result.rows_affected, "Favorite removed.");
    Ok(result.rows_affected > 0)
}

pub async fn add_to_shopping_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    recipe_id: i32,
) -> Result<bool, MembershipError> {
    ensure_recipe_exists(conn, recipe_id).await?;
    if ShoppingCart::find_by_id((user_id, recipe_id)).one(conn).await?.is_some() {
        return Ok(false);
    }

    let entry = shopping_cart::ActiveModel {
        user_id: Set(user_id),
        recipe_id: Set(recipe_id),
        created_at: Set(Utc::now()),
    };
    let added = absorb_duplicate(ShoppingCart::insert(entry).exec_without_returning(conn).await)?;
    debug!(user_id, recipe_id, added, "Recipe added to shopping cart.");
    Ok(added)
}

pub async fn remove_from_shopping_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    recipe_id: i32,
) -> Result<bool, MembershipError> {
    ensure_recipe_exists(conn, recipe_id).await?;
    let result = ShoppingCart::delete_many()
        .filter(shopping_cart::Column::UserId.eq(user_id))
        .filter(shopping_cart::Column::RecipeId.eq(recipe_id))
        .exec(conn)
        .await?;
    debug!(
        user_id,
        recipe_id,
        removed = result.rows_affected,
        "Recipe removed from shopping cart."
    );
    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_support::test_db;
    use crate::db::services::test_fixtures::{insert_recipe, insert_user};
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn test_favorite_is_idempotent_both_ways() {
        let db = test_db().await;
        let author = insert_user(&db, "author").await;
        let fan = insert_user(&db, "fan").await;
        let recipe = insert_recipe(&db, author.id, "Soup").await;

        assert!(add_favorite(&db, fan.id, recipe.id).await.unwrap());
        assert!(!add_favorite(&db, fan.id, recipe.id).await.unwrap());
        assert_eq!(Favorite::find().count(&db).await.unwrap(), 1);

        assert!(remove_favorite(&db, fan.id, recipe.id).await.unwrap());
        // Removing an absent favorite keeps succeeding.
        assert!(!remove_favorite(&db, fan.id, recipe.id).await.unwrap());
        assert!(!remove_favorite(&db, fan.id, recipe.id).await.unwrap());
        assert_eq!(Favorite::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shopping_cart_toggle() {
        let db = test_db().await;
        let author = insert_user(&db, "author").await;
        let recipe = insert_recipe(&db, author.id, "Stew").await;

        assert!(add_to_shopping_cart(&db, author.id, recipe.id).await.unwrap());
        assert!(!add_to_shopping_cart(&db, author.id, recipe.id).await.unwrap());
        assert_eq!(ShoppingCart::find().count(&db).await.unwrap(), 1);
        assert!(remove_from_shopping_cart(&db, author.id, recipe.id).await.unwrap());
        assert!(!remove_from_shopping_cart(&db, author.id, recipe.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_recipe_is_reported() {
        let db = test_db().await;
        let user = insert_user(&db, "someone").await;

        assert!(matches!(
            add_favorite(&db, user.id, 404).await,
            Err(MembershipError::RecipeNotFound(404))
        ));
        assert!(matches!(
            remove_from_shopping_cart(&db, user.id, 404).await,
            Err(MembershipError::RecipeNotFound(404))
        ));
    }
}
