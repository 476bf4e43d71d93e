//! Subscriptions between users.
//!
//! Following is strict: following yourself or someone you already follow
//! is rejected, and unfollowing someone you do not follow is NotFound.

use crate::db::entities::{follow, prelude::*, recipe, user};
use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr,
};
use std::collections::{HashMap, HashSet};
use tracing::info;

pub const DEFAULT_RECIPES_LIMIT: u64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("User not found: {0}")]
    AuthorNotFound(i32),
    #[error("You cannot subscribe to yourself.")]
    SelfFollow,
    #[error("You are already subscribed to this user.")]
    AlreadyFollowing,
    #[error("You are not subscribed to this user.")]
    NotFollowing,
}

/// A followed author with a preview of their newest recipes.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub author: user::Model,
    pub recipes: Vec<recipe::Model>,
    pub recipes_count: u64,
}

async fn find_author<C: ConnectionTrait>(
    conn: &C,
    author_id: i32,
) -> Result<user::Model, FollowError> {
    User::find_by_id(author_id)
        .one(conn)
        .await?
        .ok_or(FollowError::AuthorNotFound(author_id))
}

/// Subscribes `user_id` to `author_id` and returns the author.
pub async fn follow<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    author_id: i32,
) -> Result<user::Model, FollowError> {
    let author = find_author(conn, author_id).await?;
    if user_id == author_id {
        return Err(FollowError::SelfFollow);
    }
    if Follow::find_by_id((user_id, author_id)).one(conn).await?.is_some() {
        return Err(FollowError::AlreadyFollowing);
    }

    let edge = follow::ActiveModel {
        user_id: Set(user_id),
        author_id: Set(author_id),
        created_at: Set(Utc::now()),
    };
    match Follow::insert(edge).exec_without_returning(conn).await {
        Ok(_) => {}
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            return Err(FollowError::AlreadyFollowing);
        }
        Err(err) => return Err(err.into()),
    }

    info!(user_id, author_id, "User subscribed.");
    Ok(author)
}

pub async fn unfollow<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    author_id: i32,
) -> Result<(), FollowError> {
    find_author(conn, author_id).await?;
    let result = Follow::delete_many()
        .filter(follow::Column::UserId.eq(user_id))
        .filter(follow::Column::AuthorId.eq(author_id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(FollowError::NotFollowing);
    }

    info!(user_id, author_id, "User unsubscribed.");
    Ok(())
}

/// Subset of `author_ids` that `viewer` follows.
pub async fn followed_among<C: ConnectionTrait>(
    conn: &C,
    viewer: i32,
    author_ids: Vec<i32>,
) -> Result<HashSet<i32>, DbErr> {
    if author_ids.is_empty() {
        return Ok(HashSet::new());
    }
    Ok(Follow::find()
        .filter(follow::Column::UserId.eq(viewer))
        .filter(follow::Column::AuthorId.is_in(author_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|f| f.author_id)
        .collect())
}

/// Authors `user_id` follows, in subscription order, each with at most
/// `recipes_limit` of their newest recipes.
pub async fn list_subscriptions<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    recipes_limit: u64,
) -> Result<Vec<Subscription>, DbErr> {
    let edges = Follow::find()
        .filter(follow::Column::UserId.eq(user_id))
        .order_by_asc(follow::Column::CreatedAt)
        .all(conn)
        .await?;
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    let author_ids: Vec<i32> = edges.iter().map(|e| e.author_id).collect();
    let mut authors: HashMap<i32, user::Model> = User::find()
        .filter(user::Column::Id.is_in(author_ids.clone()))
        .all(conn)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let mut subscriptions = Vec::with_capacity(author_ids.len());
    for author_id in author_ids {
        if let Some(author) = authors.remove(&author_id) {
            subscriptions.push(load_subscription(conn, author, recipes_limit).await?);
        }
    }
    Ok(subscriptions)
}

/// `author` with their recipe count and at most `recipes_limit` of their
/// newest recipes.
pub async fn load_subscription<C: ConnectionTrait>(
    conn: &C,
    author: user::Model,
    recipes_limit: u64,
) -> Result<Subscription, DbErr> {
    let by_author = Recipe::find().filter(recipe::Column::AuthorId.eq(author.id));
    let recipes_count = by_author.clone().count(conn).await?;
    let recipes = by_author
        .order_by_desc(recipe::Column::PubDate)
        .order_by_desc(recipe::Column::Id)
        .limit(recipes_limit)
        .all(conn)
        .await?;
    Ok(Subscription {
        author,
        recipes,
        recipes_count,
    })
}

/// Parses the `recipes_limit` query value; anything that is not a
/// non-negative integer falls back to the default.
pub fn parse_recipes_limit(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RECIPES_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_support::test_db;
    use crate::db::services::test_fixtures::{insert_recipe, insert_user};

    #[tokio::test]
    async fn test_self_follow_always_fails() {
        let db = test_db().await;
        let alice = insert_user(&db, "alice").await;

        for _ in 0..2 {
            assert!(matches!(
                follow(&db, alice.id, alice.id).await,
                Err(FollowError::SelfFollow)
            ));
        }
        assert_eq!(Follow::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_follow_is_rejected() {
        let db = test_db().await;
        let alice = insert_user(&db, "alice").await;
        let bob = insert_user(&db, "bob").await;

        let author = follow(&db, alice.id, bob.id).await.unwrap();
        assert_eq!(author.id, bob.id);
        assert!(matches!(
            follow(&db, alice.id, bob.id).await,
            Err(FollowError::AlreadyFollowing)
        ));
        assert_eq!(Follow::find().count(&db).await.unwrap(), 1);

        // The reverse edge is a different pair.
        follow(&db, bob.id, alice.id).await.unwrap();
        assert_eq!(Follow::find().count(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unfollow_requires_existing_edge() {
        let db = test_db().await;
        let alice = insert_user(&db, "alice").await;
        let bob = insert_user(&db, "bob").await;

        assert!(matches!(
            unfollow(&db, alice.id, bob.id).await,
            Err(FollowError::NotFollowing)
        ));
        follow(&db, alice.id, bob.id).await.unwrap();
        unfollow(&db, alice.id, bob.id).await.unwrap();
        assert!(matches!(
            unfollow(&db, alice.id, bob.id).await,
            Err(FollowError::NotFollowing)
        ));
        assert!(matches!(
            follow(&db, alice.id, 999).await,
            Err(FollowError::AuthorNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_subscriptions_limit_recipes() {
        let db = test_db().await;
        let alice = insert_user(&db, "alice").await;
        let bob = insert_user(&db, "bob").await;
        for name in ["One", "Two", "Three", "Four"] {
            insert_recipe(&db, bob.id, name).await;
        }
        follow(&db, alice.id, bob.id).await.unwrap();

        let subscriptions = list_subscriptions(&db, alice.id, 2).await.unwrap();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].author.id, bob.id);
        assert_eq!(subscriptions[0].recipes_count, 4);
        assert_eq!(subscriptions[0].recipes.len(), 2);

        let followed = followed_among(&db, alice.id, vec![alice.id, bob.id]).await.unwrap();
        assert_eq!(followed, HashSet::from([bob.id]));
        assert!(list_subscriptions(&db, bob.id, 3).await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_recipes_limit() {
        assert_eq!(parse_recipes_limit(None), DEFAULT_RECIPES_LIMIT);
        assert_eq!(parse_recipes_limit(Some("5")), 5);
        assert_eq!(parse_recipes_limit(Some("abc")), DEFAULT_RECIPES_LIMIT);
        assert_eq!(parse_recipes_limit(Some("-1")), DEFAULT_RECIPES_LIMIT);
    }
}
