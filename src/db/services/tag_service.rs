use crate::db::entities::{prelude::*, tag};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, QueryOrder};

// --- Tag Service Functions ---

/// All tags ordered by name.
pub async fn list_tags<C: ConnectionTrait>(conn: &C) -> Result<Vec<tag::Model>, DbErr> {
    Tag::find().order_by_asc(tag::Column::Name).all(conn).await
}

pub async fn get_tag<C: ConnectionTrait>(
    conn: &C,
    tag_id: i32,
) -> Result<Option<tag::Model>, DbErr> {
    Tag::find_by_id(tag_id).one(conn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_support::test_db;
    use crate::db::services::test_fixtures::insert_tag;

    #[tokio::test]
    async fn test_tags_are_listed_by_name() {
        let db = test_db().await;
        let lunch = insert_tag(&db, "Lunch", "lunch").await;
        insert_tag(&db, "Breakfast", "breakfast").await;

        let names: Vec<String> = list_tags(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["Breakfast", "Lunch"]);
        assert_eq!(get_tag(&db, lunch.id).await.unwrap(), Some(lunch));
        assert_eq!(get_tag(&db, 999).await.unwrap(), None);
    }
}
