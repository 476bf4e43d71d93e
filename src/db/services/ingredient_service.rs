use crate::db::entities::{ingredient, prelude::*};
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};

// --- Ingredient Service Functions ---

/// Ingredients ordered by name. With `name_prefix`, only names starting
/// with it (case-insensitively) are returned.
pub async fn list_ingredients<C: ConnectionTrait>(
    conn: &C,
    name_prefix: Option<&str>,
) -> Result<Vec<ingredient::Model>, DbErr> {
    let mut query = Ingredient::find();
    if let Some(prefix) = name_prefix.map(str::trim).filter(|p| !p.is_empty()) {
        let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
        query = query.filter(
            Expr::expr(Func::lower(Expr::col((Ingredient, ingredient::Column::Name))))
                .like(LikeExpr::new(pattern).escape('\\')),
        );
    }
    query.order_by_asc(ingredient::Column::Name).all(conn).await
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub async fn get_ingredient<C: ConnectionTrait>(
    conn: &C,
    ingredient_id: i32,
) -> Result<Option<ingredient::Model>, DbErr> {
    Ingredient::find_by_id(ingredient_id).one(conn).await
}

/// Ingredient with the exact `name`, if any.
pub async fn find_ingredient_by_name<C: ConnectionTrait>(
    conn: &C,
    name: &str,
) -> Result<Option<ingredient::Model>, DbErr> {
    Ingredient::find()
        .filter(ingredient::Column::Name.eq(name))
        .one(conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_support::test_db;
    use crate::db::services::test_fixtures::insert_ingredient;

    #[tokio::test]
    async fn test_prefix_filter_is_case_insensitive() {
        let db = test_db().await;
        insert_ingredient(&db, "Sugar", "g").await;
        insert_ingredient(&db, "Salt", "g").await;
        let milk = insert_ingredient(&db, "Milk", "ml").await;

        let all = list_ingredients(&db, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "Milk");

        let names: Vec<String> = list_ingredients(&db, Some("s"))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, ["Salt", "Sugar"]);

        assert!(list_ingredients(&db, Some("xyz")).await.unwrap().is_empty());
        assert_eq!(list_ingredients(&db, Some("  ")).await.unwrap().len(), 3);
        assert_eq!(find_ingredient_by_name(&db, "Milk").await.unwrap(), Some(milk.clone()));
        assert_eq!(get_ingredient(&db, milk.id).await.unwrap(), Some(milk));
    }

    #[tokio::test]
    async fn test_prefix_wildcards_are_literal() {
        let db = test_db().await;
        insert_ingredient(&db, "Salt", "g").await;
        insert_ingredient(&db, "50% cream", "ml").await;

        assert!(list_ingredients(&db, Some("s_")).await.unwrap().is_empty());
        assert!(list_ingredients(&db, Some("%")).await.unwrap().is_empty());
        let cream = list_ingredients(&db, Some("50%")).await.unwrap();
        assert_eq!(cream.len(), 1);
        assert_eq!(cream[0].name, "50% cream");
        assert_eq!(list_ingredients(&db, Some("SA")).await.unwrap()[0].name, "Salt");
    }
}
