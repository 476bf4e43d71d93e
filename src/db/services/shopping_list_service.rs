//! Shopping-list aggregation over a user's cart.

use crate::db::entities::{ingredient, prelude::*, recipe, recipe_ingredient, shopping_cart};
use sea_orm::sea_query::{Alias, Expr, Func};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QuerySelect, RelationTrait,
};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Total amount of one ingredient across every recipe in the cart.
#[derive(FromQueryResult, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

impl fmt::Display for ShoppingListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) — {}", self.name, self.measurement_unit, self.total_amount)
    }
}

/// Sums ingredient amounts over the user's cart, grouped by
/// `(name, unit)` and ordered by name. An empty cart yields an empty list.
pub async fn build_shopping_list<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<Vec<ShoppingListItem>, DbErr> {
    let mut items = ShoppingCart::find()
        .filter(shopping_cart::Column::UserId.eq(user_id))
        .select_only()
        .join(JoinType::InnerJoin, shopping_cart::Relation::Recipe.def())
        .join(JoinType::InnerJoin, recipe::Relation::RecipeIngredients.def())
        .join(JoinType::InnerJoin, recipe_ingredient::Relation::Ingredient.def())
        .column_as(ingredient::Column::Name, "name")
        .column_as(ingredient::Column::MeasurementUnit, "measurement_unit")
        .column_as(
            Expr::expr(Func::sum(Expr::col((
                RecipeIngredient,
                recipe_ingredient::Column::Amount,
            ))))
            .cast_as(Alias::new("bigint")),
            "total_amount",
        )
        .group_by(ingredient::Column::Name)
        .group_by(ingredient::Column::MeasurementUnit)
        .into_model::<ShoppingListItem>()
        .all(conn)
        .await?;

    // Ordinal order, whatever the database collation.
    items.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.measurement_unit.cmp(&b.measurement_unit))
    });

    debug!(user_id, lines = items.len(), "Shopping list built.");
    Ok(items)
}

/// Plain-text export: one `"<index>. <name> (<unit>) — <total>"` line per item.
pub fn render_plain_text(items: &[ShoppingListItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| format!("{}. {item}\n", index + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::test_support::test_db;
    use crate::db::services::membership_service::add_to_shopping_cart;
    use crate::db::services::recipe_service::{create_recipe, IngredientAmount, NewRecipe};
    use crate::db::services::test_fixtures::{insert_ingredient, insert_tag, insert_user};

    fn recipe_with(tag_id: i32, ingredients: Vec<IngredientAmount>) -> NewRecipe {
        NewRecipe {
            name: "Dish".to_string(),
            image: "recipes/images/dish.png".to_string(),
            text: "Cook it.".to_string(),
            cooking_time: 10,
            tags: vec![tag_id],
            ingredients,
        }
    }

    #[tokio::test]
    async fn test_amounts_are_summed_across_recipes() {
        let db = test_db().await;
        let cook = insert_user(&db, "cook").await;
        let shopper = insert_user(&db, "shopper").await;
        let tag = insert_tag(&db, "Lunch", "lunch").await;
        let salt = insert_ingredient(&db, "Salt", "g").await;
        let butter = insert_ingredient(&db, "Butter", "g").await;

        let first = create_recipe(
            &db,
            cook.id,
            recipe_with(
                tag.id,
                vec![
                    IngredientAmount { id: salt.id, amount: 5 },
                    IngredientAmount { id: butter.id, amount: 50 },
                ],
            ),
        )
        .await
        .unwrap();
        let second = create_recipe(
            &db,
            cook.id,
            recipe_with(tag.id, vec![IngredientAmount { id: salt.id, amount: 3 }]),
        )
        .await
        .unwrap();

        add_to_shopping_cart(&db, shopper.id, first.recipe.id).await.unwrap();
        add_to_shopping_cart(&db, shopper.id, second.recipe.id).await.unwrap();

        let items = build_shopping_list(&db, shopper.id).await.unwrap();
        assert_eq!(
            items,
            vec![
                ShoppingListItem {
                    name: "Butter".to_string(),
                    measurement_unit: "g".to_string(),
                    total_amount: 50,
                },
                ShoppingListItem {
                    name: "Salt".to_string(),
                    measurement_unit: "g".to_string(),
                    total_amount: 8,
                },
            ]
        );
        assert_eq!(items[1].to_string(), "Salt (g) — 8");

        // The author's own cart is untouched by the shopper's.
        assert!(build_shopping_list(&db, cook.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cart_yields_empty_list() {
        let db = test_db().await;
        let shopper = insert_user(&db, "shopper").await;

        let items = build_shopping_list(&db, shopper.id).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(render_plain_text(&items), "");
    }

    #[test]
    fn test_render_plain_text_numbers_lines() {
        let items = vec![
            ShoppingListItem {
                name: "Flour".to_string(),
                measurement_unit: "g".to_string(),
                total_amount: 500,
            },
            ShoppingListItem {
                name: "Milk".to_string(),
                measurement_unit: "ml".to_string(),
                total_amount: 250,
            },
        ];
        assert_eq!(
            render_plain_text(&items),
            "1. Flour (g) — 500\n2. Milk (ml) — 250\n"
        );
    }
}
