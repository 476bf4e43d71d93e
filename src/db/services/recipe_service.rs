//! Recipe authoring.
//!
//! A recipe owns two link collections: its tag set (`recipe_tags`) and its
//! ingredient-with-amount set (`recipe_ingredients`). Writes touching a
//! recipe and its links run in one transaction, and links are always
//! replaced wholesale (delete then insert), never patched.

use crate::db::entities::{
    favorite, follow, ingredient, prelude::*, recipe, recipe_ingredient, recipe_tag,
    shopping_cart, tag, user,
};
use crate::validation::FieldErrors;
use chrono::Utc;
use futures::try_join;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub const RECIPE_NAME_MAX_LENGTH: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("Recipe not found: {0}")]
    NotFound(i32),
    #[error("Only the author may modify this recipe")]
    Forbidden,
    #[error("Invalid recipe: {0}")]
    Validation(FieldErrors),
}

/// One `(ingredient, amount)` pair of a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IngredientAmount {
    pub id: i32,
    pub amount: i32,
}

/// Input of [`create_recipe`]. `image` is the stored media path.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<i32>,
    pub ingredients: Vec<IngredientAmount>,
}

/// Input of [`update_recipe`]. `None` leaves the attribute or collection untouched.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub image: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub tags: Option<Vec<i32>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeIngredientDetails {
    pub ingredient: ingredient::Model,
    pub amount: i32,
}

/// A recipe with author, tags and ingredients resolved, plus the flags
/// relative to the viewer the details were loaded for.
#[derive(Debug, Clone)]
pub struct RecipeDetails {
    pub recipe: recipe::Model,
    pub author: user::Model,
    pub tags: Vec<tag::Model>,
    pub ingredients: Vec<RecipeIngredientDetails>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub author_is_subscribed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub author: Option<i32>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

// --- Validation ---

fn validate_name(errors: &mut FieldErrors, name: &str) {
    if name.trim().is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if name.chars().count() > RECIPE_NAME_MAX_LENGTH {
        errors.add(
            "name",
            format!("Ensure this field has no more than {RECIPE_NAME_MAX_LENGTH} characters."),
        );
    }
}

fn validate_text(errors: &mut FieldErrors, text: &str) {
    if text.trim().is_empty() {
        errors.add("text", "This field may not be blank.");
    }
}

fn validate_image(errors: &mut FieldErrors, image: &str) {
    if image.is_empty() {
        errors.add("image", "No file was submitted.");
    }
}

fn validate_cooking_time(errors: &mut FieldErrors, cooking_time: i32) {
    if cooking_time < 1 {
        errors.add("cooking_time", "Ensure this value is greater than or equal to 1.");
    }
}

fn validate_tags(errors: &mut FieldErrors, tags: &[i32]) {
    if tags.is_empty() {
        errors.add("tags", "This list may not be empty.");
        return;
    }
    let mut seen = HashSet::new();
    for id in tags {
        if !seen.insert(*id) {
            errors.add("tags", format!("Tag {id} is listed more than once."));
        }
    }
}

fn validate_ingredients(errors: &mut FieldErrors, ingredients: &[IngredientAmount]) {
    if ingredients.is_empty() {
        errors.add("ingredients", "This list may not be empty.");
        return;
    }
    let mut seen = HashSet::new();
    for item in ingredients {
        if item.amount < 1 {
            errors.add(
                "ingredients",
                format!("Amount of ingredient {} must be greater than or equal to 1.", item.id),
            );
        }
        if !seen.insert(item.id) {
            errors.add(
                "ingredients",
                format!("Ingredient {} is listed more than once.", item.id),
            );
        }
    }
}

impl NewRecipe {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        validate_name(&mut errors, &self.name);
        validate_image(&mut errors, &self.image);
        validate_text(&mut errors, &self.text);
        validate_cooking_time(&mut errors, self.cooking_time);
        validate_tags(&mut errors, &self.tags);
        validate_ingredients(&mut errors, &self.ingredients);
        errors.into_result()
    }
}

impl RecipeChanges {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            validate_name(&mut errors, name);
        }
        if let Some(image) = &self.image {
            validate_image(&mut errors, image);
        }
        if let Some(text) = &self.text {
            validate_text(&mut errors, text);
        }
        if let Some(cooking_time) = self.cooking_time {
            validate_cooking_time(&mut errors, cooking_time);
        }
        if let Some(tags) = &self.tags {
            validate_tags(&mut errors, tags);
        }
        if let Some(ingredients) = &self.ingredients {
            validate_ingredients(&mut errors, ingredients);
        }
        errors.into_result()
    }
}

// --- Link resolution and replacement ---

/// Reports every id in `tags` / `ingredients` that has no row.
async fn ensure_references_exist<C: ConnectionTrait>(
    conn: &C,
    tags: Option<&[i32]>,
    ingredients: Option<&[IngredientAmount]>,
) -> Result<(), RecipeError> {
    let mut errors = FieldErrors::new();

    if let Some(tag_ids) = tags {
        let found: HashSet<i32> = Tag::find()
            .filter(tag::Column::Id.is_in(tag_ids.to_vec()))
            .all(conn)
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();
        for id in tag_ids.iter().filter(|id| !found.contains(*id)) {
            errors.add("tags", format!("Tag {id} does not exist."));
        }
    }

    if let Some(items) = ingredients {
        let ids: Vec<i32> = items.iter().map(|i| i.id).collect();
        let found: HashSet<i32> = Ingredient::find()
            .filter(ingredient::Column::Id.is_in(ids.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|i| i.id)
            .collect();
        for id in ids.iter().filter(|id| !found.contains(*id)) {
            errors.add("ingredients", format!("Ingredient {id} does not exist."));
        }
    }

    errors.into_result().map_err(RecipeError::Validation)
}

async fn replace_tags<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
    tag_ids: &[i32],
) -> Result<(), DbErr> {
    RecipeTag::delete_many()
        .filter(recipe_tag::Column::RecipeId.eq(recipe_id))
        .exec(conn)
        .await?;
    if tag_ids.is_empty() {
        return Ok(());
    }
    let links = tag_ids.iter().map(|tag_id| recipe_tag::ActiveModel {
        recipe_id: Set(recipe_id),
        tag_id: Set(*tag_id),
    });
    RecipeTag::insert_many(links).exec_without_returning(conn).await?;
    Ok(())
}

async fn replace_ingredients<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
    ingredients: &[IngredientAmount],
) -> Result<(), DbErr> {
    RecipeIngredient::delete_many()
        .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
        .exec(conn)
        .await?;
    if ingredients.is_empty() {
        return Ok(());
    }
    let links = ingredients.iter().map(|item| recipe_ingredient::ActiveModel {
        recipe_id: Set(recipe_id),
        ingredient_id: Set(item.id),
        amount: Set(item.amount),
    });
    RecipeIngredient::insert_many(links)
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

// --- Hydration ---

/// Resolves authors, tags, ingredients and viewer flags for `recipes`,
/// preserving their order.
pub async fn load_recipe_details<C: ConnectionTrait>(
    conn: &C,
    recipes: Vec<recipe::Model>,
    viewer: Option<i32>,
) -> Result<Vec<RecipeDetails>, DbErr> {
    if recipes.is_empty() {
        return Ok(Vec::new());
    }

    let recipe_ids: Vec<i32> = recipes.iter().map(|r| r.id).collect();
    let author_ids: Vec<i32> = recipes
        .iter()
        .map(|r| r.author_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let authors_future = User::find()
        .filter(user::Column::Id.is_in(author_ids.clone()))
        .all(conn);
    let tags_future = RecipeTag::find()
        .filter(recipe_tag::Column::RecipeId.is_in(recipe_ids.clone()))
        .find_also_related(Tag)
        .all(conn);
    let ingredients_future = RecipeIngredient::find()
        .filter(recipe_ingredient::Column::RecipeId.is_in(recipe_ids.clone()))
        .find_also_related(Ingredient)
        .all(conn);

    let (authors, tag_links, ingredient_links) =
        try_join!(authors_future, tags_future, ingredients_future)?;

    let authors: HashMap<i32, user::Model> = authors.into_iter().map(|u| (u.id, u)).collect();

    let mut tag_map: HashMap<i32, Vec<tag::Model>> = HashMap::new();
    for (link, tag) in tag_links {
        if let Some(tag) = tag {
            tag_map.entry(link.recipe_id).or_default().push(tag);
        }
    }

    let mut ingredient_map: HashMap<i32, Vec<RecipeIngredientDetails>> = HashMap::new();
    for (link, ingredient) in ingredient_links {
        if let Some(ingredient) = ingredient {
            ingredient_map
                .entry(link.recipe_id)
                .or_default()
                .push(RecipeIngredientDetails {
                    ingredient,
                    amount: link.amount,
                });
        }
    }

    let (favorited, in_cart, subscribed) = match viewer {
        Some(user_id) => {
            let favorites = Favorite::find()
                .filter(favorite::Column::UserId.eq(user_id))
                .filter(favorite::Column::RecipeId.is_in(recipe_ids.clone()))
                .all(conn)
                .await?;
            let carts = ShoppingCart::find()
                .filter(shopping_cart::Column::UserId.eq(user_id))
                .filter(shopping_cart::Column::RecipeId.is_in(recipe_ids.clone()))
                .all(conn)
                .await?;
            let follows = Follow::find()
                .filter(follow::Column::UserId.eq(user_id))
                .filter(follow::Column::AuthorId.is_in(author_ids))
                .all(conn)
                .await?;
            (
                favorites.into_iter().map(|f| f.recipe_id).collect::<HashSet<_>>(),
                carts.into_iter().map(|c| c.recipe_id).collect::<HashSet<_>>(),
                follows.into_iter().map(|f| f.author_id).collect::<HashSet<_>>(),
            )
        }
        None => (HashSet::new(), HashSet::new(), HashSet::new()),
    };

    let mut details = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let author = authors
            .get(&recipe.author_id)
            .cloned()
            .ok_or_else(|| {
                DbErr::RecordNotFound(format!(
                    "author {} of recipe {}",
                    recipe.author_id, recipe.id
                ))
            })?;
        let mut tags = tag_map.remove(&recipe.id).unwrap_or_default();
        tags.sort_by_key(|t| t.id);
        let mut ingredients = ingredient_map.remove(&recipe.id).unwrap_or_default();
        ingredients.sort_by(|a, b| a.ingredient.name.cmp(&b.ingredient.name));

        details.push(RecipeDetails {
            is_favorited: favorited.contains(&recipe.id),
            is_in_shopping_cart: in_cart.contains(&recipe.id),
            author_is_subscribed: subscribed.contains(&recipe.author_id),
            recipe,
            author,
            tags,
            ingredients,
        });
    }
    Ok(details)
}

// --- Operations ---

pub async fn create_recipe(
    db: &DatabaseConnection,
    author_id: i32,
    new_recipe: NewRecipe,
) -> Result<RecipeDetails, RecipeError> {
    new_recipe.validate().map_err(RecipeError::Validation)?;

    let txn = db.begin().await?;

    ensure_references_exist(
        &txn,
        Some(new_recipe.tags.as_slice()),
        Some(new_recipe.ingredients.as_slice()),
    )
    .await?;

    let saved = recipe::ActiveModel {
        author_id: Set(author_id),
        name: Set(new_recipe.name),
        image: Set(new_recipe.image),
        text: Set(new_recipe.text),
        cooking_time: Set(new_recipe.cooking_time),
        pub_date: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    replace_tags(&txn, saved.id, &new_recipe.tags).await?;
    replace_ingredients(&txn, saved.id, &new_recipe.ingredients).await?;

    txn.commit().await?;
    info!(recipe_id = saved.id, author_id, "Recipe created.");

    get_recipe(db, saved.id, Some(author_id)).await
}

pub async fn update_recipe(
    db: &DatabaseConnection,
    recipe_id: i32,
    editor_id: i32,
    changes: RecipeChanges,
) -> Result<RecipeDetails, RecipeError> {
    changes.validate().map_err(RecipeError::Validation)?;

    let txn = db.begin().await?;

    let existing = Recipe::find_by_id(recipe_id)
        .one(&txn)
        .await?
        .ok_or(RecipeError::NotFound(recipe_id))?;
    if existing.author_id != editor_id {
        return Err(RecipeError::Forbidden);
    }

    ensure_references_exist(&txn, changes.tags.as_deref(), changes.ingredients.as_deref()).await?;

    let mut active: recipe::ActiveModel = existing.into();
    if let Some(name) = changes.name {
        active.name = Set(name);
    }
    if let Some(image) = changes.image {
        active.image = Set(image);
    }
    if let Some(text) = changes.text {
        active.text = Set(text);
    }
    if let Some(cooking_time) = changes.cooking_time {
        active.cooking_time = Set(cooking_time);
    }
    if active.is_changed() {
        active.update(&txn).await?;
    }

    if let Some(tags) = &changes.tags {
        replace_tags(&txn, recipe_id, tags).await?;
    }
    if let Some(ingredients) = &changes.ingredients {
        replace_ingredients(&txn, recipe_id, ingredients).await?;
    }

    txn.commit().await?;
    info!(recipe_id, editor_id, "Recipe updated.");

    get_recipe(db, recipe_id, Some(editor_id)).await
}

/// Removes the recipe and every row referencing it. Returns the deleted
/// row so the caller can release its image.
pub async fn delete_recipe(
    db: &DatabaseConnection,
    recipe_id: i32,
    editor_id: i32,
) -> Result<recipe::Model, RecipeError> {
    let txn = db.begin().await?;

    let existing = Recipe::find_by_id(recipe_id)
        .one(&txn)
        .await?
        .ok_or(RecipeError::NotFound(recipe_id))?;
    if existing.author_id != editor_id {
        return Err(RecipeError::Forbidden);
    }

    RecipeTag::delete_many()
        .filter(recipe_tag::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    RecipeIngredient::delete_many()
        .filter(recipe_ingredient::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    Favorite::delete_many()
        .filter(favorite::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    ShoppingCart::delete_many()
        .filter(shopping_cart::Column::RecipeId.eq(recipe_id))
        .exec(&txn)
        .await?;
    existing.clone().delete(&txn).await?;

    txn.commit().await?;
    info!(recipe_id, editor_id, "Recipe deleted.");
    Ok(existing)
}

/// The bare recipe row.
pub async fn find_recipe<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
) -> Result<recipe::Model, RecipeError> {
    Recipe::find_by_id(recipe_id)
        .one(conn)
        .await?
        .ok_or(RecipeError::NotFound(recipe_id))
}

pub async fn get_recipe<C: ConnectionTrait>(
    conn: &C,
    recipe_id: i32,
    viewer: Option<i32>,
) -> Result<RecipeDetails, RecipeError> {
    let recipe = find_recipe(conn, recipe_id).await?;
    load_recipe_details(conn, vec![recipe], viewer)
        .await?
        .pop()
        .ok_or(RecipeError::NotFound(recipe_id))
}

/// Recipes matching `filter`, newest first. The favorite and cart filters
/// are ignored for anonymous viewers.
pub async fn list_recipes<C: ConnectionTrait>(
    conn: &C,
    filter: &RecipeFilter,
    viewer: Option<i32>,
) -> Result<Vec<RecipeDetails>, DbErr> {
    let mut query = Recipe::find();

    if !filter.tags.is_empty() {
        let tagged: HashSet<i32> = RecipeTag::find()
            .inner_join(Tag)
            .filter(tag::Column::Slug.is_in(filter.tags.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|link| link.recipe_id)
            .collect();
        query = query.filter(recipe::Column::Id.is_in(tagged));
    }

    if let Some(author_id) = filter.author {
        query = query.filter(recipe::Column::AuthorId.eq(author_id));
    }

    if let Some(user_id) = viewer {
        if filter.is_favorited {
            let ids: Vec<i32> = Favorite::find()
                .filter(favorite::Column::UserId.eq(user_id))
                .all(conn)
                .await?
                .into_iter()
                .map(|f| f.recipe_id)
                .collect();
            query = query.filter(recipe::Column::Id.is_in(ids));
        }
        if filter.is_in_shopping_cart {
            let ids: Vec<i32> = ShoppingCart::find()
                .filter(shopping_cart::Column::UserId.eq(user_id))
                .all(conn)
                .await?
                .into_iter()
                .map(|c| c.recipe_id)
                .collect();
            query = query.filter(recipe::Column::Id.is_in(ids));
        }
    }

    let recipes = query
        .order_by_desc(recipe::Column::PubDate)
        .order_by_desc(recipe::Column::Id)
        .all(conn)
        .await?;
    debug!(count = recipes.len(), "Recipes listed.");

    load_recipe_details(conn, recipes, viewer).await
}
