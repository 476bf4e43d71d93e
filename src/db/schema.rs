//! Schema bootstrap.
//!
//! Tables are derived from the entity definitions, so the entity modules
//! stay the single source of truth for columns, composite keys and
//! foreign keys.

use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::prelude::*;

async fn create_table<E>(db: &impl ConnectionTrait, schema: &Schema, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(db.get_database_backend().build(&statement)).await?;
    Ok(())
}

/// Creates every table that does not exist yet, parents before children.
pub async fn create_schema(db: &impl ConnectionTrait) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, User).await?;
    create_table(db, &schema, Tag).await?;
    create_table(db, &schema, Ingredient).await?;
    create_table(db, &schema, Recipe).await?;
    create_table(db, &schema, RecipeTag).await?;
    create_table(db, &schema, RecipeIngredient).await?;
    create_table(db, &schema, Favorite).await?;
    create_table(db, &schema, ShoppingCart).await?;
    create_table(db, &schema, Follow).await?;

    info!("Database schema is up to date.");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use sea_orm::{ConnectOptions, Database, DatabaseConnection};

    /// Fresh in-memory SQLite database with the full schema applied.
    pub async fn test_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();
        super::create_schema(&db).await.unwrap();
        db
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_db;
    use super::*;
    use sea_orm::PaginatorTrait;

    #[tokio::test]
    async fn test_create_schema_is_repeatable() {
        let db = test_db().await;
        create_schema(&db).await.unwrap();

        assert_eq!(User::find().count(&db).await.unwrap(), 0);
        assert_eq!(RecipeIngredient::find().count(&db).await.unwrap(), 0);
    }
}
