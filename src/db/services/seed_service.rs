//! Reference data loading for the `load-*` commands.

use crate::db::entities::{ingredient, prelude::*, tag};
use crate::db::services::ingredient_service::find_ingredient_by_name;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use std::fmt;
use std::io::Read;
use tracing::{info, warn};

/// `(name, slug)` of the tags every installation starts with.
pub const DEFAULT_TAGS: [(&str, &str); 3] = [
    ("Breakfast", "breakfast"),
    ("Lunch", "lunch"),
    ("Dinner", "dinner"),
];

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Database error: {0}")]
    DbErr(#[from] DbErr),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    /// Rows whose record already existed.
    pub skipped: usize,
    /// Malformed rows.
    pub rejected: usize,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created: {}, skipped: {}, rejected: {}",
            self.created, self.skipped, self.rejected
        )
    }
}

/// Loads `name,unit` rows. Rows without exactly two non-empty fields are
/// rejected with a warning; names already present are skipped.
pub async fn load_ingredients_csv<C, R>(conn: &C, source: R) -> Result<SeedReport, SeedError>
where
    C: ConnectionTrait,
    R: Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);

    let mut report = SeedReport::default();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let line = index + 1;
        if record.len() != 2 {
            warn!(line, fields = record.len(), "Skipping malformed ingredient row.");
            report.rejected += 1;
            continue;
        }
        let name = record[0].trim();
        let unit = record[1].trim();
        if name.is_empty() || unit.is_empty() {
            warn!(line, "Skipping ingredient row with an empty field.");
            report.rejected += 1;
            continue;
        }

        if find_ingredient_by_name(conn, name).await?.is_some() {
            report.skipped += 1;
            continue;
        }
        ingredient::ActiveModel {
            name: Set(name.to_string()),
            measurement_unit: Set(unit.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        report.created += 1;
    }

    info!(%report, "Ingredients loaded.");
    Ok(report)
}

/// Creates the default tags that are not present yet.
pub async fn load_default_tags<C: ConnectionTrait>(conn: &C) -> Result<SeedReport, DbErr> {
    let mut report = SeedReport::default();
    for (name, slug) in DEFAULT_TAGS {
        let exists = Tag::find()
            .filter(tag::Column::Name.eq(name))
            .one(conn)
            .await?
            .is_some();
        if exists {
            report.skipped += 1;
            continue;
        }
        tag::ActiveModel {
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        report.created += 1;
    }

    info!(%report, "Default tags loaded.");
    Ok(report)
}
