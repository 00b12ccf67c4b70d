//! Database configuration module for the IQ-coin service.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust structs.
//! Creation is idempotent (`IF NOT EXISTS`) and ordered so that every foreign key
//! points at a table that already exists.

use crate::entities::{Profile, Student, Transaction, User};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Default location of the database when neither the config file nor the
/// environment names one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/iqcoin.sqlite?mode=rwc";

/// File path of a `sqlite://` URL, `None` for in-memory or non-`SQLite` URLs.
fn sqlite_file_path(database_url: &str) -> Option<&Path> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next().unwrap_or_default();
    (!path.is_empty() && !path.starts_with(":memory:")).then(|| Path::new(path))
}

/// Establishes a connection to the database at `database_url`.
#[instrument]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(parent) = sqlite_file_path(database_url).and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    debug!("Connecting to database");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all tables from the entity definitions, skipping ones that exist.
///
/// Order matters: users, then students (owned by users), then profiles (which
/// may link a student), then transactions.
#[instrument(skip(db))]
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut user_table = schema.create_table_from_entity(User);
    let mut student_table = schema.create_table_from_entity(Student);
    let mut profile_table = schema.create_table_from_entity(Profile);
    let mut transaction_table = schema.create_table_from_entity(Transaction);

    for table in [
        &mut user_table,
        &mut student_table,
        &mut profile_table,
        &mut transaction_table,
    ] {
        table.if_not_exists();
        db.execute(builder.build(&*table)).await?;
    }

    info!("Database tables ensured");
    Ok(())
}

/// Connects and ensures the schema in one step; used by `serve` and `init-db`.
pub async fn init_database(database_url: &str) -> Result<DatabaseConnection> {
    let db = create_connection(database_url).await?;
    create_tables(&db).await?;
    Ok(db)
}
