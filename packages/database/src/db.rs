//! Database connection utilities.

use std::path::Path;
use std::sync::Arc;

use switchy_database::Database;
use switchy_database_connection::{Credentials, init_sqlite_rusqlite};

use crate::StoreError;
use crate::feed::ChangeFeed;
use crate::sql::SqlStore;

/// Default `SQLite` file used when neither `DATABASE_URL` nor
/// `DATABASE_PATH` is set.
pub const DEFAULT_DATABASE_PATH: &str = "data/fireline.db";

/// Opens (or creates) a `SQLite` database at `path`.
///
/// # Errors
///
/// Returns [`StoreError::Connection`] if the parent directory cannot be
/// created or the file cannot be opened.
pub fn open_sqlite(path: &Path) -> Result<Box<dyn Database>, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Connection {
            message: format!("Failed to create {}: {e}", parent.display()),
        })?;
    }

    init_sqlite_rusqlite(Some(path)).map_err(|e| StoreError::Connection {
        message: e.to_string(),
    })
}

/// Connects to `PostgreSQL` at `url`.
///
/// # Errors
///
/// Returns [`StoreError::Connection`] if the URL is malformed or the
/// connection fails.
pub async fn open_postgres(url: &str) -> Result<Box<dyn Database>, StoreError> {
    // Query parameters like ?sslmode=require are not understood by the
    // credentials parser; TLS is negotiated by the connector.
    let url_base = url.split('?').next().unwrap_or(url);

    let creds = Credentials::from_url(url_base).map_err(|e| StoreError::Connection {
        message: e.to_string(),
    })?;
    let db = switchy_database_connection::init_postgres_raw_native_tls(creds)
        .await
        .map_err(|e| StoreError::Connection {
            message: e.to_string(),
        })?;

    db.exec_raw("SET statement_timeout = '30s'").await?;

    Ok(db)
}

/// Opens the store described by the environment and ensures its schema.
///
/// `DATABASE_URL` (a `postgres://` URL) takes precedence; otherwise a
/// `SQLite` file at `DATABASE_PATH` (default [`DEFAULT_DATABASE_PATH`]).
///
/// # Errors
///
/// Returns [`StoreError`] if the connection or schema setup fails.
pub async fn connect_from_env(feed: ChangeFeed) -> Result<SqlStore, StoreError> {
    let db = if let Ok(url) = std::env::var("DATABASE_URL") {
        log::info!("Connecting to PostgreSQL store");
        open_postgres(&url).await?
    } else {
        let path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());
        log::info!("Opening SQLite store at {path}");
        open_sqlite(Path::new(&path))?
    };

    let store = SqlStore::new(Arc::from(db), feed);
    store.ensure_schema().await?;
    Ok(store)
}
