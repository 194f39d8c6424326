// SPDX-License-Identifier: GPL-3.0-or-later
pub mod sqlite_store;
pub mod store;

pub use sqlite_store::SqliteKeyValueStore;
pub use store::{KeyValueStore, MemoryKeyValueStore};

use anyhow::Result;
use pfwatch_config::StorageConfig;
use std::path::Path;
use tracing::info;

/// Open the configured store, creating the database file and running migrations.
pub async fn init_store(config: &StorageConfig) -> Result<SqliteKeyValueStore> {
    info!(target: "storage", "initializing key-value store");
    let db_url = normalize_sqlite_url(&config.url)?;
    let store = SqliteKeyValueStore::connect(&db_url, config.pool_max_size).await?;
    info!(target: "storage", db_url = %config.url, "key-value store ready");
    Ok(store)
}

/// Make file-backed SQLite URLs absolute and creatable; other URLs pass through.
pub fn normalize_sqlite_url(url: &str) -> Result<String> {
    if !url.starts_with("sqlite://") || url.starts_with("sqlite://:memory:") {
        return Ok(url.to_string());
    }

    let db_path = url.trim_start_matches("sqlite://");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let path = Path::new(db_path);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            info!(target: "storage", path = %parent.display(), "created database directory");
        }
    }

    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // SQLite accepts forward slashes on every platform
    let path_str = absolute_path.to_string_lossy().replace('\\', "/");
    Ok(format!("sqlite://{}?mode=rwc", path_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_url_is_untouched() {
        assert_eq!(
            normalize_sqlite_url("sqlite://:memory:").unwrap(),
            "sqlite://:memory:"
        );
        assert_eq!(normalize_sqlite_url("sqlite::memory:").unwrap(), "sqlite::memory:");
    }

    #[test]
    fn file_url_becomes_absolute_and_creatable() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("pfwatch.db");
        let url = format!("sqlite://{}", db.display());

        let normalized = normalize_sqlite_url(&url).unwrap();

        assert!(normalized.ends_with("pfwatch.db?mode=rwc"));
        assert!(!normalized.contains('\\'));
        assert!(dir.path().join("nested").is_dir());
    }

    #[tokio::test]
    async fn init_store_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            url: format!("sqlite://{}", dir.path().join("pfwatch.db").display()),
            pool_max_size: 2,
        };

        let store = init_store(&config).await.unwrap();
        store.set("sound-enabled", "true").await.unwrap();
        drop(store);

        let reopened = init_store(&config).await.unwrap();
        assert_eq!(
            reopened.get("sound-enabled").await.unwrap().as_deref(),
            Some("true")
        );
    }
}
