//! Catalog store
//!
//! SQLite destination for normalized records: three tables with fixed
//! column sets, created idempotently on open. Inserts are parameterized
//! and append-only; reloading the same snapshots duplicates rows by
//! design.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use resodex_common::records::{CatalogEntry, InventoryRecord};
use resodex_common::{Error, Result};

use crate::services::normalizer::{snapshot_files, Normalizer};

/// Counters for one catalog load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub items: usize,
    pub folders: usize,
    pub worlds: usize,
    pub records_skipped: usize,
}

/// Writes normalized entries into the SQLite catalog.
pub struct CatalogWriter {
    pool: SqlitePool,
}

impl CatalogWriter {
    /// Open (creating if needed) the catalog and ensure its schema.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        ensure_schema(&pool).await?;
        tracing::info!(catalog = %db_path.display(), "catalog opened");
        Ok(Self { pool })
    }

    /// Insert one entry into its table. Embedded double quotes in names
    /// are replaced with single quotes for compatibility with catalogs
    /// produced by earlier versions of the tool.
    pub async fn insert(&self, entry: &CatalogEntry) -> Result<()> {
        match entry {
            CatalogEntry::Item {
                name,
                link,
                path,
                thumbnail,
            } => {
                sqlx::query(r#"INSERT INTO "Items" (Name, Link, Path, Thumbnail) VALUES (?, ?, ?, ?)"#)
                    .bind(sanitize_name(name))
                    .bind(link.as_str())
                    .bind(path.as_str())
                    .bind(thumbnail.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            CatalogEntry::PublicFolder { name, link, path } => {
                sqlx::query(r#"INSERT INTO "Public Folders" (Name, Link, Path) VALUES (?, ?, ?)"#)
                    .bind(sanitize_name(name))
                    .bind(link.as_str())
                    .bind(path.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            CatalogEntry::World {
                name,
                link,
                tags,
                path,
            } => {
                sqlx::query(r#"INSERT INTO "Worlds" (Name, Link, Tags, Path) VALUES (?, ?, ?, ?)"#)
                    .bind(sanitize_name(name))
                    .bind(link.as_str())
                    .bind(tags.as_str())
                    .bind(path.as_str())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Classify and append every record found in the snapshot directory.
    ///
    /// Append-only: running this twice over the same snapshots doubles the
    /// row counts. Malformed records are skipped and counted, never fatal.
    pub async fn load_dir(&self, dump_dir: &Path, normalizer: &Normalizer) -> Result<LoadStats> {
        let mut stats = LoadStats::default();

        for snapshot in snapshot_files(dump_dir)? {
            let contents = std::fs::read_to_string(&snapshot)?;
            let listing: Vec<serde_json::Value> =
                serde_json::from_str(&contents).map_err(|e| {
                    Error::Storage(format!("corrupt snapshot {}: {e}", snapshot.display()))
                })?;

            for raw in &listing {
                let record = match InventoryRecord::from_value(raw) {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::warn!(file = %snapshot.display(), "skipping record: {e}");
                        stats.records_skipped += 1;
                        continue;
                    }
                };

                let entry = match normalizer.classify(&record) {
                    Ok(Some(entry)) => entry,
                    Ok(None) => continue,
                    Err(Error::MalformedRecord(what)) => {
                        tracing::warn!("skipping malformed record: {what}");
                        stats.records_skipped += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                match &entry {
                    CatalogEntry::Item { .. } => stats.items += 1,
                    CatalogEntry::PublicFolder { .. } => stats.folders += 1,
                    CatalogEntry::World { .. } => stats.worlds += 1,
                }
                self.insert(&entry).await?;
            }
        }

        tracing::info!(
            items = stats.items,
            folders = stats.folders,
            worlds = stats.worlds,
            skipped = stats.records_skipped,
            "catalog load complete"
        );
        Ok(stats)
    }

    /// Row count of one catalog table.
    pub async fn row_count(&self, table: &str) -> Result<i64> {
        let query = match table {
            "Items" => r#"SELECT COUNT(*) FROM "Items""#,
            "Public Folders" => r#"SELECT COUNT(*) FROM "Public Folders""#,
            "Worlds" => r#"SELECT COUNT(*) FROM "Worlds""#,
            other => return Err(Error::Storage(format!("unknown catalog table: {other}"))),
        };
        let count: (i64,) = sqlx::query_as(query).fetch_one(&self.pool).await?;
        Ok(count.0)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS "Items" (
            "Name"      TEXT NOT NULL,
            "Link"      TEXT NOT NULL,
            "Path"      TEXT NOT NULL,
            "Thumbnail" TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS "Public Folders" (
            "Name" TEXT NOT NULL,
            "Link" TEXT NOT NULL,
            "Path" TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS "Worlds" (
            "Name" TEXT NOT NULL,
            "Link" TEXT NOT NULL,
            "Tags" TEXT NOT NULL,
            "Path" TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.replace('"', "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_quote_substitution() {
        assert_eq!(sanitize_name(r#"The "Best" Lamp"#), "The 'Best' Lamp");
        assert_eq!(sanitize_name("plain"), "plain");
    }
}
