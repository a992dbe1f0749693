//! SQLite-backed persistence for network definitions.
//!
//! Definitions are stored structurally: the `definition` column holds the
//! serde-JSON form of the element tree, never a hand-edited XML string.
//! Every mutation runs in its own transaction.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::network::NetworkDefinition;
use crate::xml::Element;

/// Store handle for the `nuage_networks` table.
///
/// The handle is opened once at startup, shared by cloning, and closed at
/// shutdown with [`NetworkStore::close`].
#[derive(Clone)]
pub struct NetworkStore {
    pool: SqlitePool,
}

impl NetworkStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                NetworkError::Storage(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        info!(path = %path.display(), "Network store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nuage_networks (
                name TEXT PRIMARY KEY NOT NULL,
                definition TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Network store closed");
    }

    // === Reads ===

    pub async fn get(&self, name: &str) -> Result<Option<NetworkDefinition>> {
        let row = sqlx::query("SELECT name, definition FROM nuage_networks WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_definition(&r)).transpose()
    }

    pub async fn list(&self) -> Result<Vec<NetworkDefinition>> {
        let rows = sqlx::query("SELECT name, definition FROM nuage_networks ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_definition).collect()
    }

    pub async fn list_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM nuage_networks ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(NetworkError::from))
            .collect()
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM nuage_networks WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    // === Writes ===

    /// Insert a new definition. Fails with `DuplicateName` if the name exists.
    pub async fn insert(&self, definition: &NetworkDefinition) -> Result<()> {
        let document = encode(&definition.document)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT 1 FROM nuage_networks WHERE name = ?")
            .bind(&definition.name)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(NetworkError::DuplicateName(definition.name.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO nuage_networks (name, definition, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&definition.name)
        .bind(&document)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                NetworkError::DuplicateName(definition.name.clone())
            }
            other => other.into(),
        })?;

        tx.commit().await?;
        debug!(network = %definition.name, "Network definition inserted");
        Ok(())
    }

    /// Overwrite an existing definition. Fails with `NotFound` if absent.
    pub async fn replace(&self, definition: &NetworkDefinition) -> Result<()> {
        let document = encode(&definition.document)?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE nuage_networks SET definition = ?, updated_at = ? WHERE name = ?",
        )
        .bind(&document)
        .bind(&now)
        .bind(&definition.name)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NetworkError::NotFound(definition.name.clone()));
        }

        tx.commit().await?;
        debug!(network = %definition.name, "Network definition replaced");
        Ok(())
    }

    /// Delete a definition. Fails with `NotFound` if absent.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM nuage_networks WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NetworkError::NotFound(name.to_string()));
        }

        tx.commit().await?;
        debug!(network = %name, "Network definition removed");
        Ok(())
    }
}

fn encode(document: &Element) -> Result<String> {
    serde_json::to_string(document).map_err(|e| NetworkError::Storage(e.to_string()))
}

fn row_to_definition(row: &SqliteRow) -> Result<NetworkDefinition> {
    let name: String = row.try_get("name")?;
    let json: String = row.try_get("definition")?;
    let document: Element = serde_json::from_str(&json).map_err(|e| {
        NetworkError::Storage(format!("corrupt definition for '{}': {}", name, e))
    })?;

    Ok(NetworkDefinition { name, document })
}
