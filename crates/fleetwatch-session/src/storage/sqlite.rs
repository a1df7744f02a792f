//! SQLite host storage (feature-gated).

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetwatch_core::{HostId, HostRecord, HostStore, StoreError};
use sqlx::{
    Row,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
};

const CREATE_HOSTS: &str = "CREATE TABLE IF NOT EXISTS hosts (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    address     TEXT NOT NULL,
    port        INTEGER NOT NULL DEFAULT 22,
    base_config TEXT,
    prod_config TEXT,
    last_update TEXT,
    last_commit TEXT,
    commit_hash TEXT
)";

const SELECT_HOST: &str = "SELECT id, name, address, port, base_config, prod_config, \
     last_update, last_commit, commit_hash FROM hosts";

fn internal(e: sqlx::Error) -> StoreError {
    StoreError::Internal(e.to_string())
}

fn host_from_row(row: &SqliteRow) -> Result<HostRecord, StoreError> {
    let port: i64 = row.try_get("port").map_err(internal)?;
    Ok(HostRecord {
        id: row.try_get("id").map_err(internal)?,
        name: row.try_get("name").map_err(internal)?,
        address: row.try_get("address").map_err(internal)?,
        port: u16::try_from(port)
            .map_err(|_| StoreError::Internal(format!("port out of range: {port}")))?,
        base_config: row.try_get("base_config").map_err(internal)?,
        prod_config: row.try_get("prod_config").map_err(internal)?,
        last_update: row.try_get("last_update").map_err(internal)?,
        last_commit: row.try_get("last_commit").map_err(internal)?,
        commit_hash: row.try_get("commit_hash").map_err(internal)?,
    })
}

/// SQLite storage implementation.
pub struct SqliteHostStore {
    pool: SqlitePool,
}

impl SqliteHostStore {
    /// Open (creating if needed) the database at `database_url` and migrate it.
    ///
    /// # Errors
    /// Returns error if database connection or migration fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(internal)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(internal)?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. Call [`Self::migrate`] before use.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the hosts table if it does not exist.
    ///
    /// # Errors
    /// Returns error if the statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_HOSTS)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    /// Insert or replace a host.
    ///
    /// # Errors
    /// Returns error if the statement fails.
    pub async fn insert(&self, host: &HostRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO hosts \
             (id, name, address, port, base_config, prod_config, last_update, last_commit, commit_hash) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(host.id)
        .bind(&host.name)
        .bind(&host.address)
        .bind(i64::from(host.port))
        .bind(&host.base_config)
        .bind(&host.prod_config)
        .bind(host.last_update)
        .bind(host.last_commit)
        .bind(&host.commit_hash)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }
}

#[async_trait]
impl HostStore for SqliteHostStore {
    async fn get(&self, id: HostId) -> Result<Option<HostRecord>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_HOST} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.as_ref().map(host_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<HostRecord>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_HOST} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?;
        rows.iter().map(host_from_row).collect()
    }

    async fn set_last_update(&self, id: HostId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE hosts SET last_update = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn record_commit(&self, hash: &str, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE hosts SET commit_hash = ?, last_commit = ?")
            .bind(hash)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(result.rows_affected())
    }
}
