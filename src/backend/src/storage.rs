use chrono::{DateTime, SecondsFormat, Utc};
use common::model::Entry;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, Row, SqlitePool, query};
use std::fs;
use std::path::Path;

/// EntryStore persists the backend's text entries (PostgreSQL or SQLite).
#[derive(Clone)]
pub enum EntryStore {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStore::Postgres(_) => f.write_str("EntryStore::Postgres"),
            EntryStore::Sqlite(_) => f.write_str("EntryStore::Sqlite"),
        }
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering in SQLite.
fn sqlite_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl EntryStore {
    /// Connect to the entry database and create the schema.
    pub async fn new(dsn: &str) -> Result<Self, sqlx::Error> {
        log::info!("Connecting to entry database with DSN: {dsn}");

        let store = if dsn.starts_with("sqlite:") {
            if dsn.contains(":memory:") {
                // Every connection to :memory: is its own database, so keep exactly one.
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect(dsn)
                    .await?;
                EntryStore::Sqlite(pool)
            } else {
                ensure_data_directory(dsn).map_err(sqlx::Error::Io)?;
                let dsn_with_create = if dsn.contains('?') {
                    if dsn.contains("mode=") {
                        dsn.to_string()
                    } else {
                        format!("{dsn}&mode=rwc")
                    }
                } else {
                    format!("{dsn}?mode=rwc")
                };
                let pool = SqlitePool::connect(&dsn_with_create).await.map_err(|e| {
                    log::error!("Failed to connect to SQLite database '{dsn_with_create}': {e}");
                    e
                })?;
                EntryStore::Sqlite(pool)
            }
        } else {
            let pool = PgPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to PostgreSQL database '{dsn}': {e}");
                e
            })?;
            EntryStore::Postgres(pool)
        };

        store.init().await.map_err(|e| {
            log::error!("Failed to initialize entry schema: {e}");
            e
        })?;
        log::info!("Entry database ready");
        Ok(store)
    }

    /// Private in-memory SQLite store.
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        Self::new("sqlite::memory:").await
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        match self {
            EntryStore::Sqlite(pool) => {
                let create_entries = r#"
                CREATE TABLE IF NOT EXISTS entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    text TEXT NOT NULL
                )"#;
                query(create_entries).execute(pool).await?;
            }
            EntryStore::Postgres(pool) => {
                let create_entries = r#"
                CREATE TABLE IF NOT EXISTS entries (
                    id BIGSERIAL PRIMARY KEY,
                    created_at TIMESTAMPTZ NOT NULL,
                    text TEXT NOT NULL
                )"#;
                query(create_entries).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Store `text` stamped with the current time.
    pub async fn insert_entry(&self, text: &str) -> Result<Entry, sqlx::Error> {
        let entry = Entry::new(text);
        match self {
            EntryStore::Sqlite(pool) => {
                query("INSERT INTO entries (created_at, text) VALUES (?, ?)")
                    .bind(sqlite_timestamp(&entry.timestamp))
                    .bind(&entry.text)
                    .execute(pool)
                    .await?;
            }
            EntryStore::Postgres(pool) => {
                query("INSERT INTO entries (created_at, text) VALUES ($1, $2)")
                    .bind(entry.timestamp)
                    .bind(&entry.text)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(entry)
    }

    /// All entries, newest first.
    pub async fn list_entries(&self) -> Result<Vec<Entry>, sqlx::Error> {
        let select = "SELECT created_at, text FROM entries ORDER BY created_at DESC, id DESC";
        match self {
            EntryStore::Sqlite(pool) => {
                let rows = query(select).fetch_all(pool).await?;
                let mut entries = Vec::with_capacity(rows.len());
                for row in rows {
                    let created_at: String = row.get("created_at");
                    let timestamp = DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|_| sqlx::Error::Decode("Invalid timestamp format".into()))?
                        .with_timezone(&Utc);
                    entries.push(Entry {
                        timestamp,
                        text: row.get("text"),
                    });
                }
                Ok(entries)
            }
            EntryStore::Postgres(pool) => {
                let rows = query(select).fetch_all(pool).await?;
                Ok(rows
                    .into_iter()
                    .map(|row| Entry {
                        timestamp: row.get("created_at"),
                        text: row.get("text"),
                    })
                    .collect())
            }
        }
    }
}

/// Create the parent directory of a file-backed SQLite DSN.
fn ensure_data_directory(dsn: &str) -> std::io::Result<()> {
    let Some(rest) = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let file_path = rest.split('?').next().unwrap_or_default();
    if file_path.is_empty() || file_path.contains(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            log::info!("Created data directory: {}", parent.display());
        }
    }
    Ok(())
}
