//! Classification ledger: per-user history rows and EcoCredit totals.
//!
//! The classification proxy never writes here. Clients record a result after
//! they have shown it, the same way they would insert a row into a hosted
//! table.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::classification::{Category, credits_for_confidence, display_confidence};
use crate::error::{EcoSnapError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    total_credits INTEGER NOT NULL DEFAULT 0,
    total_classifications INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS waste_classifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    image_url TEXT,
    predicted_category TEXT NOT NULL,
    confidence INTEGER NOT NULL,
    credits_earned INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_waste_classifications_user
    ON waste_classifications (user_id, created_at DESC);
"#;

/// A classification the client wants recorded. Credits are not accepted from
/// the caller; they are derived from `confidence`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClassification {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl NewClassification {
    fn validate(&self) -> Result<(String, Category, f64)> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(EcoSnapError::invalid_input("userId is required"));
        }
        let category = self
            .category
            .parse::<Category>()
            .map_err(EcoSnapError::invalid_input)?;
        let confidence = self
            .confidence
            .ok_or_else(|| EcoSnapError::invalid_input("confidence is required"))?;
        if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
            return Err(EcoSnapError::invalid_input(
                "confidence must be between 0 and 100",
            ));
        }
        Ok((user_id.to_string(), category, confidence))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
    pub id: String,
    pub user_id: String,
    pub image_url: Option<String>,
    pub predicted_category: Category,
    pub confidence: u8,
    pub credits_earned: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub total_credits: u64,
    pub total_classifications: u64,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ClassificationStore: Send + Sync {
    /// Insert a row and bump the user's totals atomically
    async fn record(&self, entry: NewClassification) -> Result<ClassificationRecord>;

    /// Totals for a user; `NotFound` if nothing was ever recorded
    async fn profile(&self, user_id: &str) -> Result<Profile>;

    /// Most recent rows first
    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<ClassificationRecord>>;
}

/// SQLite-backed store. One connection, serialized behind a mutex, used from
/// the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database. `:memory:` gives a private in-memory db.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(path))?
        };
        conn.execute_batch(SCHEMA)?;
        info!("Classification store ready at {}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| EcoSnapError::Storage {
                message: "connection mutex poisoned".to_string(),
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| EcoSnapError::Internal {
            message: format!("store task failed: {}", e),
        })?
    }
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClassificationRecord> {
    let category: String = row.get(3)?;
    let predicted_category = category.parse::<Category>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
    })?;
    Ok(ClassificationRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        image_url: row.get(2)?,
        predicted_category,
        confidence: row.get(4)?,
        credits_earned: row.get(5)?,
        created_at: parse_timestamp(6, row.get(6)?)?,
    })
}

#[async_trait]
impl ClassificationStore for SqliteStore {
    async fn record(&self, entry: NewClassification) -> Result<ClassificationRecord> {
        let (user_id, category, confidence) = entry.validate()?;
        let record = ClassificationRecord {
            id: Uuid::new_v4().to_string(),
            user_id,
            image_url: entry.image_url.filter(|u| !u.trim().is_empty()),
            predicted_category: category,
            confidence: display_confidence(confidence),
            credits_earned: credits_for_confidence(confidence),
            created_at: Utc::now(),
        };

        let row = record.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let created_at = timestamp(&row.created_at);
            tx.execute(
                "INSERT INTO waste_classifications
                    (id, user_id, image_url, predicted_category, confidence, credits_earned, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id,
                    row.user_id,
                    row.image_url,
                    row.predicted_category.as_str(),
                    row.confidence,
                    row.credits_earned,
                    created_at,
                ],
            )?;
            tx.execute(
                "INSERT INTO profiles (id, total_credits, total_classifications, updated_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    total_credits = total_credits + excluded.total_credits,
                    total_classifications = total_classifications + 1,
                    updated_at = excluded.updated_at",
                params![row.user_id, row.credits_earned, created_at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!(
            "Recorded classification {} for {} (+{} credits)",
            record.id, record.user_id, record.credits_earned
        );
        Ok(record)
    }

    async fn profile(&self, user_id: &str) -> Result<Profile> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let profile = conn
                .query_row(
                    "SELECT id, total_credits, total_classifications, updated_at
                     FROM profiles WHERE id = ?1",
                    params![user_id],
                    |row| {
                        Ok(Profile {
                            user_id: row.get(0)?,
                            total_credits: row.get::<_, i64>(1)?.max(0) as u64,
                            total_classifications: row.get::<_, i64>(2)?.max(0) as u64,
                            updated_at: parse_timestamp(3, row.get(3)?)?,
                        })
                    },
                )
                .optional()?;
            profile.ok_or_else(|| EcoSnapError::NotFound {
                message: format!("No profile for user '{}'", user_id),
            })
        })
        .await
    }

    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<ClassificationRecord>> {
        let user_id = user_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, image_url, predicted_category, confidence, credits_earned, created_at
                 FROM waste_classifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id, limit], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}
