//! Storage handle over the `bills` and `mps` tables.
//!
//! Every write is a single-row upsert keyed by the record's natural key.
//! Nothing here opens a transaction spanning more than one row.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parl_core::{Bill, BillName, EnglishText, Mp, NaturalKey, Party, Riding};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Idempotent bootstrap DDL. The checks reject records whose natural key
/// decoded to its default value. Column names match tables created by the
/// earlier deployment (`CurrentParty` folds to `currentparty`).
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS bills (
    legisinfo_id BIGINT PRIMARY KEY CHECK (legisinfo_id > 0),
    session      TEXT NOT NULL DEFAULT '',
    introduced   TEXT NOT NULL DEFAULT '',
    name         TEXT NOT NULL DEFAULT '',
    number       TEXT NOT NULL DEFAULT '',
    url          TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS mps (
    name           TEXT PRIMARY KEY CHECK (name <> ''),
    currentparty   TEXT NOT NULL DEFAULT '',
    currentriding  TEXT NOT NULL DEFAULT '',
    url            TEXT NOT NULL DEFAULT '',
    image          TEXT NOT NULL DEFAULT '',
    province       TEXT NOT NULL DEFAULT ''
);
"#;

const UPSERT_BILL_SQL: &str = r#"
INSERT INTO bills (session, legisinfo_id, introduced, name, number, url)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (legisinfo_id) DO UPDATE SET
    session = EXCLUDED.session,
    introduced = EXCLUDED.introduced,
    name = EXCLUDED.name,
    number = EXCLUDED.number,
    url = EXCLUDED.url
"#;

const UPSERT_MP_SQL: &str = r#"
INSERT INTO mps (name, currentparty, currentriding, url, image, province)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (name) DO UPDATE SET
    currentparty = EXCLUDED.currentparty,
    currentriding = EXCLUDED.currentriding,
    url = EXCLUDED.url,
    image = EXCLUDED.image,
    province = EXCLUDED.province
"#;

const SELECT_BILLS_SQL: &str = r#"
SELECT session, legisinfo_id, introduced, name, number, url
  FROM bills
"#;

const SELECT_MPS_SQL: &str = r#"
SELECT name, currentparty, currentriding, url, image, province
  FROM mps
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{kind} {key:?} rejected: {reason}")]
    Rejected {
        kind: &'static str,
        key: String,
        reason: String,
    },
}

/// Query/exec interface shared by the ingestion side and the read API.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert_bill(&self, bill: &Bill) -> Result<(), StoreError>;
    async fn upsert_mp(&self, mp: &Mp) -> Result<(), StoreError>;
    async fn list_bills(&self) -> Result<Vec<Bill>, StoreError>;
    async fn bill_by_legisinfo_id(&self, legisinfo_id: i64) -> Result<Option<Bill>, StoreError>;
    async fn list_mps(&self) -> Result<Vec<Mp>, StoreError>;
    async fn mp_by_name(&self, name: &str) -> Result<Option<Mp>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 25,
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    /// Open the pool and establish the first connection.
    pub async fn connect(config: &PoolConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.database_url)
            .await?;
        info!(
            max_connections = config.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("postgres pool closed");
    }
}

fn bill_from_row(row: &PgRow) -> Result<Bill, sqlx::Error> {
    Ok(Bill {
        session: row.try_get("session")?,
        legisinfo_id: row.try_get("legisinfo_id")?,
        introduced: row.try_get("introduced")?,
        name: BillName {
            en: row.try_get("name")?,
            fr: String::new(),
        },
        number: row.try_get("number")?,
        url: row.try_get("url")?,
    })
}

fn mp_from_row(row: &PgRow) -> Result<Mp, sqlx::Error> {
    Ok(Mp {
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        current_party: Party {
            short_name: EnglishText {
                en: row.try_get("currentparty")?,
            },
        },
        current_riding: Riding {
            name: EnglishText {
                en: row.try_get("currentriding")?,
            },
            province: row.try_get("province")?,
        },
        image: row.try_get("image")?,
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn upsert_bill(&self, bill: &Bill) -> Result<(), StoreError> {
        sqlx::query(UPSERT_BILL_SQL)
            .bind(&bill.session)
            .bind(bill.legisinfo_id)
            .bind(&bill.introduced)
            .bind(&bill.name.en)
            .bind(&bill.number)
            .bind(&bill.url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_mp(&self, mp: &Mp) -> Result<(), StoreError> {
        sqlx::query(UPSERT_MP_SQL)
            .bind(&mp.name)
            .bind(&mp.current_party.short_name.en)
            .bind(&mp.current_riding.name.en)
            .bind(&mp.url)
            .bind(&mp.image)
            .bind(&mp.current_riding.province)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_bills(&self) -> Result<Vec<Bill>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_BILLS_SQL} ORDER BY legisinfo_id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| bill_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn bill_by_legisinfo_id(&self, legisinfo_id: i64) -> Result<Option<Bill>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_BILLS_SQL} WHERE legisinfo_id = $1"))
            .bind(legisinfo_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(bill_from_row).transpose()?)
    }

    async fn list_mps(&self) -> Result<Vec<Mp>, StoreError> {
        let rows = sqlx::query(&format!("{SELECT_MPS_SQL} ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| mp_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn mp_by_name(&self, name: &str) -> Result<Option<Mp>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_MPS_SQL} WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(mp_from_row).transpose()?)
    }
}

/// In-process store with the same key checks and persisted projection as
/// the postgres schema.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    bills: RwLock<BTreeMap<i64, Bill>>,
    mps: RwLock<BTreeMap<String, Mp>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bill_count(&self) -> usize {
        self.bills.read().await.len()
    }

    pub async fn mp_count(&self) -> usize {
        self.mps.read().await.len()
    }
}

fn reject<T: NaturalKey>(record: &T, reason: &str) -> StoreError {
    StoreError::Rejected {
        kind: T::KIND,
        key: record.natural_key(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_bill(&self, bill: &Bill) -> Result<(), StoreError> {
        if bill.legisinfo_id <= 0 {
            return Err(reject(bill, "legisinfo_id must be positive"));
        }
        // Only the English title is a column.
        let mut row = bill.clone();
        row.name.fr.clear();
        self.bills.write().await.insert(row.legisinfo_id, row);
        Ok(())
    }

    async fn upsert_mp(&self, mp: &Mp) -> Result<(), StoreError> {
        if mp.name.is_empty() {
            return Err(reject(mp, "name must not be empty"));
        }
        self.mps.write().await.insert(mp.name.clone(), mp.clone());
        Ok(())
    }

    async fn list_bills(&self) -> Result<Vec<Bill>, StoreError> {
        Ok(self.bills.read().await.values().cloned().collect())
    }

    async fn bill_by_legisinfo_id(&self, legisinfo_id: i64) -> Result<Option<Bill>, StoreError> {
        Ok(self.bills.read().await.get(&legisinfo_id).cloned())
    }

    async fn list_mps(&self) -> Result<Vec<Mp>, StoreError> {
        Ok(self.mps.read().await.values().cloned().collect())
    }

    async fn mp_by_name(&self, name: &str) -> Result<Option<Mp>, StoreError> {
        Ok(self.mps.read().await.get(name).cloned())
    }
}
