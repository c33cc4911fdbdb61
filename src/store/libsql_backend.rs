//! libSQL backend: implements the registry and status store traits.
//!
//! Supports local file and in-memory databases.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    CompanyKey, CompanyRegistry, ProcessingStatus, StatusCounts, StatusRecord, StatusStore,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Run all pending schema migrations.
    pub async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to a StatusRecord.
///
/// Column order matches STATUS_COLUMNS:
/// 0:company_id, 1:message_id, 2:status, 3:created_at, 4:updated_at
fn row_to_status(row: &libsql::Row) -> Result<StatusRecord, DatabaseError> {
    let read = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("status row column {idx}: {e}")))
    };
    Ok(StatusRecord {
        company: CompanyKey::new(read(0)?),
        message_id: read(1)?,
        status: ProcessingStatus::from_str(&read(2)?)?,
        created_at: parse_datetime(&read(3)?),
        updated_at: parse_datetime(&read(4)?),
    })
}

// ── Trait implementations ───────────────────────────────────────────

const STATUS_COLUMNS: &str = "company_id, message_id, status, created_at, updated_at";

#[async_trait]
impl CompanyRegistry for LibSqlBackend {
    async fn find_company_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<CompanyKey>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM companies WHERE external_id = ?1 ORDER BY id",
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_company_by_external_id: {e}")))?;

        let mut keys = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_company_by_external_id: {e}")))?
        {
            let id: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("company row parse: {e}")))?;
            keys.push(CompanyKey::new(id));
        }
        Ok(keys)
    }

    async fn reference_values(
        &self,
        company: &CompanyKey,
    ) -> Result<BTreeMap<String, Decimal>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT field, value FROM company_reference_values WHERE company_id = ?1",
                params![company.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("reference_values: {e}")))?;

        let mut values = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("reference_values: {e}")))?
        {
            let field: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("reference row parse: {e}")))?;
            let raw: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("reference row parse: {e}")))?;
            let value = Decimal::from_str(&raw).map_err(|e| {
                DatabaseError::Serialization(format!("reference value {field}={raw}: {e}"))
            })?;
            values.insert(field, value);
        }
        Ok(values)
    }

    async fn register_company(
        &self,
        external_id: &str,
        name: Option<&str>,
    ) -> Result<CompanyKey, DatabaseError> {
        let key = CompanyKey::new(Uuid::new_v4().to_string());
        self.conn()
            .execute(
                "INSERT INTO companies (id, external_id, name) VALUES (?1, ?2, ?3)",
                params![key.as_str(), external_id.trim(), opt_text(name)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("register_company: {e}")))?;

        debug!(company = %key, external_id, "Company registered");
        Ok(key)
    }

    async fn set_reference_value(
        &self,
        company: &CompanyKey,
        field: &str,
        value: Decimal,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO company_reference_values (company_id, field, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (company_id, field) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
                params![company.as_str(), field, value.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_reference_value: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl StatusStore for LibSqlBackend {
    async fn get_status(
        &self,
        company: &CompanyKey,
        message_id: &str,
    ) -> Result<Option<ProcessingStatus>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status FROM processing_status WHERE company_id = ?1 AND message_id = ?2",
                params![company.as_str(), message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_status: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_status row parse: {e}")))?;
                Ok(Some(ProcessingStatus::from_str(&raw)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_status: {e}"))),
        }
    }

    async fn set_status(
        &self,
        company: &CompanyKey,
        message_id: &str,
        status: ProcessingStatus,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO processing_status (company_id, message_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (company_id, message_id) DO UPDATE SET
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![company.as_str(), message_id, status.as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_status: {e}")))?;

        debug!(company = %company, message_id, status = %status, "Status written");
        Ok(())
    }

    async fn set_status_if_absent(
        &self,
        company: &CompanyKey,
        message_id: &str,
        status: ProcessingStatus,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO processing_status (company_id, message_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT (company_id, message_id) DO NOTHING",
                params![company.as_str(), message_id, status.as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_status_if_absent: {e}")))?;

        debug!(
            company = %company,
            message_id,
            status = %status,
            written = inserted > 0,
            "Conditional status write"
        );
        Ok(inserted > 0)
    }

    async fn list_statuses(&self, message_id: &str) -> Result<Vec<StatusRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {STATUS_COLUMNS} FROM processing_status WHERE message_id = ?1 ORDER BY company_id"
                ),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_statuses: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_statuses: {e}")))?
        {
            records.push(row_to_status(&row)?);
        }
        Ok(records)
    }

    async fn status_counts(&self) -> Result<StatusCounts, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status, COUNT(*) FROM processing_status GROUP BY status",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("status_counts: {e}")))?;

        let mut counts = StatusCounts::default();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("status_counts: {e}")))?
        {
            let raw: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("status count row parse: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("status count row parse: {e}")))?;
            counts.add(ProcessingStatus::from_str(&raw)?, count.max(0) as u64);
        }
        Ok(counts)
    }
}
