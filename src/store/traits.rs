//! Store traits: the registry and status tables the engine talks to.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Internal key of a company record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyKey(String);

impl CompanyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CompanyKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Processing status of a (company, message) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Extracted values matched the registry. Terminal.
    Processed,
    /// Matched a company but values did not (yet) validate.
    Processing,
    /// Marked as not belonging to any known company.
    Unmatched,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 3] = [Self::Processed, Self::Processing, Self::Unmatched];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Processing => "processing",
            Self::Unmatched => "unmatched",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(Self::Processed),
            "processing" => Ok(Self::Processing),
            "unmatched" => Ok(Self::Unmatched),
            other => Err(DatabaseError::Serialization(format!(
                "unknown processing status: {other}"
            ))),
        }
    }
}

/// A persisted status row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    pub company: CompanyKey,
    pub message_id: String,
    pub status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Number of tuples per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub processed: u64,
    pub processing: u64,
    pub unmatched: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.processed + self.processing + self.unmatched
    }

    pub fn get(&self, status: ProcessingStatus) -> u64 {
        match status {
            ProcessingStatus::Processed => self.processed,
            ProcessingStatus::Processing => self.processing,
            ProcessingStatus::Unmatched => self.unmatched,
        }
    }

    pub(crate) fn add(&mut self, status: ProcessingStatus, count: u64) {
        match status {
            ProcessingStatus::Processed => self.processed += count,
            ProcessingStatus::Processing => self.processing += count,
            ProcessingStatus::Unmatched => self.unmatched += count,
        }
    }
}

/// Company registry: read by the resolver and the validator.
#[async_trait]
pub trait CompanyRegistry: Send + Sync {
    /// All company keys whose external identifier equals `external_id`,
    /// ordered by key. More than one result is a data-quality problem.
    async fn find_company_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<CompanyKey>, DatabaseError>;

    /// Known reference figures for a company, keyed by attribute name.
    async fn reference_values(
        &self,
        company: &CompanyKey,
    ) -> Result<BTreeMap<String, Decimal>, DatabaseError>;

    /// Insert a company and return its generated key.
    async fn register_company(
        &self,
        external_id: &str,
        name: Option<&str>,
    ) -> Result<CompanyKey, DatabaseError>;

    /// Upsert one reference figure for a company.
    async fn set_reference_value(
        &self,
        company: &CompanyKey,
        field: &str,
        value: Decimal,
    ) -> Result<(), DatabaseError>;
}

/// Per-(company, message) processing status table.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get_status(
        &self,
        company: &CompanyKey,
        message_id: &str,
    ) -> Result<Option<ProcessingStatus>, DatabaseError>;

    /// Upsert the status of a tuple.
    async fn set_status(
        &self,
        company: &CompanyKey,
        message_id: &str,
        status: ProcessingStatus,
    ) -> Result<(), DatabaseError>;

    /// Insert the status only if the tuple has none yet, atomically.
    /// Returns whether a row was written.
    async fn set_status_if_absent(
        &self,
        company: &CompanyKey,
        message_id: &str,
        status: ProcessingStatus,
    ) -> Result<bool, DatabaseError>;

    /// All status rows for a message, ordered by company key.
    async fn list_statuses(&self, message_id: &str) -> Result<Vec<StatusRecord>, DatabaseError>;

    /// Tuple counts per status.
    async fn status_counts(&self) -> Result<StatusCounts, DatabaseError>;
}
