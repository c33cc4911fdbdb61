//! Company resolution: maps an extracted external identifier to a company key.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::DatabaseError;
use crate::store::{CompanyKey, CompanyRegistry};

/// Result of resolving an external identifier against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "companies", rename_all = "snake_case")]
pub enum Resolution {
    /// No company carries the identifier.
    NotFound,
    /// Exactly one company matches.
    Found(CompanyKey),
    /// Several companies share the identifier. Registry data needs fixing;
    /// no candidate is ever picked on the caller's behalf.
    Ambiguous(Vec<CompanyKey>),
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Found(_) => "found",
            Self::Ambiguous(_) => "ambiguous",
        }
    }
}

/// Read-only resolver over a [`CompanyRegistry`].
pub struct CompanyResolver {
    registry: Arc<dyn CompanyRegistry>,
}

impl CompanyResolver {
    pub fn new(registry: Arc<dyn CompanyRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve `external_id`. Missing or blank identifiers resolve to
    /// `NotFound` without touching the registry.
    pub async fn resolve(&self, external_id: Option<&str>) -> Result<Resolution, DatabaseError> {
        let Some(external_id) = external_id.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Resolution::NotFound);
        };

        let mut keys = self
            .registry
            .find_company_by_external_id(external_id)
            .await?;
        keys.sort();
        keys.dedup();

        let resolution = match keys.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found(keys.remove(0)),
            _ => Resolution::Ambiguous(keys),
        };

        match &resolution {
            Resolution::Ambiguous(candidates) => warn!(
                external_id,
                candidates = candidates.len(),
                "External identifier matches several companies"
            ),
            other => debug!(external_id, result = other.label(), "Resolved external identifier"),
        }
        Ok(resolution)
    }
}
