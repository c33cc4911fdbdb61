//! Persistence layer: company registry and processing status, backed by libSQL.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    CompanyKey, CompanyRegistry, ProcessingStatus, StatusCounts, StatusRecord, StatusStore,
};
