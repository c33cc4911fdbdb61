//! Document model: one ingested attachment and its extracted attributes.

pub mod attributes;
pub mod model;

pub use attributes::{AttributeValue, EXTERNAL_ID};
pub use model::{Attributes, Document, PDF_CONTENT_TYPE};
