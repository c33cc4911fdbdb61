//! Doc Fetcher: reconciles PDF report attachments from a mailbox against a
//! company registry.

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod logging;
pub mod mail;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod validate;
