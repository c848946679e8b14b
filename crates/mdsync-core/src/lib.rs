//! mdsync-core - Core library for mdsync
//!
//! This crate contains the document model, the Markdown and Notion
//! converters, the mapping store and the sync engine used by the `mdsync`
//! command line tool.

pub mod config;
pub mod db;
pub mod error;
pub mod markdown;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use sync::{SyncContext, SyncEngine, SyncReport};
