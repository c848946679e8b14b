//! Data models for mdsync

mod document;
mod mapping;
mod node;

pub use document::{DocumentMetadata, Fingerprint, StructuralDocument};
pub use mapping::MappingRecord;
pub use node::{InlineText, StructuralNode, StyleFlags, TextRun};
