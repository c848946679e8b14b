//! Mapping store backed by libSQL

mod connection;
mod mapping_repository;
mod migrations;

pub use connection::Database;
pub use mapping_repository::{LibSqlMappingRepository, MappingRepository};
