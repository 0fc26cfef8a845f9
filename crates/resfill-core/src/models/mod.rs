//! Data models: the extraction schema, candidate records and configuration.

pub mod config;
pub mod record;
pub mod schema;
