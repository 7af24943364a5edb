//! Entity schemas
//!
//! Declarative description of synced resources and their destination
//! tables.
//!
//! # Features
//!
//! - **Typed Fields**: Scalar, JSON-text and nested RECORD columns
//! - **Field Modes**: Nullable, required and repeated
//! - **Source Paths**: Dotted paths into the raw API record
//! - **Sink Types**: STRUCT columns for the warehouse, JSON for the relational mirror

mod entity;
mod types;

pub use entity::{EntitySpec, DELETED_COLUMN, ID_PLACEHOLDER};
pub use types::{quote_ident, quote_literal, Field, FieldMode, FieldType, NestedEncoding, Schema};

#[cfg(test)]
mod tests;
