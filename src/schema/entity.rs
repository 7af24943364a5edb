//! Entity definitions
//!
//! An `EntitySpec` is everything the pipelines need to know about one
//! synced resource. The three pipeline shapes are chosen from `kind`.

use super::types::{Field, FieldMode, FieldType, Schema};
use crate::error::{Error, Result};
use crate::pagination::WindowParams;
use crate::types::{EntityId, EntityKind, WriteMode};
use serde::{Deserialize, Serialize};

/// Placeholder replaced by the record id in detail endpoints
pub const ID_PLACEHOLDER: &str = "{id}";

/// Column marking a deleted record
pub const DELETED_COLUMN: &str = "deleted";

/// Definition of one synced resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    /// Destination table name
    pub name: String,

    pub kind: EntityKind,

    /// API path, relative to the base URL; `{id}` for detail endpoints
    #[serde(default)]
    pub endpoint: String,

    /// Response key holding the rows; defaults to the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_key: Option<String>,

    #[serde(default)]
    pub schema: Schema,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_key: Option<String>,

    /// Column the reconciled table is ordered by
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,

    /// Window parameters for incremental listing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowParams>,

    /// Details entity enriched from this entity's ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Entity whose ids a details entity enriches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// Table receiving deletion markers of a details entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_table: Option<String>,
}

impl EntitySpec {
    /// Response key holding the rows
    pub fn row_key(&self) -> &str {
        self.row_key.as_deref().unwrap_or(&self.endpoint)
    }

    /// How batches of this entity are written
    pub fn write_mode(&self) -> WriteMode {
        match self.kind {
            EntityKind::Dimension => WriteMode::Truncate,
            EntityKind::Incremental | EntityKind::Details => WriteMode::AppendReconcile,
            EntityKind::Deleted => WriteMode::Append,
        }
    }

    /// First primary key column
    pub fn id_key(&self) -> Option<&str> {
        self.primary_key.first().map(String::as_str)
    }

    /// Primary key column, failing for entities without one
    pub fn require_id_key(&self) -> Result<&str> {
        self.id_key()
            .ok_or_else(|| Error::unsupported(&self.name, "keyed operations"))
    }

    /// Cursor column, failing for entities without one
    pub fn require_cursor_key(&self) -> Result<&str> {
        self.cursor_key
            .as_deref()
            .ok_or_else(|| Error::unsupported(&self.name, "cursor tracking"))
    }

    /// Path of the detail endpoint for one id
    pub fn detail_path(&self, id: &EntityId) -> String {
        self.endpoint.replace(ID_PLACEHOLDER, &id.to_string())
    }

    /// Deletion-marker table of a details entity: `{<key>, deleted}`
    pub fn deleted_spec(&self) -> Option<EntitySpec> {
        let table = self.deleted_table.as_ref()?;
        let key = self.id_key()?;
        let key_type = self
            .schema
            .field(key)
            .map_or(FieldType::Integer, |f| f.field_type);

        Some(EntitySpec {
            name: table.clone(),
            kind: EntityKind::Deleted,
            endpoint: String::new(),
            row_key: None,
            schema: Schema::new(vec![
                Field::new(key, key_type).with_mode(FieldMode::Required),
                Field::new(DELETED_COLUMN, FieldType::Boolean),
            ]),
            primary_key: vec![key.to_string()],
            cursor_key: None,
            partition_key: None,
            window: None,
            details: None,
            parent: self.parent.clone(),
            deleted_table: None,
        })
    }

    /// Check the definition is usable for its pipeline shape
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("Entity name cannot be empty"));
        }
        if self.schema.is_empty() {
            return Err(Error::config(format!("Entity '{}' has no schema", self.name)));
        }

        let keys = self
            .primary_key
            .iter()
            .chain(self.cursor_key.iter())
            .chain(self.partition_key.iter());
        for key in keys {
            if self.schema.field(key).is_none() {
                return Err(Error::config(format!(
                    "Entity '{}' references unknown column '{}'",
                    self.name, key
                )));
            }
        }

        match self.kind {
            EntityKind::Dimension => self.require_endpoint(),
            EntityKind::Incremental => {
                self.require_endpoint()?;
                self.require_id_key()?;
                self.require_cursor_key()?;
                if self.window.is_none() {
                    return Err(Error::config(format!(
                        "Incremental entity '{}' needs window parameters",
                        self.name
                    )));
                }
                Ok(())
            }
            EntityKind::Details => {
                self.require_endpoint()?;
                self.require_id_key()?;
                self.require_cursor_key()?;
                if !self.endpoint.contains(ID_PLACEHOLDER) {
                    return Err(Error::config(format!(
                        "Details entity '{}' endpoint must contain {ID_PLACEHOLDER}",
                        self.name
                    )));
                }
                if self.parent.is_none() || self.deleted_table.is_none() {
                    return Err(Error::config(format!(
                        "Details entity '{}' needs a parent and a deleted table",
                        self.name
                    )));
                }
                Ok(())
            }
            EntityKind::Deleted => self.require_id_key().map(|_| ()),
        }
    }

    fn require_endpoint(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::config(format!(
                "Entity '{}' has no endpoint",
                self.name
            )));
        }
        Ok(())
    }
}
