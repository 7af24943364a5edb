//! Schema types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    #[serde(alias = "integer", alias = "INT64")]
    Integer,
    #[serde(alias = "float", alias = "FLOAT64")]
    Float,
    #[serde(alias = "string")]
    String,
    #[serde(alias = "boolean", alias = "BOOL")]
    Boolean,
    #[serde(alias = "timestamp")]
    Timestamp,
    /// Arbitrary source value stored as serialized JSON text
    #[serde(alias = "json")]
    Json,
    /// Nested record with its own fields
    #[serde(alias = "record", alias = "STRUCT")]
    Record,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Integer => write!(f, "INTEGER"),
            FieldType::Float => write!(f, "FLOAT"),
            FieldType::String => write!(f, "STRING"),
            FieldType::Boolean => write!(f, "BOOLEAN"),
            FieldType::Timestamp => write!(f, "TIMESTAMP"),
            FieldType::Json => write!(f, "JSON"),
            FieldType::Record => write!(f, "RECORD"),
        }
    }
}

/// Field mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    #[serde(alias = "nullable")]
    Nullable,
    #[serde(alias = "required")]
    Required,
    #[serde(alias = "repeated")]
    Repeated,
}

/// How nested (RECORD) columns are laid out in a sink table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedEncoding {
    /// Native STRUCT / STRUCT[] columns
    #[default]
    Struct,
    /// One JSON column per nested field
    Json,
}

/// One column of an entity schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Destination column name
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub mode: FieldMode,

    /// Dotted path into the raw record; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Sub-fields of a RECORD
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

impl Field {
    /// Create a nullable scalar field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            mode: FieldMode::Nullable,
            source: None,
            fields: Vec::new(),
        }
    }

    /// Create a nullable RECORD field
    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            fields,
            ..Self::new(name, FieldType::Record)
        }
    }

    /// Create a repeated RECORD field
    pub fn repeated(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            mode: FieldMode::Repeated,
            ..Self::record(name, fields)
        }
    }

    /// Set the mode
    #[must_use]
    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the source path
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Path this field is read from in the raw record
    pub fn source_path(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    pub fn is_repeated(&self) -> bool {
        self.mode == FieldMode::Repeated
    }

    pub fn is_record(&self) -> bool {
        self.field_type == FieldType::Record
    }

    /// Column type for a sink with the given nested encoding
    pub fn column_type(&self, encoding: NestedEncoding) -> String {
        if encoding == NestedEncoding::Json && (self.is_record() || self.is_repeated()) {
            return "JSON".to_string();
        }

        let base = match self.field_type {
            FieldType::Integer => "BIGINT".to_string(),
            FieldType::Float => "DOUBLE".to_string(),
            FieldType::String | FieldType::Json => "VARCHAR".to_string(),
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Timestamp => "TIMESTAMP".to_string(),
            FieldType::Record => {
                let members: Vec<String> = self
                    .fields
                    .iter()
                    .map(|f| format!("{} {}", quote_ident(&f.name), f.column_type(encoding)))
                    .collect();
                format!("STRUCT({})", members.join(", "))
            }
        };

        if self.is_repeated() {
            format!("{base}[]")
        } else {
            base
        }
    }
}

/// Ordered list of fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Get a top-level field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `CREATE TABLE` column list, e.g. `"id" BIGINT NOT NULL, "name" VARCHAR`
    pub fn column_definitions(&self, encoding: NestedEncoding) -> String {
        self.fields
            .iter()
            .map(|f| {
                let null = if f.mode == FieldMode::Required {
                    " NOT NULL"
                } else {
                    ""
                };
                format!("{} {}{null}", quote_ident(&f.name), f.column_type(encoding))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `read_json` columns struct, e.g. `{'id': 'BIGINT', 'name': 'VARCHAR'}`
    pub fn json_columns(&self, encoding: NestedEncoding) -> String {
        let members: Vec<String> = self
            .fields
            .iter()
            .map(|f| {
                format!(
                    "{}: {}",
                    quote_literal(&f.name),
                    quote_literal(&f.column_type(encoding))
                )
            })
            .collect();
        format!("{{{}}}", members.join(", "))
    }
}

/// Quote a SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
