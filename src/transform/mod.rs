//! Transformer module
//!
//! Projects raw API records onto an entity schema. The projection is
//! total: any input shape produces a row with exactly the schema's
//! columns, in schema order.
//!
//! - Missing or unparseable scalars become `null`
//! - A RECORD with no usable source value becomes `{}`
//! - A REPEATED field with no usable source value becomes `[]`
//! - JSON fields carry the source value serialized as text

use crate::schema::{Field, FieldType, Schema};
use crate::types::{parse_timestamp, EntityId, JsonObject, JsonValue, SQL_TIMESTAMP_FORMAT};
use std::collections::BTreeSet;

/// Transform a batch of raw records
pub fn transform_rows(schema: &Schema, rows: &[JsonValue]) -> Vec<JsonObject> {
    rows.iter().map(|row| transform_row(schema, row)).collect()
}

/// Transform one raw record
pub fn transform_row(schema: &Schema, row: &JsonValue) -> JsonObject {
    project_fields(&schema.fields, row)
}

/// Distinct, non-null values of `key` across transformed rows, sorted
pub fn primary_key_ids(rows: &[JsonObject], key: &str) -> Vec<EntityId> {
    rows.iter()
        .filter_map(|row| row.get(key).and_then(EntityId::from_json))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn project_fields(fields: &[Field], source: &JsonValue) -> JsonObject {
    fields
        .iter()
        .map(|field| {
            let value = lookup(source, field.source_path());
            (field.name.clone(), project_field(field, value))
        })
        .collect()
}

fn project_field(field: &Field, value: Option<&JsonValue>) -> JsonValue {
    if field.is_repeated() {
        let items = match value {
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| project_single(field, Some(item)))
                .collect(),
            _ => Vec::new(),
        };
        return JsonValue::Array(items);
    }
    project_single(field, value)
}

fn project_single(field: &Field, value: Option<&JsonValue>) -> JsonValue {
    match field.field_type {
        FieldType::Record => match value {
            Some(obj @ JsonValue::Object(map)) if !map.is_empty() => {
                JsonValue::Object(project_fields(&field.fields, obj))
            }
            _ => JsonValue::Object(JsonObject::new()),
        },
        FieldType::Json => match value {
            None | Some(JsonValue::Null) => JsonValue::Null,
            Some(v) => JsonValue::String(v.to_string()),
        },
        scalar => value.map_or(JsonValue::Null, |v| coerce(scalar, v)),
    }
}

/// Resolve a dotted path (`assignee.id`) inside a record
fn lookup<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .try_fold(value, |current, part| current.as_object()?.get(part))
}

/// Coerce a scalar value to the column type; `null` when it does not fit
fn coerce(field_type: FieldType, value: &JsonValue) -> JsonValue {
    match (field_type, value) {
        (_, JsonValue::Null) => JsonValue::Null,
        (_, JsonValue::String(s)) if s.trim().is_empty() && field_type != FieldType::String => {
            JsonValue::Null
        }

        (FieldType::Integer, JsonValue::Number(n)) => n
            .as_i64()
            .map(JsonValue::from)
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| JsonValue::from(f as i64))
            })
            .unwrap_or(JsonValue::Null),
        (FieldType::Integer, JsonValue::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(JsonValue::from)
            .unwrap_or(JsonValue::Null),
        (FieldType::Integer, JsonValue::Bool(b)) => JsonValue::from(i64::from(*b)),

        (FieldType::Float, JsonValue::Number(n)) => {
            n.as_f64().map_or(JsonValue::Null, JsonValue::from)
        }
        (FieldType::Float, JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map_or(JsonValue::Null, JsonValue::from),

        (FieldType::String, JsonValue::String(_)) => value.clone(),
        (FieldType::String, JsonValue::Number(n)) => JsonValue::String(n.to_string()),
        (FieldType::String, JsonValue::Bool(b)) => JsonValue::String(b.to_string()),
        (FieldType::String, other) => JsonValue::String(other.to_string()),

        (FieldType::Boolean, JsonValue::Bool(_)) => value.clone(),
        (FieldType::Boolean, JsonValue::Number(n)) => {
            n.as_f64().map_or(JsonValue::Null, |f| JsonValue::Bool(f != 0.0))
        }
        (FieldType::Boolean, JsonValue::String(s)) => match s.trim().to_ascii_lowercase().as_str()
        {
            "true" | "1" | "yes" => JsonValue::Bool(true),
            "false" | "0" | "no" => JsonValue::Bool(false),
            _ => JsonValue::Null,
        },

        (FieldType::Timestamp, JsonValue::String(s)) => parse_timestamp(s).map_or(
            JsonValue::Null,
            |ts| JsonValue::String(ts.format(SQL_TIMESTAMP_FORMAT).to_string()),
        ),

        _ => JsonValue::Null,
    }
}
