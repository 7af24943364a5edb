//! Schema and entity definition tests

use super::*;
use crate::error::Error;
use crate::pagination::WindowParams;
use crate::types::{EntityId, EntityKind, WriteMode};
use pretty_assertions::assert_eq;
use test_case::test_case;

fn person() -> Field {
    Field::record(
        "assignee",
        vec![
            Field::new("id", FieldType::Integer),
            Field::new("username", FieldType::String),
        ],
    )
}

fn ticket_spec() -> EntitySpec {
    serde_yaml::from_str(
        r"
name: Tickets
kind: incremental
endpoint: tickets
primary_key: [ticket_id]
cursor_key: updated_at
window: updated
schema:
  - { name: ticket_id, type: INTEGER, mode: REQUIRED }
  - { name: updated_at, type: TIMESTAMP }
  - { name: assignee_id, type: INTEGER, source: assignee.id }
",
    )
    .unwrap()
}

// ============================================================================
// Field Types
// ============================================================================

#[test_case(FieldType::Integer, "BIGINT")]
#[test_case(FieldType::Float, "DOUBLE")]
#[test_case(FieldType::String, "VARCHAR")]
#[test_case(FieldType::Json, "VARCHAR")]
#[test_case(FieldType::Boolean, "BOOLEAN")]
#[test_case(FieldType::Timestamp, "TIMESTAMP")]
fn test_scalar_column_types(field_type: FieldType, expected: &str) {
    let field = Field::new("c", field_type);
    assert_eq!(field.column_type(NestedEncoding::Struct), expected);
    assert_eq!(field.column_type(NestedEncoding::Json), expected);
}

#[test]
fn test_record_column_type() {
    assert_eq!(
        person().column_type(NestedEncoding::Struct),
        "STRUCT(\"id\" BIGINT, \"username\" VARCHAR)"
    );
    assert_eq!(person().column_type(NestedEncoding::Json), "JSON");
}

#[test]
fn test_repeated_column_type() {
    let tags = Field::repeated("tags", vec![Field::new("name", FieldType::String)]);
    assert!(tags.is_repeated());
    assert!(tags.is_record());
    assert_eq!(
        tags.column_type(NestedEncoding::Struct),
        "STRUCT(\"name\" VARCHAR)[]"
    );
    assert_eq!(tags.column_type(NestedEncoding::Json), "JSON");
}

#[test]
fn test_field_yaml_aliases() {
    let field: Field = serde_yaml::from_str("{ name: n, type: integer, mode: repeated }").unwrap();
    assert_eq!(field.field_type, FieldType::Integer);
    assert_eq!(field.mode, FieldMode::Repeated);
    assert_eq!(field.column_type(NestedEncoding::Struct), "BIGINT[]");
}

#[test]
fn test_source_path_defaults_to_name() {
    let plain = Field::new("email", FieldType::String);
    assert_eq!(plain.source_path(), "email");

    let mapped = Field::new("assignee_id", FieldType::Integer).with_source("assignee.id");
    assert_eq!(mapped.source_path(), "assignee.id");
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn test_schema_columns() {
    let schema = Schema::new(vec![
        Field::new("id", FieldType::Integer).with_mode(FieldMode::Required),
        person(),
    ]);

    assert_eq!(schema.len(), 2);
    assert_eq!(schema.column_names(), vec!["id", "assignee"]);
    assert_eq!(
        schema.column_definitions(NestedEncoding::Json),
        "\"id\" BIGINT NOT NULL, \"assignee\" JSON"
    );
    assert_eq!(
        schema.json_columns(NestedEncoding::Json),
        "{'id': 'BIGINT', 'assignee': 'JSON'}"
    );
}

#[test]
fn test_quoting() {
    assert_eq!(quote_ident("Tickets"), "\"Tickets\"");
    assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
}

// ============================================================================
// Entity Definitions
// ============================================================================

#[test]
fn test_entity_from_yaml() {
    let spec = ticket_spec();
    assert!(spec.validate().is_ok());
    assert_eq!(spec.kind, EntityKind::Incremental);
    assert_eq!(spec.window, Some(WindowParams::Updated));
    assert_eq!(spec.write_mode(), WriteMode::AppendReconcile);
    assert_eq!(spec.row_key(), "tickets");
    assert_eq!(
        spec.schema.field("assignee_id").unwrap().source_path(),
        "assignee.id"
    );
}

#[test]
fn test_unknown_key_column_rejected() {
    let mut spec = ticket_spec();
    spec.cursor_key = Some("modified".to_string());
    assert!(matches!(spec.validate(), Err(Error::Config { .. })));
}

#[test]
fn test_incremental_needs_window() {
    let mut spec = ticket_spec();
    spec.window = None;
    assert!(spec.validate().is_err());
}

#[test]
fn test_dimension_has_no_keys() {
    let spec: EntitySpec = serde_yaml::from_str(
        r"
name: Groups
kind: dimension
endpoint: groups
schema:
  - { name: group_id, type: INTEGER }
",
    )
    .unwrap();

    assert!(spec.validate().is_ok());
    assert_eq!(spec.write_mode(), WriteMode::Truncate);
    assert!(spec.id_key().is_none());
    assert!(matches!(
        spec.require_cursor_key(),
        Err(Error::Unsupported { .. })
    ));
}

#[test]
fn test_details_endpoint_needs_placeholder() {
    let spec: EntitySpec = serde_yaml::from_str(
        r"
name: TicketsDetails
kind: details
endpoint: tickets
row_key: ticket
primary_key: [ticket_id]
cursor_key: updated_at
parent: Tickets
deleted_table: DeletedTickets
schema:
  - { name: ticket_id, type: INTEGER }
  - { name: updated_at, type: TIMESTAMP }
",
    )
    .unwrap();
    assert!(spec.validate().is_err());
}

#[test]
fn test_detail_path_and_deleted_spec() {
    let spec: EntitySpec = serde_yaml::from_str(
        r#"
name: TicketsDetails
kind: details
endpoint: "tickets/{id}"
row_key: ticket
primary_key: [ticket_id]
cursor_key: updated_at
parent: Tickets
deleted_table: DeletedTickets
schema:
  - { name: ticket_id, type: INTEGER, mode: REQUIRED }
  - { name: updated_at, type: TIMESTAMP }
"#,
    )
    .unwrap();
    assert!(spec.validate().is_ok());

    assert_eq!(spec.detail_path(&EntityId::Int(981)), "tickets/981");

    let deleted = spec.deleted_spec().unwrap();
    assert_eq!(deleted.name, "DeletedTickets");
    assert_eq!(deleted.kind, EntityKind::Deleted);
    assert_eq!(deleted.write_mode(), WriteMode::Append);
    assert_eq!(deleted.schema.column_names(), vec!["ticket_id", DELETED_COLUMN]);
    assert_eq!(
        deleted.schema.field("ticket_id").unwrap().field_type,
        FieldType::Integer
    );
    assert!(deleted.validate().is_ok());
}

#[test]
fn test_no_deleted_spec_without_table() {
    assert!(ticket_spec().deleted_spec().is_none());
}
