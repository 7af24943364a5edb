//! Deduplication after an append
//!
//! Partitions the table by primary key and keeps the row with the greatest
//! cursor in each partition. Running it twice is a no-op, and overlapping
//! windows converge because the later cursor always wins.

use crate::error::Result;
use crate::schema::{quote_ident, EntitySpec};
use crate::template::{self, TemplateContext};

/// Reconciliation script. Ties on the cursor keep an arbitrary row.
pub const RECONCILE_SQL: &str = r"
DROP TABLE IF EXISTS {{ staging }};
CREATE TABLE {{ staging }} AS
SELECT * FROM {{ relation }}
QUALIFY ROW_NUMBER() OVER (
    PARTITION BY {{ primary_key }}
    ORDER BY {{ cursor }} DESC NULLS LAST
) = 1;
DELETE FROM {{ relation }};
INSERT INTO {{ relation }} SELECT * FROM {{ staging }}{{ order_by }};
DROP TABLE {{ staging }};
";

/// Inputs of the reconciliation script for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationQuery {
    pub relation: String,
    pub staging: String,
    pub primary_key: Vec<String>,
    pub cursor: String,
    pub partition_key: Option<String>,
}

impl ReconciliationQuery {
    /// Build the query for an entity stored at `relation`
    pub fn for_entity(relation: String, staging: String, entity: &EntitySpec) -> Result<Self> {
        entity.require_id_key()?;
        let cursor = entity.require_cursor_key()?.to_string();

        Ok(Self {
            relation,
            staging,
            primary_key: entity.primary_key.clone(),
            cursor,
            partition_key: entity.partition_key.clone(),
        })
    }

    pub fn render(&self) -> Result<String> {
        let primary_key = self
            .primary_key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let order_by = self
            .partition_key
            .as_deref()
            .map(|k| format!(" ORDER BY {}", quote_ident(k)))
            .unwrap_or_default();

        let ctx = TemplateContext::new()
            .with("relation", self.relation.as_str())
            .with("staging", self.staging.as_str())
            .with("primary_key", primary_key)
            .with("cursor", quote_ident(&self.cursor))
            .with("order_by", order_by);

        template::render(RECONCILE_SQL, &ctx)
    }
}
