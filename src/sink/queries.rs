//! Read-side SQL templates

use crate::error::Result;
use crate::schema::quote_ident;
use crate::template::{self, TemplateContext};

/// Highest cursor value already loaded into a table
pub const WATERMARK_SQL: &str = "SELECT MAX({{ cursor }}) AS watermark FROM {{ relation }}";

/// Parent ids whose details are missing or older than the parent row,
/// excluding ids already marked deleted. Newest parents first.
pub const DETAIL_CANDIDATES_SQL: &str = r"
SELECT p.{{ key }} AS id
FROM {{ parent }} AS p
LEFT JOIN {{ details }} AS d ON p.{{ key }} = d.{{ key }}
LEFT JOIN {{ deleted }} AS x ON p.{{ key }} = x.{{ key }}
WHERE x.{{ key }} IS NULL
  AND (d.{{ key }} IS NULL OR d.{{ cursor }} IS NULL OR d.{{ cursor }} < p.{{ cursor }})
ORDER BY p.{{ cursor }} DESC
LIMIT {{ limit }}
";

pub fn watermark_sql(relation: &str, cursor: &str) -> Result<String> {
    let ctx = TemplateContext::new()
        .with("relation", relation)
        .with("cursor", quote_ident(cursor));
    template::render(WATERMARK_SQL, &ctx)
}

pub fn detail_candidates_sql(
    parent: &str,
    details: &str,
    deleted: &str,
    key: &str,
    cursor: &str,
    limit: usize,
) -> Result<String> {
    let ctx = TemplateContext::new()
        .with("parent", parent)
        .with("details", details)
        .with("deleted", deleted)
        .with("key", quote_ident(key))
        .with("cursor", quote_ident(cursor))
        .with("limit", limit);
    template::render(DETAIL_CANDIDATES_SQL, &ctx)
}
