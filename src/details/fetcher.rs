//! Concurrent per-id fetcher

use crate::error::{Error, Result};
use crate::http::{FetchOutcome, RateLimitedClient};
use crate::schema::{EntitySpec, DELETED_COLUMN};
use crate::types::{EntityId, JsonObject, JsonValue};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of detail requests in flight at once
pub const DEFAULT_DETAIL_CONCURRENCY: usize = 50;

/// Record that an id no longer exists at the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionMarker {
    pub id: EntityId,
    pub deleted: bool,
}

impl DeletionMarker {
    pub fn new(id: EntityId) -> Self {
        Self { id, deleted: true }
    }

    /// Row for the deleted-markers table, keyed by `key`
    pub fn to_row(&self, key: &str) -> JsonObject {
        let mut row = JsonObject::new();
        row.insert(key.to_string(), self.id.to_json());
        row.insert(DELETED_COLUMN.to_string(), JsonValue::Bool(self.deleted));
        row
    }
}

/// Result of a detail fetch, split into present and deleted ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailBatch {
    /// Raw records of ids that still exist
    pub present: Vec<JsonValue>,
    pub deleted: Vec<DeletionMarker>,
}

impl DetailBatch {
    pub fn is_empty(&self) -> bool {
        self.present.is_empty() && self.deleted.is_empty()
    }

    /// Deleted-markers rows keyed by `key`
    pub fn deleted_rows(&self, key: &str) -> Vec<JsonObject> {
        self.deleted.iter().map(|m| m.to_row(key)).collect()
    }
}

enum Fetched {
    Present(JsonValue),
    Deleted(DeletionMarker),
}

/// Fetches detail records for a set of ids
#[derive(Debug, Clone)]
pub struct DetailFetcher {
    client: Arc<RateLimitedClient>,
    concurrency: usize,
}

impl DetailFetcher {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self {
            client,
            concurrency: DEFAULT_DETAIL_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetch every distinct id. Fails only on unclassified transport errors
    /// or a success response without the entity's row key.
    pub async fn fetch_many(&self, entity: &EntitySpec, ids: &[EntityId]) -> Result<DetailBatch> {
        let unique: BTreeSet<&EntityId> = ids.iter().collect();
        info!("{}: fetching {} detail record(s)", entity.name, unique.len());

        let requests: Vec<_> = unique
            .into_iter()
            .map(|id| self.fetch_one(entity, id))
            .collect();
        let fetched: Vec<Fetched> = stream::iter(requests)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut batch = DetailBatch::default();
        for item in fetched {
            match item {
                Fetched::Present(row) => batch.present.push(row),
                Fetched::Deleted(marker) => batch.deleted.push(marker),
            }
        }

        info!(
            "{}: {} present, {} deleted",
            entity.name,
            batch.present.len(),
            batch.deleted.len()
        );
        Ok(batch)
    }

    async fn fetch_one(&self, entity: &EntitySpec, id: &EntityId) -> Result<Fetched> {
        let path = entity.detail_path(id);
        match self.client.fetch_detail(&path).await? {
            FetchOutcome::Found(mut body) => {
                let row_key = entity.row_key();
                match body.get_mut(row_key).map(JsonValue::take) {
                    Some(row @ JsonValue::Object(_)) => Ok(Fetched::Present(row)),
                    _ => Err(Error::missing_key(path, row_key)),
                }
            }
            FetchOutcome::Gone { status } => {
                debug!("{}: id {} gone ({})", entity.name, id, status);
                Ok(Fetched::Deleted(DeletionMarker::new(id.clone())))
            }
        }
    }
}
