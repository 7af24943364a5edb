//! CLI runner - executes commands

use crate::catalog::Catalog;
use crate::cli::commands::{Cli, Commands};
use crate::config::SyncSettings;
use crate::engine::{SyncOrchestrator, TriggerRequest};
use crate::error::Result;
use crate::types::{EntityId, JsonValue};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let settings = self.settings()?;

        match &self.cli.command {
            Commands::Run {
                table,
                start,
                end,
                ids,
            } => {
                let request = TriggerRequest {
                    table: Some(table.clone()),
                    start: start.clone(),
                    end: end.clone(),
                    ids: ids.as_deref().map(parse_ids).unwrap_or_default(),
                    ..TriggerRequest::default()
                };
                self.trigger(&settings, &request).await
            }
            Commands::Tasks { group, start, end } => {
                let request = TriggerRequest {
                    tasks: Some(JsonValue::String(group.clone())),
                    start: start.clone(),
                    end: end.clone(),
                    ..TriggerRequest::default()
                };
                self.trigger(&settings, &request).await
            }
            Commands::Broadcast => {
                let request = TriggerRequest {
                    broadcast: Some(true),
                    ..TriggerRequest::default()
                };
                self.trigger(&settings, &request).await
            }
            Commands::Entities => self.entities(&settings),
            Commands::Serve { port } => {
                let orchestrator = SyncOrchestrator::from_settings(&settings)?;
                crate::cli::serve(Arc::new(orchestrator), *port).await
            }
        }
    }

    /// Settings file (if any) overridden by the environment
    fn settings(&self) -> Result<SyncSettings> {
        let settings = match &self.cli.config {
            Some(path) => SyncSettings::from_file(path)?,
            None => SyncSettings::default(),
        };
        Ok(settings.with_env())
    }

    async fn trigger(&self, settings: &SyncSettings, request: &TriggerRequest) -> Result<()> {
        let orchestrator = SyncOrchestrator::from_settings(settings)?;
        let response = orchestrator.handle(request).await?;
        print_json(&response)
    }

    fn entities(&self, settings: &SyncSettings) -> Result<()> {
        let mut catalog = Catalog::builtin()?;
        if let Some(ref path) = settings.entities_file {
            catalog = catalog.extend_from_file(path)?;
        }

        let entities: Vec<_> = catalog
            .entities()
            .iter()
            .map(|e| {
                json!({
                    "name": e.name,
                    "kind": e.kind,
                    "endpoint": e.endpoint,
                    "primary_key": e.primary_key,
                    "cursor_key": e.cursor_key,
                })
            })
            .collect();
        print_json(&entities)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a comma-separated id list, skipping blanks
pub fn parse_ids(value: &str) -> Vec<EntityId> {
    value
        .split(',')
        .filter_map(|id| EntityId::from_json(&JsonValue::String(id.trim().to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!(
            parse_ids("1, 2,,abc "),
            vec![
                EntityId::Int(1),
                EntityId::Int(2),
                EntityId::Text("abc".to_string())
            ]
        );
        assert!(parse_ids("").is_empty());
    }
}
