//! Built-in entity definitions embedded in the binary
//!
//! Each synced Caresoft resource is described by a YAML file under
//! `entities/`, compiled in so the binary needs no files at runtime.

use crate::error::{Error, Result};
use crate::schema::EntitySpec;
use crate::types::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Built-in entity YAML definitions, in fan-out order
pub static BUILTIN_ENTITIES: &[(&str, &str)] = &[
    // Dimensions
    ("Agents", include_str!("../entities/agents.yaml")),
    ("Groups", include_str!("../entities/groups.yaml")),
    ("Services", include_str!("../entities/services.yaml")),
    (
        "TicketsCustomFields",
        include_str!("../entities/tickets_custom_fields.yaml"),
    ),
    (
        "ContactsCustomFields",
        include_str!("../entities/contacts_custom_fields.yaml"),
    ),
    // Incremental
    ("Tickets", include_str!("../entities/tickets.yaml")),
    ("Contacts", include_str!("../entities/contacts.yaml")),
    ("Calls", include_str!("../entities/calls.yaml")),
    // Details
    (
        "TicketsDetails",
        include_str!("../entities/tickets_details.yaml"),
    ),
    (
        "ContactsDetails",
        include_str!("../entities/contacts_details.yaml"),
    ),
];

/// Subset of the catalog targeted by a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskGroup {
    /// Dimension entities
    Static,
    /// Incremental and details entities
    #[serde(rename = "incre")]
    Incremental,
    /// Every entity
    All,
}

impl TaskGroup {
    pub fn includes(self, kind: EntityKind) -> bool {
        match self {
            TaskGroup::All => kind != EntityKind::Deleted,
            TaskGroup::Static => kind == EntityKind::Dimension,
            TaskGroup::Incremental => {
                matches!(kind, EntityKind::Incremental | EntityKind::Details)
            }
        }
    }
}

impl FromStr for TaskGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(TaskGroup::Static),
            "incre" | "incremental" => Ok(TaskGroup::Incremental),
            "all" | "true" => Ok(TaskGroup::All),
            _ => Err(Error::UnknownGroup {
                group: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskGroup::Static => write!(f, "static"),
            TaskGroup::Incremental => write!(f, "incre"),
            TaskGroup::All => write!(f, "all"),
        }
    }
}

/// Registry of synced entities, looked up by table name
#[derive(Debug, Clone)]
pub struct Catalog {
    entities: Vec<EntitySpec>,
}

impl Catalog {
    /// Catalog of the built-in Caresoft entities
    pub fn builtin() -> Result<Self> {
        let entities = BUILTIN_ENTITIES
            .iter()
            .map(|(_, yaml)| load_entity_from_str(yaml))
            .collect::<Result<Vec<_>>>()?;
        Self::new(entities)
    }

    /// Build a catalog, checking cross-entity references
    pub fn new(entities: Vec<EntitySpec>) -> Result<Self> {
        let catalog = Self { entities };

        for entity in &catalog.entities {
            if let Some(details) = &entity.details {
                let child = catalog.get(details)?;
                if child.kind != EntityKind::Details {
                    return Err(Error::config(format!(
                        "'{}' lists '{}' as details, but it is not a details entity",
                        entity.name, details
                    )));
                }
            }
            if let Some(parent) = &entity.parent {
                catalog.get(parent)?;
            }
        }

        Ok(catalog)
    }

    /// Add entities from a YAML file, replacing built-ins of the same name
    pub fn extend_from_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read entity file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;

        let extra: Vec<EntitySpec> = serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse entity YAML: {e}")))?;

        let mut entities = self.entities;
        for entity in extra {
            entity.validate()?;
            entities.retain(|e| e.name != entity.name);
            entities.push(entity);
        }
        Self::new(entities)
    }

    /// Look up an entity by table name
    pub fn get(&self, name: &str) -> Result<&EntitySpec> {
        self.entities
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::unknown_entity(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }

    /// Entities of a fan-out group, in catalog order
    pub fn group(&self, group: TaskGroup) -> Vec<&EntitySpec> {
        self.entities
            .iter()
            .filter(|e| group.includes(e.kind))
            .collect()
    }

    pub fn entities(&self) -> &[EntitySpec] {
        &self.entities
    }
}

/// Load one entity definition from a YAML string
pub fn load_entity_from_str(yaml: &str) -> Result<EntitySpec> {
    let entity: EntitySpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse entity YAML: {e}")))?;

    entity.validate()?;
    Ok(entity)
}
