//! Contract with the resource host that owns loadable objects and the two
//! live research collections.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::category::Category;
use crate::item::ObjectKind;

pub mod files;
pub mod memory;

pub use memory::{MemoryHost, ObjectDefinition, WorldState};

/// Transient numeric slot the host assigns to a loaded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledObject {
    pub kind: ObjectKind,
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub source_tags: Vec<String>,
}

/// Handle bundle for an object that is currently loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedObject {
    pub kind: ObjectKind,
    pub handle: ObjectHandle,
    pub identifier: String,
    pub name: String,
    /// Raw variant values as reported by the host, unfiltered.
    #[serde(default)]
    pub variants: Vec<i32>,
}

/// Opaque entry of a live research collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRef {
    pub kind: ObjectKind,
    pub handle: ObjectHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelIdentity {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl LevelIdentity {
    /// Key under which the per-level baseline is stored.
    pub fn key(&self) -> String {
        format!("{}|{}x{}", self.name, self.width, self.height)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("object '{0}' is not installed")]
    NotInstalled(String),
    #[error("failed to load '{identifier}': {reason}")]
    LoadFailed { identifier: String, reason: String },
    #[error("failed to unload '{identifier}': {reason}")]
    UnloadFailed { identifier: String, reason: String },
    #[error("resource host unavailable: {0}")]
    Unavailable(String),
    #[error("collection write rejected: {0}")]
    Rejected(String),
}

pub trait ResourceHost {
    fn installed_objects(&self) -> Result<Vec<InstalledObject>, HostError>;

    fn load_object(&mut self, identifier: &str) -> Result<(), HostError>;

    fn unload_object(&mut self, identifier: &str) -> Result<(), HostError>;

    fn loaded_objects(&self, kind: ObjectKind) -> Result<Vec<LoadedObject>, HostError>;

    /// Look up whatever currently occupies `handle`.
    fn loaded_object(&self, kind: ObjectKind, handle: ObjectHandle) -> Option<LoadedObject>;

    fn adopted(&self) -> Vec<ResearchRef>;

    fn set_adopted(&mut self, refs: Vec<ResearchRef>) -> Result<(), HostError>;

    fn pending(&self) -> Vec<ResearchRef>;

    fn set_pending(&mut self, refs: Vec<ResearchRef>) -> Result<(), HostError>;

    /// Identifiers of objects currently instantiated in the live world.
    fn active_use_identifiers(&self) -> Result<HashSet<String>, HostError>;

    fn level(&self) -> LevelIdentity;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_key_combines_name_and_size() {
        let level = LevelIdentity {
            name: "Forest Frontiers".to_string(),
            width: 128,
            height: 96,
        };
        assert_eq!(level.key(), "Forest Frontiers|128x96");
    }
}
