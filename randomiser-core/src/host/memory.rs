//! In-memory resource host. Used by the CLI (backed by a world file) and by
//! the tests.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{
    HostError, InstalledObject, LevelIdentity, LoadedObject, ObjectHandle, ResearchRef,
    ResourceHost,
};
use crate::category::Category;
use crate::item::{ObjectKind, Variant};

/// An installed object as the host knows it, including the variants it only
/// reveals once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub kind: ObjectKind,
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source_tags: Vec<String>,
    #[serde(default)]
    pub variants: Vec<i32>,
}

impl ObjectDefinition {
    pub fn ride(identifier: &str, name: &str, variants: &[i32]) -> Self {
        Self {
            kind: ObjectKind::Ride,
            identifier: identifier.to_string(),
            name: name.to_string(),
            source_tags: source_tags_for(identifier),
            variants: variants.to_vec(),
        }
    }

    pub fn group(identifier: &str, name: &str) -> Self {
        Self {
            kind: ObjectKind::SceneryGroup,
            identifier: identifier.to_string(),
            name: name.to_string(),
            source_tags: source_tags_for(identifier),
            variants: Vec::new(),
        }
    }

    pub fn with_source_tags(mut self, tags: &[&str]) -> Self {
        self.source_tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

fn source_tags_for(identifier: &str) -> Vec<String> {
    identifier
        .split('.')
        .next()
        .filter(|prefix| prefix.starts_with("rct") || *prefix == "openrct2")
        .map(|prefix| vec![prefix.to_string()])
        .unwrap_or_default()
}

/// Serializable state of a simulated world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default)]
    pub level: LevelIdentity,
    #[serde(default)]
    pub objects: Vec<ObjectDefinition>,
    /// Load slots for ride objects; the slot index is the handle.
    #[serde(default)]
    pub loaded_rides: Vec<Option<String>>,
    #[serde(default)]
    pub loaded_groups: Vec<Option<String>>,
    #[serde(default)]
    pub adopted: Vec<ResearchRef>,
    #[serde(default)]
    pub pending: Vec<ResearchRef>,
    #[serde(default)]
    pub active_use: BTreeSet<String>,
    /// Category the host assigns to a ride reference with this variant.
    #[serde(default)]
    pub variant_categories: BTreeMap<i32, Category>,
    /// Identifiers whose load always fails.
    #[serde(default)]
    pub broken: BTreeSet<String>,
    /// Identifiers the host refuses to unload.
    #[serde(default)]
    pub pinned: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: WorldState,
    rejected_writes: u32,
    load_calls: usize,
}

impl MemoryHost {
    pub fn new(state: WorldState) -> Self {
        Self {
            state,
            rejected_writes: 0,
            load_calls: 0,
        }
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut WorldState {
        &mut self.state
    }

    pub fn into_state(self) -> WorldState {
        self.state
    }

    pub fn install(&mut self, definition: ObjectDefinition) {
        self.state
            .objects
            .retain(|o| o.identifier != definition.identifier);
        self.state.objects.push(definition);
    }

    pub fn set_variant_category(&mut self, variant: i32, category: Category) {
        self.state.variant_categories.insert(variant, category);
    }

    /// Make the next `count` collection writes fail.
    pub fn reject_next_writes(&mut self, count: u32) {
        self.rejected_writes = count;
    }

    /// Number of load requests that actually loaded something.
    pub fn load_calls(&self) -> usize {
        self.load_calls
    }

    pub fn is_loaded(&self, identifier: &str) -> bool {
        self.slots_for_identifier(identifier).is_some()
    }

    /// Load `identifier` and build a reference to it, as a player action
    /// placing the object into a collection would.
    pub fn research_ref(
        &mut self,
        identifier: &str,
        variant: Option<i32>,
    ) -> Result<ResearchRef, HostError> {
        self.load_object(identifier)?;
        let (kind, slot) = self
            .slots_for_identifier(identifier)
            .ok_or_else(|| HostError::NotInstalled(identifier.to_string()))?;
        let category = match kind {
            ObjectKind::Ride => variant.and_then(|v| self.state.variant_categories.get(&v).copied()),
            ObjectKind::SceneryGroup => Some(Category::Scenery),
        };
        Ok(ResearchRef {
            kind,
            handle: ObjectHandle(slot as u32),
            variant: if kind == ObjectKind::Ride { variant } else { None },
            category,
        })
    }

    fn definition(&self, identifier: &str) -> Option<&ObjectDefinition> {
        self.state
            .objects
            .iter()
            .find(|o| o.identifier == identifier)
    }

    fn slots(&self, kind: ObjectKind) -> &Vec<Option<String>> {
        match kind {
            ObjectKind::Ride => &self.state.loaded_rides,
            ObjectKind::SceneryGroup => &self.state.loaded_groups,
        }
    }

    fn slots_mut(&mut self, kind: ObjectKind) -> &mut Vec<Option<String>> {
        match kind {
            ObjectKind::Ride => &mut self.state.loaded_rides,
            ObjectKind::SceneryGroup => &mut self.state.loaded_groups,
        }
    }

    fn slots_for_identifier(&self, identifier: &str) -> Option<(ObjectKind, usize)> {
        [ObjectKind::Ride, ObjectKind::SceneryGroup]
            .into_iter()
            .find_map(|kind| {
                self.slots(kind)
                    .iter()
                    .position(|slot| slot.as_deref() == Some(identifier))
                    .map(|idx| (kind, idx))
            })
    }

    fn describe(&self, kind: ObjectKind, slot: usize) -> Option<LoadedObject> {
        let identifier = self.slots(kind).get(slot)?.as_ref()?;
        let definition = self.definition(identifier)?;
        Some(LoadedObject {
            kind,
            handle: ObjectHandle(slot as u32),
            identifier: identifier.clone(),
            name: definition.name.clone(),
            variants: definition.variants.clone(),
        })
    }

    /// Assign host categories and drop entries the host cannot represent.
    fn normalise(&self, refs: Vec<ResearchRef>) -> Vec<ResearchRef> {
        refs.into_iter()
            .filter_map(|mut r| match r.kind {
                ObjectKind::Ride => {
                    let variant = r.variant.and_then(Variant::from_raw)?;
                    let category = self.state.variant_categories.get(&variant.raw())?;
                    r.category = Some(*category);
                    Some(r)
                }
                ObjectKind::SceneryGroup => {
                    r.variant = None;
                    r.category = Some(Category::Scenery);
                    Some(r)
                }
            })
            .collect()
    }

    fn check_write(&mut self) -> Result<(), HostError> {
        if self.rejected_writes > 0 {
            self.rejected_writes -= 1;
            return Err(HostError::Rejected("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl ResourceHost for MemoryHost {
    fn installed_objects(&self) -> Result<Vec<InstalledObject>, HostError> {
        Ok(self
            .state
            .objects
            .iter()
            .map(|o| InstalledObject {
                kind: o.kind,
                identifier: o.identifier.clone(),
                name: o.name.clone(),
                source_tags: o.source_tags.clone(),
            })
            .collect())
    }

    fn load_object(&mut self, identifier: &str) -> Result<(), HostError> {
        if self.slots_for_identifier(identifier).is_some() {
            return Ok(());
        }
        let kind = self
            .definition(identifier)
            .map(|d| d.kind)
            .ok_or_else(|| HostError::NotInstalled(identifier.to_string()))?;
        if self.state.broken.contains(identifier) {
            return Err(HostError::LoadFailed {
                identifier: identifier.to_string(),
                reason: "object data is corrupt".to_string(),
            });
        }

        let slots = self.slots_mut(kind);
        match slots.iter().position(Option::is_none) {
            Some(free) => slots[free] = Some(identifier.to_string()),
            None => slots.push(Some(identifier.to_string())),
        }
        self.load_calls += 1;
        Ok(())
    }

    fn unload_object(&mut self, identifier: &str) -> Result<(), HostError> {
        if self.state.pinned.contains(identifier) {
            return Err(HostError::UnloadFailed {
                identifier: identifier.to_string(),
                reason: "object is pinned".to_string(),
            });
        }
        let (kind, slot) =
            self.slots_for_identifier(identifier)
                .ok_or_else(|| HostError::UnloadFailed {
                    identifier: identifier.to_string(),
                    reason: "object is not loaded".to_string(),
                })?;
        self.slots_mut(kind)[slot] = None;
        Ok(())
    }

    fn loaded_objects(&self, kind: ObjectKind) -> Result<Vec<LoadedObject>, HostError> {
        Ok((0..self.slots(kind).len())
            .filter_map(|slot| self.describe(kind, slot))
            .collect())
    }

    fn loaded_object(&self, kind: ObjectKind, handle: ObjectHandle) -> Option<LoadedObject> {
        self.describe(kind, handle.0 as usize)
    }

    fn adopted(&self) -> Vec<ResearchRef> {
        self.state.adopted.clone()
    }

    fn set_adopted(&mut self, refs: Vec<ResearchRef>) -> Result<(), HostError> {
        self.check_write()?;
        self.state.adopted = self.normalise(refs);
        Ok(())
    }

    fn pending(&self) -> Vec<ResearchRef> {
        self.state.pending.clone()
    }

    fn set_pending(&mut self, refs: Vec<ResearchRef>) -> Result<(), HostError> {
        self.check_write()?;
        self.state.pending = self.normalise(refs);
        Ok(())
    }

    fn active_use_identifiers(&self) -> Result<HashSet<String>, HostError> {
        Ok(self.state.active_use.iter().cloned().collect())
    }

    fn level(&self) -> LevelIdentity {
        self.state.level.clone()
    }
}
