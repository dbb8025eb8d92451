//! Installed-object catalog and the scan that learns ride categories.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::category::{Category, CategoryCounts};
use crate::collections::{loaded_identifiers, snapshot, unload_and_purge, with_temporary_collections};
use crate::host::{InstalledObject, ResearchRef, ResourceHost};
use crate::identity::{ensure_loaded, list_variants, resolve_handle};
use crate::item::{ObjectKind, ResearchItem, StableKey, Variant};
use crate::protect::ProtectedSet;
use crate::store::UnusableVariants;
use crate::{ResearchError, Result};

const WHITELISTED_SOURCES: &[&str] = &["rct1", "rct1aa", "rct1ll", "rct2", "rct2ww", "rct2tt", "openrct2"];
const WHITELISTED_PREFIXES: &[&str] = &["rct1.", "rct2.", "openrct2."];

/// Category assumed when probing a variant nobody has classified yet.
const PROBE_HYPOTHESIS: Category = Category::Gentle;

/// Whether an object comes from outside the base game sources.
pub fn is_custom_source(identifier: &str, source_tags: &[String]) -> bool {
    let tagged = source_tags
        .iter()
        .any(|tag| WHITELISTED_SOURCES.contains(&tag.trim().to_ascii_lowercase().as_str()));
    let prefixed = WHITELISTED_PREFIXES
        .iter()
        .any(|prefix| identifier.to_ascii_lowercase().starts_with(prefix));
    !(tagged || prefixed)
}

/// Lowercase alphanumerics of a display name, so "Merry-Go-Round" and
/// "merry go round" compare equal. Falls back to the identifier when the
/// name has nothing left.
pub fn normalize_name(name: &str, identifier: &str) -> String {
    let normalized: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    if normalized.is_empty() {
        identifier.to_ascii_lowercase()
    } else {
        normalized
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub kind: ObjectKind,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub signature: String,
}

impl CatalogEntry {
    pub fn stable_key(&self) -> Option<StableKey> {
        match self.kind {
            ObjectKind::Ride => Some(StableKey::Ride {
                identifier: self.identifier.clone(),
                variant: self.variant?,
            }),
            ObjectKind::SceneryGroup => Some(StableKey::Group {
                identifier: self.identifier.clone(),
            }),
        }
    }

    /// The canonical record, once the entry is categorised.
    pub fn to_item(&self) -> Option<ResearchItem> {
        match self.kind {
            ObjectKind::Ride => Some(ResearchItem::ride(
                self.identifier.clone(),
                self.variant?,
                self.category?,
            )),
            ObjectKind::SceneryGroup => Some(ResearchItem::group(self.identifier.clone())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    entries: BTreeMap<String, CatalogEntry>,
    /// Every identifier a scan has enumerated, including rides that turned
    /// out to have no valid variant.
    #[serde(default)]
    scanned: BTreeSet<String>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn get(&self, key: &StableKey) -> Option<&CatalogEntry> {
        self.entries.get(&key.to_string())
    }

    pub fn has_scanned(&self, identifier: &str) -> bool {
        self.scanned.contains(identifier)
    }

    pub fn mark_scanned(&mut self, identifier: &str) {
        self.scanned.insert(identifier.to_string());
    }

    /// Categorised ride entries for `identifier`, in variant order.
    pub fn rides_for(&self, identifier: &str) -> Vec<&CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.kind == ObjectKind::Ride && e.identifier == identifier && e.category.is_some())
            .collect()
    }

    /// Insert or refresh a ride entry. A category learned earlier is kept.
    pub fn upsert_ride(&mut self, object: &InstalledObject, variant: Variant) -> bool {
        let key = StableKey::Ride {
            identifier: object.identifier.clone(),
            variant,
        };
        self.upsert(key, object, Some(variant), None)
    }

    pub fn upsert_group(&mut self, object: &InstalledObject) -> bool {
        let key = StableKey::Group {
            identifier: object.identifier.clone(),
        };
        self.upsert(key, object, None, Some(Category::Scenery))
    }

    fn upsert(
        &mut self,
        key: StableKey,
        object: &InstalledObject,
        variant: Option<Variant>,
        category: Option<Category>,
    ) -> bool {
        let custom = is_custom_source(&object.identifier, &object.source_tags);
        let signature = normalize_name(&object.name, &object.identifier);
        match self.entries.get_mut(&key.to_string()) {
            Some(entry) => {
                entry.name = object.name.clone();
                entry.custom = custom;
                entry.signature = signature;
                if entry.category.is_none() {
                    entry.category = category;
                }
                false
            }
            None => {
                self.entries.insert(
                    key.to_string(),
                    CatalogEntry {
                        kind: object.kind,
                        identifier: object.identifier.clone(),
                        variant,
                        category,
                        name: object.name.clone(),
                        custom,
                        signature,
                    },
                );
                true
            }
        }
    }

    /// Variant to category mapping taught by entries already categorised.
    pub fn learned_categories(&self) -> BTreeMap<Variant, Category> {
        self.entries
            .values()
            .filter_map(|e| Some((e.variant?, e.category?)))
            .collect()
    }

    /// Write learned categories into every ride entry sharing the variant.
    /// Returns how many entries changed.
    pub fn apply_learned(&mut self, learned: &BTreeMap<Variant, Category>) -> usize {
        let mut changed = 0;
        for entry in self.entries.values_mut() {
            let Some(variant) = entry.variant else { continue };
            if let Some(&category) = learned.get(&variant) {
                if entry.category != Some(category) {
                    entry.category = Some(category);
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Ride entries still waiting for a category, skipping unusable variants.
    pub fn uncategorised(&self, unusable: &UnusableVariants) -> Vec<&CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.kind == ObjectKind::Ride && e.category.is_none())
            .filter(|e| e.variant.map_or(true, |v| !unusable.contains(v.raw())))
            .collect()
    }

    pub fn category_summary(&self) -> CategoryCounts {
        self.entries
            .values()
            .filter_map(|e| e.category)
            .map(|c| (c, 1))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStatus {
    pub needed: bool,
    pub reason: Option<String>,
}

impl ScanStatus {
    fn needed(reason: impl Into<String>) -> Self {
        Self {
            needed: true,
            reason: Some(reason.into()),
        }
    }
}

pub fn compute_scan_needed<H: ResourceHost + ?Sized>(
    host: &H,
    catalog: &Catalog,
    unusable: &UnusableVariants,
) -> ScanStatus {
    let installed = match host.installed_objects() {
        Ok(installed) => installed,
        Err(err) => return ScanStatus::needed(format!("object list unavailable: {err}")),
    };
    let uncategorised = catalog.uncategorised(unusable).len();
    if uncategorised > 0 {
        return ScanStatus::needed(format!("{uncategorised} uncategorised ride variants"));
    }
    let unscanned = |kind: ObjectKind| {
        installed
            .iter()
            .filter(|o| o.kind == kind && !catalog.has_scanned(&o.identifier))
            .count()
    };
    let new_rides = unscanned(ObjectKind::Ride);
    if new_rides > 0 {
        return ScanStatus::needed(format!("{new_rides} new rides"));
    }
    let new_groups = unscanned(ObjectKind::SceneryGroup);
    if new_groups > 0 {
        return ScanStatus::needed(format!("{new_groups} new scenery groups"));
    }
    ScanStatus::default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub installed: usize,
    pub new_entries: usize,
    pub learned_from_collections: usize,
    pub probed: usize,
    pub learned_from_probes: usize,
    pub newly_unusable: Vec<i32>,
    pub entries_updated: usize,
    pub unloaded: usize,
    pub load_failures: Vec<String>,
    pub unload_failures: Vec<String>,
    pub probe_failures: Vec<String>,
    pub restore_failure: Option<String>,
}

/// Build or refresh `catalog` from everything installed, learn ride
/// categories and leave the host's loaded set and collections as found.
pub fn run_scan<H: ResourceHost + ?Sized>(
    host: &mut H,
    catalog: &mut Catalog,
    unusable: &mut UnusableVariants,
    protected: &ProtectedSet,
) -> Result<ScanReport> {
    let mut report = ScanReport::default();
    let loaded_before = loaded_identifiers(host);
    let installed = host.installed_objects().map_err(ResearchError::Host)?;
    report.installed = installed.len();

    for object in &installed {
        match object.kind {
            ObjectKind::SceneryGroup => {
                if catalog.upsert_group(object) {
                    report.new_entries += 1;
                }
                catalog.mark_scanned(&object.identifier);
            }
            ObjectKind::Ride => {
                // A ride that will not load is still marked scanned so it
                // does not keep the catalog out of date.
                let loaded = if ensure_loaded(host, ObjectKind::Ride, &object.identifier) {
                    resolve_handle(host, ObjectKind::Ride, &object.identifier)
                } else {
                    None
                };
                let Some(loaded) = loaded else {
                    warn!(identifier = %object.identifier, "ride failed to load during scan");
                    report.load_failures.push(object.identifier.clone());
                    catalog.mark_scanned(&object.identifier);
                    continue;
                };
                for variant in list_variants(&loaded) {
                    if catalog.upsert_ride(object, variant) {
                        report.new_entries += 1;
                    }
                }
                catalog.mark_scanned(&object.identifier);
            }
        }
    }

    let mut learned = catalog.learned_categories();
    for (item, _) in snapshot(host).iter() {
        if let ResearchItem::Ride { variant, category, .. } = item {
            if learned.insert(*variant, *category) != Some(*category) {
                report.learned_from_collections += 1;
            }
        }
    }

    // One representative identifier per variant nobody has classified yet.
    let mut unknown: BTreeMap<Variant, String> = BTreeMap::new();
    for entry in catalog.uncategorised(unusable) {
        let Some(variant) = entry.variant else { continue };
        if !learned.contains_key(&variant) {
            unknown.entry(variant).or_insert_with(|| entry.identifier.clone());
        }
    }

    if !unknown.is_empty() {
        report.probed = unknown.len();
        let (outcomes, restored) = with_temporary_collections(host, |h| {
            unknown
                .iter()
                .map(|(variant, identifier)| (*variant, probe_variant(h, identifier, *variant)))
                .collect::<Vec<_>>()
        });
        if let Err(err) = restored {
            warn!(error = %err, "restoring collections after probing failed");
            report.restore_failure = Some(err.to_string());
        }
        for (variant, outcome) in outcomes {
            match outcome {
                Ok(category) => {
                    debug!(variant = variant.raw(), category = %category, "learned category by probe");
                    learned.insert(variant, category);
                    report.learned_from_probes += 1;
                }
                Err(reason) => {
                    debug!(variant = variant.raw(), reason = %reason, "variant unusable");
                    report.probe_failures.push(format!("variant {variant}: {reason}"));
                    if unusable.insert(variant.raw()) {
                        report.newly_unusable.push(variant.raw());
                    }
                }
            }
        }
    }

    report.entries_updated = catalog.apply_learned(&learned);

    let restored = snapshot(host);
    for (kind, identifier) in loaded_identifiers(host).difference(&loaded_before) {
        if protected.contains(identifier) || restored.contains_identifier(*kind, identifier) {
            continue;
        }
        match unload_and_purge(host, *kind, identifier) {
            Ok(()) => report.unloaded += 1,
            Err(err) => report.unload_failures.push(err.to_string()),
        }
    }

    info!(
        installed = report.installed,
        entries = catalog.len(),
        probed = report.probed,
        unusable = report.newly_unusable.len(),
        unloaded = report.unloaded,
        "scan complete"
    );
    Ok(report)
}

fn probe_variant<H: ResourceHost + ?Sized>(
    host: &mut H,
    identifier: &str,
    variant: Variant,
) -> std::result::Result<Category, String> {
    let loaded = resolve_handle(host, ObjectKind::Ride, identifier)
        .ok_or_else(|| format!("'{identifier}' is not loaded"))?;
    let probe = ResearchRef {
        kind: ObjectKind::Ride,
        handle: loaded.handle,
        variant: Some(variant.raw()),
        category: Some(PROBE_HYPOTHESIS),
    };
    host.set_adopted(Vec::new()).map_err(|e| e.to_string())?;
    host.set_pending(vec![probe]).map_err(|e| e.to_string())?;
    host.pending()
        .into_iter()
        .find(|r| r.handle == loaded.handle && r.variant == Some(variant.raw()))
        .and_then(|r| r.category)
        .ok_or_else(|| "host assigned no category".to_string())
}
