//! Reading, writing and repairing the host's two live research collections.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use crate::category::Category;
use crate::host::{HostError, ObjectHandle, ResearchRef, ResourceHost};
use crate::identity::{choose_variant, ensure_loaded, list_variants, resolve_handle, resolve_identifier};
use crate::item::{ObjectKind, ResearchItem, StableKey, Variant};
use crate::store::UnusableVariants;

/// Canonical view of both collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub adopted: Vec<ResearchItem>,
    pub pending: Vec<ResearchItem>,
}

impl Snapshot {
    pub fn iter(&self) -> impl Iterator<Item = (&ResearchItem, bool)> {
        self.adopted
            .iter()
            .map(|item| (item, true))
            .chain(self.pending.iter().map(|item| (item, false)))
    }

    pub fn contains_identifier(&self, kind: ObjectKind, identifier: &str) -> bool {
        self.iter()
            .any(|(item, _)| item.kind() == kind && item.identifier() == identifier)
    }

    pub fn len(&self) -> usize {
        self.adopted.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adopted.is_empty() && self.pending.is_empty()
    }

    /// Drop repeated stable keys, keeping the adopted copy.
    pub fn dedupe(&mut self) {
        let mut seen: HashSet<StableKey> = HashSet::new();
        self.adopted.retain(|item| seen.insert(item.stable_key()));
        self.pending.retain(|item| seen.insert(item.stable_key()));
    }
}

pub fn record_from_ref<H: ResourceHost + ?Sized>(host: &H, r: &ResearchRef) -> Option<ResearchItem> {
    let identifier = resolve_identifier(host, r.kind, r.handle)?;
    match r.kind {
        ObjectKind::Ride => {
            let variant = r.variant.and_then(Variant::from_raw)?;
            Some(ResearchItem::ride(identifier, variant, r.category?))
        }
        ObjectKind::SceneryGroup => Some(ResearchItem::group(identifier)),
    }
}

pub fn snapshot<H: ResourceHost + ?Sized>(host: &H) -> Snapshot {
    let convert = |refs: Vec<ResearchRef>| -> Vec<ResearchItem> {
        refs.iter().filter_map(|r| record_from_ref(host, r)).collect()
    };
    Snapshot {
        adopted: convert(host.adopted()),
        pending: convert(host.pending()),
    }
}

pub type LoadedSet = BTreeSet<(ObjectKind, String)>;

pub fn loaded_identifiers<H: ResourceHost + ?Sized>(host: &H) -> LoadedSet {
    let mut out = LoadedSet::new();
    for kind in [ObjectKind::Ride, ObjectKind::SceneryGroup] {
        match host.loaded_objects(kind) {
            Ok(objects) => out.extend(objects.into_iter().map(|o| (kind, o.identifier))),
            Err(err) => warn!(kind = kind.as_str(), error = %err, "could not list loaded objects"),
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub dangling: usize,
    pub invalid_variant: usize,
    pub unusable_variant: usize,
    pub uncategorised: usize,
    pub duplicates: usize,
    pub changed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl RepairReport {
    pub fn removed(&self) -> usize {
        self.dangling + self.invalid_variant + self.unusable_variant + self.uncategorised + self.duplicates
    }
}

/// Strip dangling, invalid and uncategorised references and repeated stable
/// keys (adopted wins). A consistent pair of collections is left untouched.
pub fn repair<H: ResourceHost + ?Sized>(host: &mut H, unusable: &UnusableVariants) -> RepairReport {
    let mut report = RepairReport::default();
    let mut seen: HashSet<StableKey> = HashSet::new();

    let original_adopted = host.adopted();
    let original_pending = host.pending();

    let mut clean = |refs: &[ResearchRef], report: &mut RepairReport| -> Vec<ResearchRef> {
        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            let Some(identifier) = resolve_identifier(host, r.kind, r.handle) else {
                report.dangling += 1;
                continue;
            };
            let (key, fixed) = match r.kind {
                ObjectKind::Ride => {
                    let Some(variant) = r.variant.and_then(Variant::from_raw) else {
                        report.invalid_variant += 1;
                        continue;
                    };
                    if unusable.contains(variant.raw()) {
                        report.unusable_variant += 1;
                        continue;
                    }
                    if r.category.is_none() {
                        report.uncategorised += 1;
                        continue;
                    }
                    (StableKey::Ride { identifier, variant }, r.clone())
                }
                ObjectKind::SceneryGroup => (
                    StableKey::Group { identifier },
                    ResearchRef {
                        kind: ObjectKind::SceneryGroup,
                        handle: r.handle,
                        variant: None,
                        category: Some(Category::Scenery),
                    },
                ),
            };
            if !seen.insert(key) {
                report.duplicates += 1;
                continue;
            }
            out.push(fixed);
        }
        out
    };

    let adopted = clean(&original_adopted, &mut report);
    let pending = clean(&original_pending, &mut report);

    if adopted != original_adopted {
        report.changed = true;
        if let Err(err) = host.set_adopted(adopted) {
            report.failures.push(err.to_string());
        }
    }
    if pending != original_pending {
        report.changed = true;
        if let Err(err) = host.set_pending(pending) {
            report.failures.push(err.to_string());
        }
    }
    if report.changed {
        debug!(removed = report.removed(), "repaired research collections");
    }
    report
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub adopted_written: usize,
    pub pending_written: usize,
    pub reused: usize,
    pub loaded: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<StableKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    pub repair: RepairReport,
}

struct Materializer {
    existing: HashMap<StableKey, ObjectHandle>,
}

impl Materializer {
    fn new<H: ResourceHost + ?Sized>(host: &H) -> Self {
        let mut existing = HashMap::new();
        for r in host.adopted().iter().chain(host.pending().iter()) {
            if let Some(item) = record_from_ref(host, r) {
                existing.entry(item.stable_key()).or_insert(r.handle);
            }
        }
        Self { existing }
    }

    fn build<H: ResourceHost + ?Sized>(
        &self,
        host: &mut H,
        item: &ResearchItem,
        report: &mut ApplyReport,
    ) -> Option<ResearchRef> {
        let key = item.stable_key();
        if let Some(&handle) = self.existing.get(&key) {
            if resolve_identifier(host, item.kind(), handle).as_deref() == Some(item.identifier()) {
                report.reused += 1;
                return Some(to_ref(item, handle, item.variant()));
            }
        }

        if !ensure_loaded(host, item.kind(), item.identifier()) {
            return None;
        }
        let object = resolve_handle(host, item.kind(), item.identifier())?;
        let variant = match item {
            ResearchItem::Ride { identifier, variant, .. } => {
                if list_variants(&object).contains(variant) {
                    Some(*variant)
                } else {
                    Some(choose_variant(host, identifier, Some(variant.raw()))?)
                }
            }
            ResearchItem::Group { .. } => None,
        };
        report.loaded += 1;
        Some(to_ref(item, object.handle, variant))
    }
}

fn to_ref(item: &ResearchItem, handle: ObjectHandle, variant: Option<Variant>) -> ResearchRef {
    ResearchRef {
        kind: item.kind(),
        handle,
        variant: variant.map(Variant::raw),
        category: Some(item.category()),
    }
}

/// Turn canonical records into live references, reusing loaded handles,
/// write both collections and run a repair pass.
pub fn apply_records<H: ResourceHost + ?Sized>(
    host: &mut H,
    adopted: &[ResearchItem],
    pending: &[ResearchItem],
    unusable: &UnusableVariants,
) -> ApplyReport {
    let mut report = ApplyReport::default();
    let materializer = Materializer::new(host);

    let mut build_all = |items: &[ResearchItem], report: &mut ApplyReport| -> Vec<ResearchRef> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match materializer.build(host, item, report) {
                Some(r) => out.push(r),
                None => {
                    debug!(key = %item.stable_key(), "dropping unresolvable record");
                    report.dropped.push(item.stable_key());
                }
            }
        }
        out
    };

    let adopted_refs = build_all(adopted, &mut report);
    let pending_refs = build_all(pending, &mut report);
    report.adopted_written = adopted_refs.len();
    report.pending_written = pending_refs.len();

    if let Err(err) = host.set_adopted(adopted_refs) {
        warn!(error = %err, "adopted collection write failed");
        report.failures.push(err.to_string());
    }
    if let Err(err) = host.set_pending(pending_refs) {
        warn!(error = %err, "pending collection write failed");
        report.failures.push(err.to_string());
    }

    report.repair = repair(host, unusable);
    report
}

/// Unload an object and strip every reference to the handle it occupied, so
/// a later load reusing the slot can never be mistaken for it.
pub fn unload_and_purge<H: ResourceHost + ?Sized>(
    host: &mut H,
    kind: ObjectKind,
    identifier: &str,
) -> Result<(), HostError> {
    let handle = resolve_handle(host, kind, identifier).map(|o| o.handle);
    host.unload_object(identifier)?;
    if let Some(handle) = handle {
        let keep = |refs: Vec<ResearchRef>| -> Vec<ResearchRef> {
            refs.into_iter()
                .filter(|r| !(r.kind == kind && r.handle == handle))
                .collect()
        };
        let adopted = host.adopted();
        if adopted.iter().any(|r| r.kind == kind && r.handle == handle) {
            host.set_adopted(keep(adopted))?;
        }
        let pending = host.pending();
        if pending.iter().any(|r| r.kind == kind && r.handle == handle) {
            host.set_pending(keep(pending))?;
        }
    }
    Ok(())
}

/// Scoped replacement of both collections. The originals are written back
/// when the guard is restored or dropped, including during a panic unwind.
pub struct CollectionGuard<'a, H: ResourceHost + ?Sized> {
    host: &'a mut H,
    adopted: Vec<ResearchRef>,
    pending: Vec<ResearchRef>,
    restored: bool,
}

impl<'a, H: ResourceHost + ?Sized> CollectionGuard<'a, H> {
    pub fn new(host: &'a mut H) -> Self {
        let adopted = host.adopted();
        let pending = host.pending();
        Self {
            host,
            adopted,
            pending,
            restored: false,
        }
    }

    pub fn host(&mut self) -> &mut H {
        &mut *self.host
    }

    fn write_back(&mut self) -> Result<(), HostError> {
        self.restored = true;
        let adopted = self.host.set_adopted(self.adopted.clone());
        let pending = self.host.set_pending(self.pending.clone());
        adopted.and(pending)
    }

    pub fn restore(mut self) -> Result<(), HostError> {
        self.write_back()
    }
}

impl<H: ResourceHost + ?Sized> Drop for CollectionGuard<'_, H> {
    fn drop(&mut self) {
        if !self.restored {
            if let Err(err) = self.write_back() {
                warn!(error = %err, "failed to restore research collections");
            }
        }
    }
}

/// Run `f` against temporarily replaced collections and always restore the
/// originals afterwards.
pub fn with_temporary_collections<H, T, F>(host: &mut H, f: F) -> (T, Result<(), HostError>)
where
    H: ResourceHost + ?Sized,
    F: FnOnce(&mut H) -> T,
{
    let mut guard = CollectionGuard::new(host);
    let value = f(guard.host());
    let restored = guard.restore();
    (value, restored)
}
