//! Assemble, prune and reset: everything that reshapes the live
//! collections and the loaded-object set.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::baseline::Baseline;
use crate::catalog::Catalog;
use crate::category::Category;
use crate::collections::{
    apply_records, loaded_identifiers, repair, unload_and_purge, ApplyReport, Snapshot,
};
use crate::host::ResourceHost;
use crate::item::{ObjectKind, ResearchItem, Variant};
use crate::protect::{is_default_protected, is_guaranteed_singleton, ProtectedSet};
use crate::quota::TargetPlan;
use crate::select::{weighted_pick, Selection};
use crate::store::UnusableVariants;

/// Protected items of `snapshot` with their adopted flag.
pub fn protected_items(snapshot: &Snapshot, protected: &ProtectedSet) -> Vec<(ResearchItem, bool)> {
    snapshot
        .iter()
        .filter(|(item, _)| protected.contains(item.identifier()))
        .map(|(item, adopted)| (item.clone(), adopted))
        .collect()
}

/// Build the canonical collections: guarantees first, then protected items
/// at their original membership, then the selection. Adopted wins on a
/// repeated stable key. Pending order is shuffled.
pub fn assemble<R: Rng + ?Sized>(
    protected: &[(ResearchItem, bool)],
    guarantees: &[ResearchItem],
    selection: &Selection,
    rng: &mut R,
) -> Snapshot {
    let mut canonical = Snapshot::default();
    canonical.adopted.extend(guarantees.iter().cloned());
    for (item, adopted) in protected {
        if *adopted {
            canonical.adopted.push(item.clone());
        } else {
            canonical.pending.push(item.clone());
        }
    }
    canonical.adopted.extend(selection.adopted.iter().cloned());
    canonical.pending.extend(selection.pending.iter().cloned());
    canonical.dedupe();
    canonical.pending.shuffle(rng);
    canonical
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub unloaded: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    /// Categories still above target once no extras were left.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub over_quota: BTreeMap<Category, usize>,
    pub repairs: usize,
}

/// Categories each identifier of `canonical` holds there.
fn kept_categories(canonical: &Snapshot) -> HashMap<&str, BTreeSet<Category>> {
    let mut kept: HashMap<&str, BTreeSet<Category>> = HashMap::new();
    for (item, _) in canonical.iter() {
        kept.entry(item.identifier()).or_default().insert(item.category());
    }
    kept
}

/// Categories a loaded object counts towards: those of its canonical
/// records when it is kept, otherwise every categorised catalog variant.
fn categories_of(
    catalog: &Catalog,
    kept: &HashMap<&str, BTreeSet<Category>>,
    kind: ObjectKind,
    identifier: &str,
) -> BTreeSet<Category> {
    if let Some(categories) = kept.get(identifier) {
        return categories.clone();
    }
    match kind {
        ObjectKind::SceneryGroup => [Category::Scenery].into_iter().collect(),
        ObjectKind::Ride => catalog
            .rides_for(identifier)
            .iter()
            .filter_map(|e| e.category)
            .collect(),
    }
}

fn variants_in(catalog: &Catalog, identifier: &str, category: Category) -> Vec<Variant> {
    catalog
        .rides_for(identifier)
        .iter()
        .filter(|e| e.category == Some(category))
        .filter_map(|e| e.variant)
        .collect()
}

/// Unload weight of each extra: the squared count of its most crowded
/// variant among `extras`.
fn extra_weights(catalog: &Catalog, extras: &[(ObjectKind, String)], category: Category) -> Vec<f64> {
    let variants: Vec<Vec<Variant>> = extras
        .iter()
        .map(|(_, id)| variants_in(catalog, id, category))
        .collect();
    let mut frequency: HashMap<Variant, usize> = HashMap::new();
    for variant in variants.iter().flatten() {
        *frequency.entry(*variant).or_insert(0) += 1;
    }
    variants
        .iter()
        .map(|vs| {
            let f = vs
                .iter()
                .map(|v| frequency.get(v).copied().unwrap_or(0))
                .max()
                .unwrap_or(0)
                .max(1);
            (f * f) as f64
        })
        .collect()
}

/// Unload loaded objects outside `canonical` until each category holds no
/// more non-protected objects than its selection target. Victims are drawn
/// with weight `frequency²` of their variant among the remaining extras, so
/// crowded variants go first. References are purged and repaired after
/// every unload.
pub fn prune<H, R>(
    host: &mut H,
    canonical: &Snapshot,
    plan: &TargetPlan,
    protected: &ProtectedSet,
    catalog: &Catalog,
    unusable: &UnusableVariants,
    rng: &mut R,
) -> PruneReport
where
    H: ResourceHost + ?Sized,
    R: Rng + ?Sized,
{
    let mut report = PruneReport::default();
    let kept = kept_categories(canonical);

    for (category, target) in plan.iter() {
        let counted: Vec<(ObjectKind, String)> = loaded_identifiers(host)
            .into_iter()
            .filter(|(_, id)| !protected.contains(id))
            .filter(|(kind, id)| categories_of(catalog, &kept, *kind, id).contains(&category))
            .collect();
        let mut current = counted.len();
        if current <= target.selection {
            continue;
        }

        let mut extras: Vec<(ObjectKind, String)> = counted
            .into_iter()
            .filter(|(_, id)| !kept.contains_key(id.as_str()))
            .collect();

        debug!(category = %category, current, target = target.selection, extras = extras.len(), "pruning");
        while current > target.selection {
            let weights = extra_weights(catalog, &extras, category);
            let Some(idx) = weighted_pick(&weights, |w: &f64| *w, rng) else {
                break;
            };
            let (kind, identifier) = extras.remove(idx);
            match unload_and_purge(host, kind, &identifier) {
                Ok(()) => {
                    current -= 1;
                    report.unloaded.push(identifier);
                    repair(host, unusable);
                    report.repairs += 1;
                }
                Err(err) => {
                    warn!(identifier = %identifier, error = %err, "unload failed");
                    report.failures.push(err.to_string());
                }
            }
        }
        if current > target.selection {
            report.over_quota.insert(category, current - target.selection);
        }
    }
    if !report.unloaded.is_empty() {
        info!(unloaded = report.unloaded.len(), "pruned surplus objects");
    }
    report
}

/// Non-protected loaded objects per category, as prune counts them against
/// `canonical`.
pub fn loaded_counts<H: ResourceHost + ?Sized>(
    host: &H,
    canonical: &Snapshot,
    protected: &ProtectedSet,
    catalog: &Catalog,
) -> BTreeMap<Category, usize> {
    let kept = kept_categories(canonical);
    let mut counts = BTreeMap::new();
    for (kind, id) in loaded_identifiers(host) {
        if protected.contains(&id) {
            continue;
        }
        for category in categories_of(catalog, &kept, kind, &id) {
            *counts.entry(category).or_insert(0) += 1;
        }
    }
    counts
}

/// The protected, default and guaranteed part of the collections as the
/// level started. Active-use items keep their live membership. Without a
/// baseline the same subset is taken from the live snapshot.
pub fn reset_canonical(
    baseline: Option<&Baseline>,
    live: &Snapshot,
    protected: &ProtectedSet,
) -> Snapshot {
    let mut canonical = Snapshot::default();
    let mut push = |item: &ResearchItem, adopted: bool| {
        if adopted {
            canonical.adopted.push(item.clone());
        } else {
            canonical.pending.push(item.clone());
        }
    };
    match baseline {
        Some(baseline) => {
            for (item, adopted) in baseline.default_items() {
                push(item, adopted);
            }
            for (item, adopted) in live.iter() {
                if protected.is_active(item.identifier()) {
                    push(item, adopted);
                }
            }
        }
        None => {
            for (item, adopted) in live.iter() {
                let id = item.identifier();
                if is_default_protected(id) || is_guaranteed_singleton(id) || protected.is_active(id) {
                    push(item, adopted);
                }
            }
        }
    }
    canonical.dedupe();
    canonical
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub from_baseline: bool,
    pub canonical_adopted: usize,
    pub canonical_pending: usize,
    pub apply: ApplyReport,
    pub prune: PruneReport,
}

/// Put the collections back to their protected-only starting point and
/// unload everything else that is not protected.
pub fn hard_reset<H, R>(
    host: &mut H,
    baseline: Option<&Baseline>,
    live: &Snapshot,
    protected: &ProtectedSet,
    catalog: &Catalog,
    unusable: &UnusableVariants,
    rng: &mut R,
) -> ResetReport
where
    H: ResourceHost + ?Sized,
    R: Rng + ?Sized,
{
    let canonical = reset_canonical(baseline, live, protected);
    let apply = apply_records(host, &canonical.adopted, &canonical.pending, unusable);
    let prune = prune(
        host,
        &canonical,
        &TargetPlan::default(),
        protected,
        catalog,
        unusable,
        rng,
    );
    info!(
        from_baseline = baseline.is_some(),
        adopted = canonical.adopted.len(),
        pending = canonical.pending.len(),
        "hard reset"
    );
    ResetReport {
        from_baseline: baseline.is_some(),
        canonical_adopted: canonical.adopted.len(),
        canonical_pending: canonical.pending.len(),
        apply,
        prune,
    }
}
