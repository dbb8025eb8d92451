//! Weighted random selection with a squared-frequency penalty on repeated
//! ride variants.

use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::category::Category;
use crate::collections::Snapshot;
use crate::host::ResourceHost;
use crate::identity::choose_variant;
use crate::item::{ResearchItem, StableKey, Variant};
use crate::pool::{Candidate, Pools};
use crate::quota::TargetPlan;

/// Index of a weighted random draw, or `None` when every weight is zero.
pub fn weighted_pick<T, R, F>(items: &[T], weight: F, rng: &mut R) -> Option<usize>
where
    R: Rng + ?Sized,
    F: Fn(&T) -> f64,
{
    let weights: Vec<f64> = items.iter().map(|item| weight(item).max(0.0)).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let mut roll = rng.gen_range(0.0..total);
    let mut last_positive = None;
    for (idx, w) in weights.iter().enumerate() {
        if *w <= 0.0 {
            continue;
        }
        if roll < *w {
            return Some(idx);
        }
        roll -= w;
        last_positive = Some(idx);
    }
    last_positive
}

/// Running state shared by every category of one selection.
#[derive(Debug, Default)]
pub struct Selector {
    chosen: HashSet<StableKey>,
    variant_counts: HashMap<Variant, usize>,
}

impl Selector {
    pub fn reserve(&mut self, key: StableKey) {
        self.chosen.insert(key);
    }

    pub fn is_chosen(&self, key: &StableKey) -> bool {
        self.chosen.contains(key)
    }

    pub fn weight(&self, candidate: &Candidate) -> f64 {
        if self.chosen.contains(&candidate.item.stable_key()) {
            return 0.0;
        }
        let seen = candidate
            .item
            .variant()
            .and_then(|v| self.variant_counts.get(&v).copied())
            .unwrap_or(0)
            .max(1);
        1.0 / (seen * seen) as f64
    }

    fn record(&mut self, item: &ResearchItem) {
        self.chosen.insert(item.stable_key());
        if let Some(variant) = item.variant() {
            *self.variant_counts.entry(variant).or_insert(0) += 1;
        }
    }

    /// Draw up to `quota` candidates without replacement.
    pub fn fill<R: Rng + ?Sized>(
        &mut self,
        remaining: &mut Vec<Candidate>,
        quota: usize,
        rng: &mut R,
    ) -> Vec<ResearchItem> {
        let mut picked = Vec::with_capacity(quota);
        while picked.len() < quota {
            let Some(idx) = weighted_pick(remaining, |c| self.weight(c), rng) else {
                break;
            };
            let candidate = remaining.remove(idx);
            self.record(&candidate.item);
            picked.push(candidate.item);
        }
        picked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub category: Category,
    pub wanted: usize,
    pub got: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub adopted: Vec<ResearchItem>,
    pub pending: Vec<ResearchItem>,
    pub shortfalls: Vec<Shortfall>,
}

/// Fill each category's adopted then pending quota from its pool. Keys in
/// `reserved` are never picked.
pub fn select<R: Rng + ?Sized>(
    pools: &Pools,
    plan: &TargetPlan,
    reserved: &HashSet<StableKey>,
    rng: &mut R,
) -> Selection {
    let mut selector = Selector::default();
    for key in reserved {
        selector.reserve(key.clone());
    }

    let mut selection = Selection::default();
    for (category, target) in plan.iter() {
        let mut remaining: Vec<Candidate> = pools
            .get(category)
            .iter()
            .filter(|c| !selector.is_chosen(&c.item.stable_key()))
            .cloned()
            .collect();
        let adopted = selector.fill(&mut remaining, target.adopted, rng);
        let pending = selector.fill(&mut remaining, target.pending, rng);
        let got = adopted.len() + pending.len();
        if got < target.selection {
            warn!(category = %category, wanted = target.selection, got, "category pool exhausted");
            selection.shortfalls.push(Shortfall {
                category,
                wanted: target.selection,
                got,
            });
        }
        selection.adopted.extend(adopted);
        selection.pending.extend(pending);
    }
    selection
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuaranteeSource {
    AlreadyAdopted,
    Promoted,
    Catalog,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guarantee {
    pub item: ResearchItem,
    pub source: GuaranteeSource,
}

/// Find an adopted instance of `identifier`: keep one already adopted,
/// promote one pending, or take one from the catalog or the host.
pub fn resolve_guarantee<H: ResourceHost + ?Sized>(
    host: &mut H,
    identifier: &str,
    snapshot: &Snapshot,
    catalog: &Catalog,
) -> Option<Guarantee> {
    let find = |items: &[ResearchItem]| items.iter().find(|i| i.identifier() == identifier).cloned();
    if let Some(item) = find(&snapshot.adopted) {
        return Some(Guarantee {
            item,
            source: GuaranteeSource::AlreadyAdopted,
        });
    }
    if let Some(item) = find(&snapshot.pending) {
        return Some(Guarantee {
            item,
            source: GuaranteeSource::Promoted,
        });
    }
    if let Some(item) = catalog.rides_for(identifier).first().and_then(|e| e.to_item()) {
        return Some(Guarantee {
            item,
            source: GuaranteeSource::Catalog,
        });
    }
    match choose_variant(host, identifier, None) {
        Some(variant) => Some(Guarantee {
            item: ResearchItem::ride(identifier, variant, Category::Shop),
            source: GuaranteeSource::Loaded,
        }),
        None => {
            debug!(identifier, "guaranteed item unavailable");
            None
        }
    }
}
