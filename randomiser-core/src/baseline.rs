//! Per-level baseline: the original category counts every quota is
//! anchored on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::category::{Category, CategoryCounts};
use crate::collections::Snapshot;
use crate::item::ResearchItem;
use crate::protect::{is_default_protected, is_guaranteed_singleton, ProtectedSet};
use crate::quota::{compute_targets, TargetPlan};
use crate::store::{KeyValueStore, ResearchStore};
use crate::Result;

pub const BASELINE_SCHEMA: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub schema: u32,
    pub captured_utc: u64,
    /// Mutable adopted items per category.
    pub adopted_by_category: CategoryCounts,
    /// Mutable adopted plus pending items per category.
    pub selection_by_category: CategoryCounts,
    #[serde(default)]
    pub defaults_adopted: Vec<ResearchItem>,
    #[serde(default)]
    pub defaults_pending: Vec<ResearchItem>,
    #[serde(default)]
    pub guaranteed_adopted: Vec<ResearchItem>,
    #[serde(default)]
    pub guaranteed_pending: Vec<ResearchItem>,
    #[serde(default)]
    pub plans: BTreeMap<String, TargetPlan>,
}

fn plan_key(multiplier: f64) -> String {
    format!("{multiplier:.3}")
}

impl Baseline {
    /// Count the mutable items of `snapshot`. Default identifiers and
    /// guaranteed singletons are remembered by membership so a reset can
    /// put them back; active-use items are skipped entirely.
    pub fn capture(snapshot: &Snapshot, protected: &ProtectedSet, captured_utc: u64) -> Self {
        let mut baseline = Baseline {
            schema: BASELINE_SCHEMA,
            captured_utc,
            adopted_by_category: CategoryCounts::new(),
            selection_by_category: CategoryCounts::new(),
            defaults_adopted: Vec::new(),
            defaults_pending: Vec::new(),
            guaranteed_adopted: Vec::new(),
            guaranteed_pending: Vec::new(),
            plans: BTreeMap::new(),
        };
        for (item, adopted) in snapshot.iter() {
            let identifier = item.identifier();
            let bucket = if is_default_protected(identifier) {
                Some((&mut baseline.defaults_adopted, &mut baseline.defaults_pending))
            } else if is_guaranteed_singleton(identifier) {
                Some((&mut baseline.guaranteed_adopted, &mut baseline.guaranteed_pending))
            } else {
                None
            };
            match bucket {
                Some((on_adopted, on_pending)) => {
                    if adopted {
                        on_adopted.push(item.clone());
                    } else {
                        on_pending.push(item.clone());
                    }
                }
                None if protected.contains(identifier) => {}
                None => {
                    baseline.selection_by_category.increment(item.category());
                    if adopted {
                        baseline.adopted_by_category.increment(item.category());
                    }
                }
            }
        }
        baseline
    }

    pub fn adopted_total(&self) -> usize {
        self.adopted_by_category.total()
    }

    pub fn selection_total(&self) -> usize {
        self.selection_by_category.total()
    }

    /// Target plan for `multiplier`, cached so repeated runs reuse it.
    /// Returns the plan and whether it was newly computed.
    pub fn target_plan(&mut self, multiplier: f64) -> (TargetPlan, bool) {
        let key = plan_key(multiplier);
        if let Some(plan) = self.plans.get(&key) {
            return (plan.clone(), false);
        }
        let plan = compute_targets(&self.adopted_by_category, &self.selection_by_category, multiplier);
        self.plans.insert(key, plan.clone());
        (plan, true)
    }

    /// Clamp categories whose live pool has shrunk below the baseline.
    /// Counts only ever go down. Cached plans are dropped on change.
    pub fn tighten(&mut self, pool_sizes: &CategoryCounts) -> bool {
        let mut changed = false;
        for category in Category::ALL {
            let available = pool_sizes.get(category);
            let selection = self.selection_by_category.get(category);
            if selection > available {
                self.selection_by_category.set(category, available);
                changed = true;
            }
            let clamped = self.selection_by_category.get(category);
            if self.adopted_by_category.get(category) > clamped {
                self.adopted_by_category.set(category, clamped);
                changed = true;
            }
        }
        if changed {
            self.plans.clear();
        }
        changed
    }

    pub fn default_items(&self) -> impl Iterator<Item = (&ResearchItem, bool)> {
        self.defaults_adopted
            .iter()
            .chain(self.guaranteed_adopted.iter())
            .map(|item| (item, true))
            .chain(
                self.defaults_pending
                    .iter()
                    .chain(self.guaranteed_pending.iter())
                    .map(|item| (item, false)),
            )
    }
}

/// Load the level's baseline, capturing and persisting it on first use.
/// Returns the baseline and whether it was created by this call.
pub fn ensure_baseline<S: KeyValueStore>(
    store: &mut ResearchStore<S>,
    level_key: &str,
    snapshot: &Snapshot,
    protected: &ProtectedSet,
    now: u64,
) -> Result<(Baseline, bool)> {
    if let Some(existing) = store.baseline(level_key) {
        return Ok((existing, false));
    }
    let baseline = Baseline::capture(snapshot, protected, now);
    store.set_baseline(level_key, &baseline)?;
    info!(
        level = level_key,
        adopted = baseline.adopted_total(),
        selection = baseline.selection_total(),
        "captured baseline"
    );
    Ok((baseline, true))
}
