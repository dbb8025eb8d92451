use serde::Serialize;
use std::fmt::Write as _;

use crate::category::CategoryCounts;
use crate::collections::{ApplyReport, RepairReport, Snapshot};
use crate::engine::{PruneReport, ResetReport};
use crate::item::ResearchItem;
use crate::quota::TargetPlan;
use crate::select::{Guarantee, Shortfall};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RandomiseReport {
    pub level: String,
    pub seed: u64,
    pub multiplier: f64,
    pub run: u32,
    pub baseline_created: bool,
    pub baseline_tightened: bool,
    pub pre_repair: RepairReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<ResetReport>,
    pub pool_sizes: CategoryCounts,
    pub plan: TargetPlan,
    pub guarantees: Vec<Guarantee>,
    pub shortfalls: Vec<Shortfall>,
    pub apply: ApplyReport,
    pub prune: PruneReport,
    pub reapply: ApplyReport,
    pub final_repair: RepairReport,
    pub result: Snapshot,
}

impl RandomiseReport {
    /// Number of records that could not be written or were left over quota.
    pub fn skipped(&self) -> usize {
        self.apply.dropped.len()
            + self.reapply.dropped.len()
            + self.shortfalls.iter().map(|s| s.wanted - s.got).sum::<usize>()
    }

    /// One-line summary for status text.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Randomised {} at {:.1}x: {} adopted, {} pending",
            self.level,
            self.multiplier,
            self.result.adopted.len(),
            self.result.pending.len()
        );
        let skipped = self.skipped();
        if skipped > 0 {
            let _ = write!(line, " ({skipped} skipped)");
        }
        line
    }

    /// Human-readable run log.
    pub fn to_log(&self) -> String {
        let mut log = String::new();
        let _ = writeln!(log, "Research randomiser log");
        let _ = writeln!(log, "level: {}", self.level);
        let _ = writeln!(log, "seed: {}", self.seed);
        let _ = writeln!(log, "multiplier: {:.3}", self.multiplier);
        let _ = writeln!(log, "run: {}", self.run);
        if self.baseline_created {
            log.push_str("baseline: captured this run\n");
        }
        if self.baseline_tightened {
            log.push_str("baseline: tightened to the live pool\n");
        }
        if let Some(reset) = &self.reset {
            let _ = writeln!(
                log,
                "reset: {} adopted, {} pending kept, {} unloaded ({})",
                reset.canonical_adopted,
                reset.canonical_pending,
                reset.prune.unloaded.len(),
                if reset.from_baseline { "from baseline" } else { "from live collections" }
            );
        }
        if self.pre_repair.changed {
            let _ = writeln!(log, "pre-repair removed {} references", self.pre_repair.removed());
        }

        log.push_str("targets (adopted / pending / pool):\n");
        for (category, target) in self.plan.iter() {
            if target.selection == 0 && self.pool_sizes.get(category) == 0 {
                continue;
            }
            let _ = writeln!(
                log,
                "  {:<14}{:>4} /{:>4} /{:>5}",
                category.as_str(),
                target.adopted,
                target.pending,
                self.pool_sizes.get(category)
            );
        }
        for shortfall in &self.shortfalls {
            let _ = writeln!(
                log,
                "shortfall: {} wanted {}, got {}",
                shortfall.category, shortfall.wanted, shortfall.got
            );
        }
        for guarantee in &self.guarantees {
            let _ = writeln!(log, "guaranteed: {} ({:?})", guarantee.item.identifier(), guarantee.source);
        }
        for key in self.apply.dropped.iter().chain(&self.reapply.dropped) {
            let _ = writeln!(log, "dropped: {key}");
        }
        for identifier in &self.prune.unloaded {
            let _ = writeln!(log, "unloaded: {identifier}");
        }
        for failure in self
            .apply
            .failures
            .iter()
            .chain(&self.prune.failures)
            .chain(&self.reapply.failures)
        {
            let _ = writeln!(log, "failure: {failure}");
        }

        log.push_str("adopted:\n");
        for item in &self.result.adopted {
            push_item(&mut log, item);
        }
        log.push_str("pending:\n");
        for item in &self.result.pending {
            push_item(&mut log, item);
        }
        log
    }
}

fn push_item(log: &mut String, item: &ResearchItem) {
    let _ = writeln!(log, "  [{}] {}", item.category(), item.stable_key());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::item::Variant;

    #[test]
    fn log_lists_items_and_shortfalls() {
        let report = RandomiseReport {
            level: "Forest Frontiers|128x128".to_string(),
            seed: 9,
            multiplier: 2.0,
            run: 1,
            shortfalls: vec![Shortfall {
                category: Category::Water,
                wanted: 3,
                got: 1,
            }],
            result: Snapshot {
                adopted: vec![ResearchItem::ride(
                    "rct2.ride.mgr1",
                    Variant::from_raw(12).unwrap(),
                    Category::Gentle,
                )],
                pending: vec![ResearchItem::group("rct2.scenery_group.scgtrees")],
            },
            ..RandomiseReport::default()
        };
        let log = report.to_log();
        assert!(log.contains("seed: 9"));
        assert!(log.contains("shortfall: water wanted 3, got 1"));
        assert!(log.contains("  [gentle] ride|rct2.ride.mgr1|12"));
        assert!(log.contains("  [scenery] scenery|rct2.scenery_group.scgtrees"));
        assert_eq!(report.skipped(), 2);
        assert_eq!(
            report.summary(),
            "Randomised Forest Frontiers|128x128 at 2.0x: 1 adopted, 1 pending (2 skipped)"
        );
    }
}
