use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

pub mod baseline;
pub mod catalog;
pub mod category;
pub mod collections;
pub mod engine;
pub mod host;
pub mod identity;
pub mod item;
pub mod options;
pub mod pool;
pub mod protect;
pub mod quota;
pub mod report;
pub mod schedule;
pub mod select;
pub mod store;

pub use catalog::{Catalog, ScanReport, ScanStatus};
pub use category::{Category, CategoryCounts};
pub use collections::{RepairReport, Snapshot};
pub use host::{HostError, LevelIdentity, MemoryHost, ResourceHost, WorldState};
pub use item::{ObjectKind, ResearchItem, StableKey, Variant};
pub use options::{Multiplier, RandomiseOptions};
pub use report::RandomiseReport;
pub use schedule::{DeferredTask, TickReport};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, Preferences, ResearchStore};

use baseline::ensure_baseline;
use catalog::{compute_scan_needed, run_scan};
use collections::{apply_records, snapshot};
use engine::{assemble, hard_reset, protected_items};
use pool::{build_pools, PoolOptions};
use protect::{ProtectedSet, CASH_MACHINE, GUARANTEED_SINGLETONS, INFO_KIOSK};
use schedule::DeferredSlot;
use select::{resolve_guarantee, select};

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("resource host error: {0}")]
    Host(#[from] HostError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("scan required: {0}")]
    ScanRequired(String),
}

pub type Result<T> = std::result::Result<T, ResearchError>;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub level: String,
    pub has_baseline: bool,
    pub baseline_timestamp: Option<u64>,
    pub has_catalog: bool,
    pub catalog_timestamp: Option<u64>,
    pub catalog_entries: usize,
    pub category_summary: CategoryCounts,
    pub scan: ScanStatus,
    pub runs: u32,
    pub deferred_scan: bool,
}

/// The research randomiser attached to one host and one store. Every entry
/// point takes `&mut self`, so runs never interleave.
pub struct Randomiser<H, S> {
    host: H,
    store: ResearchStore<S>,
    deferred: DeferredSlot<DeferredTask>,
}

impl<H: ResourceHost, S: KeyValueStore> Randomiser<H, S> {
    /// Attach to `host`, repairing the collections straight away.
    pub fn new(host: H, store: S) -> Self {
        let mut randomiser = Self {
            host,
            store: ResearchStore::new(store),
            deferred: DeferredSlot::new(),
        };
        let report = randomiser.repair();
        if report.changed {
            info!(removed = report.removed(), "repaired collections on attach");
        }
        randomiser
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn store(&self) -> &ResearchStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ResearchStore<S> {
        &mut self.store
    }

    pub fn into_parts(self) -> (H, S) {
        (self.host, self.store.into_inner())
    }

    fn level_key(&self) -> String {
        self.host.level().key()
    }

    fn protected_set(&self, live: &Snapshot, extra: &[String]) -> ProtectedSet {
        let active_use = match self.host.active_use_identifiers() {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "active-use list unavailable");
                HashSet::new()
            }
        };
        let guaranteed = GUARANTEED_SINGLETONS
            .iter()
            .filter(|id| live.iter().any(|(item, _)| item.identifier() == **id))
            .map(|id| id.to_string())
            .chain(extra.iter().cloned());
        ProtectedSet::new(active_use, guaranteed)
    }

    pub fn scan_status(&self) -> ScanStatus {
        compute_scan_needed(
            &self.host,
            &self.store.catalog(),
            &self.store.unusable_variants(),
        )
    }

    /// Capture the baseline if the level has none yet, then rebuild the
    /// catalog from everything installed.
    pub fn scan(&mut self) -> Result<ScanReport> {
        let level_key = self.level_key();
        let live = snapshot(&self.host);
        let protected = self.protected_set(&live, &[]);
        ensure_baseline(&mut self.store, &level_key, &live, &protected, now_millis())?;

        let mut catalog = self.store.catalog();
        let mut unusable = self.store.unusable_variants();
        let report = run_scan(&mut self.host, &mut catalog, &mut unusable, &protected)?;
        self.store.set_catalog(&catalog)?;
        self.store.set_unusable_variants(&unusable)?;

        let mut meta = self.store.meta();
        meta.last_scan_utc = Some(now_millis());
        self.store.set_meta(&meta)?;
        self.deferred.cancel();
        Ok(report)
    }

    pub fn randomize(&mut self, options: &RandomiseOptions) -> Result<RandomiseReport> {
        let scan = self.scan_status();
        if scan.needed {
            return Err(ResearchError::ScanRequired(
                scan.reason.unwrap_or_else(|| "catalog is out of date".to_string()),
            ));
        }

        let unusable = self.store.unusable_variants();
        let catalog = self.store.catalog();
        let level_key = self.level_key();
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut report = RandomiseReport {
            level: level_key.clone(),
            seed: options.seed,
            multiplier: options.multiplier.value(),
            ..RandomiseReport::default()
        };

        report.pre_repair = collections::repair(&mut self.host, &unusable);

        let before = snapshot(&self.host);
        let protected = self.protected_set(&before, &[]);
        let (mut baseline, created) =
            ensure_baseline(&mut self.store, &level_key, &before, &protected, now_millis())?;
        report.baseline_created = created;

        let mut meta = self.store.meta();
        let previous_runs = meta
            .randomize_count_by_level
            .get(&level_key)
            .copied()
            .unwrap_or(0);
        report.run = previous_runs + 1;
        if previous_runs > 0 {
            report.reset = Some(hard_reset(
                &mut self.host,
                Some(&baseline),
                &before,
                &protected,
                &catalog,
                &unusable,
                &mut rng,
            ));
        }

        let live = snapshot(&self.host);
        let mut guarantees = Vec::new();
        for (wanted, identifier) in [
            (options.guarantee_cash_machine, CASH_MACHINE),
            (options.guarantee_info_kiosk, INFO_KIOSK),
        ] {
            if !wanted {
                continue;
            }
            match resolve_guarantee(&mut self.host, identifier, &live, &catalog) {
                Some(guarantee) => guarantees.push(guarantee),
                None => warn!(identifier, "guaranteed item could not be resolved"),
            }
        }
        let guaranteed_ids: Vec<String> = guarantees
            .iter()
            .map(|g| g.item.identifier().to_string())
            .collect();
        let protected = self.protected_set(&live, &guaranteed_ids);

        let pools = build_pools(
            &live,
            &catalog,
            PoolOptions {
                protected: &protected,
                unusable: &unusable,
                exclude_custom: options.exclude_custom,
            },
        );
        report.pool_sizes = pools.sizes();
        // Tighten against the unfiltered pool; excluding custom rides is per run.
        let installed_sizes = if options.exclude_custom {
            build_pools(
                &live,
                &catalog,
                PoolOptions {
                    protected: &protected,
                    unusable: &unusable,
                    exclude_custom: false,
                },
            )
            .sizes()
        } else {
            report.pool_sizes
        };
        report.baseline_tightened = baseline.tighten(&installed_sizes);
        let (plan, fresh_plan) = baseline.target_plan(options.multiplier.value());
        if report.baseline_tightened || fresh_plan {
            self.store.set_baseline(&level_key, &baseline)?;
        }

        let reserved: HashSet<StableKey> = guarantees.iter().map(|g| g.item.stable_key()).collect();
        let selection = select(&pools, &plan, &reserved, &mut rng);
        let guaranteed_items: Vec<ResearchItem> = guarantees.iter().map(|g| g.item.clone()).collect();
        let canonical = assemble(
            &protected_items(&live, &protected),
            &guaranteed_items,
            &selection,
            &mut rng,
        );

        report.apply = apply_records(&mut self.host, &canonical.adopted, &canonical.pending, &unusable);
        report.prune = engine::prune(
            &mut self.host,
            &canonical,
            &plan,
            &protected,
            &catalog,
            &unusable,
            &mut rng,
        );
        report.reapply = apply_records(&mut self.host, &canonical.adopted, &canonical.pending, &unusable);
        report.final_repair = collections::repair(&mut self.host, &unusable);

        meta.randomize_count_by_level.insert(level_key, report.run);
        self.store.set_meta(&meta)?;

        report.plan = plan;
        report.guarantees = guarantees;
        report.shortfalls = selection.shortfalls;
        report.result = snapshot(&self.host);
        info!(
            adopted = report.result.adopted.len(),
            pending = report.result.pending.len(),
            shortfalls = report.shortfalls.len(),
            "{}",
            report.summary()
        );
        Ok(report)
    }

    pub fn status(&self) -> Status {
        let level = self.level_key();
        let baseline = self.store.baseline(&level);
        let catalog = self.store.catalog();
        let meta = self.store.meta();
        Status {
            has_baseline: baseline.is_some(),
            baseline_timestamp: baseline.map(|b| b.captured_utc),
            has_catalog: self.store.has_catalog(),
            catalog_timestamp: meta.last_scan_utc,
            catalog_entries: catalog.len(),
            category_summary: catalog.category_summary(),
            scan: self.scan_status(),
            runs: meta.randomize_count_by_level.get(&level).copied().unwrap_or(0),
            deferred_scan: self.deferred.is_armed(),
            level,
        }
    }

    /// Forget the catalog, metadata and every baseline. Preferences stay.
    pub fn clear_all_persisted_state(&mut self) -> Result<()> {
        self.deferred.cancel();
        self.store.clear_all()?;
        info!("cleared persisted research state");
        Ok(())
    }

    pub fn repair(&mut self) -> RepairReport {
        let unusable = self.store.unusable_variants();
        collections::repair(&mut self.host, &unusable)
    }

    /// Arm a scan to run on the next day tick. Returns true when it
    /// replaced a scan that was already waiting.
    pub fn defer_scan(&mut self) -> bool {
        self.deferred.arm(DeferredTask::Scan).is_some()
    }

    /// Daily guard: repair the collections, then run any deferred scan.
    pub fn on_day_tick(&mut self) -> TickReport {
        let mut report = TickReport {
            repair: self.repair(),
            ..TickReport::default()
        };
        if let Some(DeferredTask::Scan) = self.deferred.take() {
            match self.scan() {
                Ok(scan) => report.scan = Some(scan),
                Err(err) => {
                    warn!(error = %err, "deferred scan failed");
                    report.scan_error = Some(err.to_string());
                }
            }
        }
        report
    }
}
