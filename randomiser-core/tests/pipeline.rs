mod common;

use std::collections::HashSet;

use common::{all_items, count_in, fixture, gentle, mutable_items, options, scanned};
use research_randomiser_core::catalog::Catalog;
use research_randomiser_core::collections::snapshot;
use research_randomiser_core::engine::{hard_reset, loaded_counts};
use research_randomiser_core::host::{MemoryHost, ObjectDefinition};
use research_randomiser_core::protect::ProtectedSet;
use research_randomiser_core::{Category, ResearchError, ResourceHost, StableKey};

fn keys(items: &[(research_randomiser_core::ResearchItem, bool)]) -> Vec<StableKey> {
    items.iter().map(|(item, _)| item.stable_key()).collect()
}

#[test]
fn doubling_scales_every_category() {
    let mut randomiser = scanned(fixture());
    let report = randomiser.randomize(&options(2.0, 11)).unwrap();

    assert_eq!(report.plan.get(Category::Gentle).selection, 6);
    assert_eq!(report.plan.get(Category::Thrill).selection, 2);
    assert_eq!(report.plan.get(Category::Scenery).selection, 2);
    assert!(report.shortfalls.is_empty());

    let mutable = mutable_items(&randomiser);
    assert_eq!(count_in(&mutable, Category::Gentle), 6);
    assert_eq!(count_in(&mutable, Category::Thrill), 2);
    assert_eq!(count_in(&mutable, Category::Scenery), 2);
    assert_eq!(mutable.iter().filter(|(_, adopted)| *adopted).count(), 3);
}

#[test]
fn stable_keys_never_repeat() {
    let mut randomiser = scanned(fixture());
    for (run, multiplier) in [1.0, 1.5, 2.0, 3.0, 1.0].into_iter().enumerate() {
        randomiser.randomize(&options(multiplier, run as u64)).unwrap();
        let all = keys(&all_items(&randomiser));
        let unique: HashSet<&StableKey> = all.iter().collect();
        assert_eq!(unique.len(), all.len(), "run {run} at {multiplier}x");
    }
}

#[test]
fn protected_items_keep_their_membership() {
    let mut host = fixture();
    host.state_mut().active_use.insert(gentle(1));
    host.state_mut().active_use.insert(gentle(2));
    let mut randomiser = scanned(host);

    let before: Vec<(String, bool)> = all_items(&randomiser)
        .into_iter()
        .filter(|(item, _)| {
            research_randomiser_core::protect::is_default_protected(item.identifier())
                || item.identifier() == gentle(1)
                || item.identifier() == gentle(2)
        })
        .map(|(item, adopted)| (item.identifier().to_string(), adopted))
        .collect();
    assert_eq!(before.len(), 4);

    for seed in 0..3 {
        randomiser.randomize(&options(1.5, seed)).unwrap();
        let after: Vec<(String, bool)> = all_items(&randomiser)
            .into_iter()
            .map(|(item, adopted)| (item.identifier().to_string(), adopted))
            .collect();
        for entry in &before {
            assert!(after.contains(entry), "{entry:?} moved or vanished on seed {seed}");
        }
    }
}

#[test]
fn repair_after_randomize_is_a_no_op() {
    let mut randomiser = scanned(fixture());
    let report = randomiser.randomize(&options(1.5, 3)).unwrap();
    assert!(!report.final_repair.changed);

    let state = randomiser.host().state().clone();
    let first = randomiser.repair();
    let second = randomiser.repair();
    assert!(!first.changed);
    assert!(!second.changed);
    assert_eq!(randomiser.host().state(), &state);
}

#[test]
fn hard_reset_matches_a_fresh_level() {
    let reset_snapshot = |randomise_first: bool| {
        let mut randomiser = scanned(fixture());
        if randomise_first {
            randomiser.randomize(&options(3.0, 5)).unwrap();
        }
        let level = randomiser.host().level().key();
        let baseline = randomiser.store().baseline(&level).expect("baseline captured by scan");
        let catalog: Catalog = randomiser.store().catalog();
        let unusable = randomiser.store().unusable_variants();
        let live = snapshot(randomiser.host());
        let protected = ProtectedSet::new(
            randomiser.host().active_use_identifiers().unwrap(),
            Vec::<String>::new(),
        );
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(0);
        hard_reset(
            randomiser.host_mut(),
            Some(&baseline),
            &live,
            &protected,
            &catalog,
            &unusable,
            &mut rng,
        );
        (snapshot(randomiser.host()), baseline)
    };

    let (after_run, baseline) = reset_snapshot(true);
    let (fresh, _) = reset_snapshot(false);
    assert_eq!(after_run, fresh);
    assert_eq!(after_run.adopted, baseline.defaults_adopted);
    assert_eq!(after_run.pending, baseline.defaults_pending);
}

#[test]
fn second_run_starts_from_the_baseline() {
    let mut randomiser = scanned(fixture());
    let first = randomiser.randomize(&options(2.0, 1)).unwrap();
    assert!(first.reset.is_none());

    let second = randomiser.randomize(&options(2.0, 2)).unwrap();
    let reset = second.reset.as_ref().expect("second run resets");
    assert!(reset.from_baseline);
    assert_eq!(second.run, 2);
    assert_eq!(second.plan, first.plan);

    let mutable = mutable_items(&randomiser);
    assert_eq!(mutable.iter().filter(|(_, adopted)| *adopted).count(), 3);
    assert_eq!(count_in(&mutable, Category::Gentle), 6);
}

#[test]
fn prune_keeps_loaded_objects_within_quota() {
    let mut randomiser = scanned(fixture());
    for i in 0..10 {
        randomiser.host_mut().load_object(&gentle(i)).unwrap();
    }
    for i in 0..4 {
        randomiser
            .host_mut()
            .load_object(&format!("rct2.ride.shop{i}"))
            .unwrap();
    }

    let report = randomiser.randomize(&options(1.0, 8)).unwrap();
    assert!(!report.prune.unloaded.is_empty());
    assert!(report.prune.over_quota.is_empty());

    let catalog = randomiser.store().catalog();
    let counts = loaded_counts(randomiser.host(), &report.result, &ProtectedSet::default(), &catalog);
    for (category, target) in report.plan.iter() {
        let loaded = counts.get(&category).copied().unwrap_or(0);
        assert!(loaded <= target.selection, "{category}: {loaded} > {}", target.selection);
    }
    assert_eq!(counts.get(&Category::Shop), None);
}

#[test]
fn guarantees_are_added_without_using_quota() {
    let mut randomiser = scanned(fixture());
    let mut opts = options(1.0, 4);
    opts.guarantee_cash_machine = true;
    opts.guarantee_info_kiosk = true;
    let report = randomiser.randomize(&opts).unwrap();

    assert_eq!(report.guarantees.len(), 2);
    let adopted: Vec<String> = all_items(&randomiser)
        .into_iter()
        .filter(|(_, adopted)| *adopted)
        .map(|(item, _)| item.identifier().to_string())
        .collect();
    assert!(adopted.contains(&"rct2.ride.atm1".to_string()));
    assert!(adopted.contains(&"rct2.ride.infok".to_string()));

    let mutable = mutable_items(&randomiser);
    assert_eq!(count_in(&mutable, Category::Gentle), 3);
    assert_eq!(count_in(&mutable, Category::Shop), 0);
}

#[test]
fn scan_restores_collections_when_probe_writes_fail() {
    let host = fixture();
    let mut randomiser = research_randomiser_core::Randomiser::new(host, research_randomiser_core::MemoryStore::new());
    let before = (randomiser.host().adopted(), randomiser.host().pending());

    randomiser.host_mut().reject_next_writes(2);
    let report = randomiser.scan().unwrap();
    assert!(!report.probe_failures.is_empty());
    assert!(report.restore_failure.is_none());
    assert_eq!((randomiser.host().adopted(), randomiser.host().pending()), before);
}

#[test]
fn randomize_requires_a_current_catalog() {
    let mut randomiser = scanned(fixture());
    randomiser
        .host_mut()
        .install(research_randomiser_core::host::ObjectDefinition::ride(
            "rct2.ride.new1",
            "Brand New",
            &[33],
        ));
    let err = randomiser.randomize(&options(1.0, 0)).unwrap_err();
    assert!(matches!(err, ResearchError::ScanRequired(_)));

    randomiser.scan().unwrap();
    assert!(randomiser.randomize(&options(1.0, 0)).is_ok());
}

#[test]
fn clearing_state_keeps_preferences() {
    let mut randomiser = scanned(fixture());
    let opts = options(1.5, 1);
    randomiser.randomize(&opts).unwrap();
    randomiser
        .store_mut()
        .set_preferences(&opts.to_preferences())
        .unwrap();

    randomiser.clear_all_persisted_state().unwrap();
    let status = randomiser.status();
    assert!(!status.has_baseline);
    assert!(!status.has_catalog);
    assert_eq!(status.runs, 0);
    assert!(status.scan.needed);
    assert_eq!(randomiser.store().preferences().multiplier, 1.5);
}

#[test]
fn excluding_custom_rides_leaves_the_baseline_alone() {
    let mut host = MemoryHost::default();
    host.install(ObjectDefinition::ride("rct2.ride.g0", "Base Gentle", &[10]));
    host.install(ObjectDefinition::ride("fan.ride.g1", "Fan One", &[11]).with_source_tags(&["workshop"]));
    host.install(ObjectDefinition::ride("fan.ride.g2", "Fan Two", &[12]).with_source_tags(&["workshop"]));
    for variant in 10..13 {
        host.set_variant_category(variant, Category::Gentle);
    }
    let g0 = host.research_ref("rct2.ride.g0", Some(10)).unwrap();
    let g1 = host.research_ref("fan.ride.g1", Some(11)).unwrap();
    let g2 = host.research_ref("fan.ride.g2", Some(12)).unwrap();
    host.state_mut().adopted = vec![g0];
    host.state_mut().pending = vec![g1, g2];
    let mut randomiser = scanned(host);

    let first = randomiser.randomize(&options(1.0, 1)).unwrap();
    assert_eq!(first.plan.get(Category::Gentle).selection, 3);

    let mut excluding = options(1.0, 2);
    excluding.exclude_custom = true;
    let second = randomiser.randomize(&excluding).unwrap();
    assert!(!second.baseline_tightened);
    assert_eq!(second.pool_sizes.get(Category::Gentle), 1);
    assert_eq!(second.plan.get(Category::Gentle).selection, 3);
    assert!(!second.shortfalls.is_empty());
    assert!(second
        .result
        .iter()
        .all(|(item, _)| !item.identifier().starts_with("fan.")));

    let third = randomiser.randomize(&options(1.0, 3)).unwrap();
    assert!(!third.baseline_tightened);
    assert_eq!(third.plan.get(Category::Gentle).selection, 3);
    assert_eq!(count_in(&mutable_items(&randomiser), Category::Gentle), 3);
}

#[test]
fn a_ride_that_will_not_load_does_not_block_randomize() {
    let mut host = fixture();
    host.install(ObjectDefinition::ride("rct2.ride.bad", "Bad Ride", &[10]));
    host.state_mut().broken.insert("rct2.ride.bad".to_string());
    let mut randomiser = research_randomiser_core::Randomiser::new(host, research_randomiser_core::MemoryStore::new());

    for _ in 0..2 {
        let report = randomiser.scan().unwrap();
        assert_eq!(report.load_failures, vec!["rct2.ride.bad".to_string()]);
        assert!(!randomiser.status().scan.needed);
    }
    let report = randomiser.randomize(&options(1.0, 6)).unwrap();
    assert!(report
        .result
        .iter()
        .all(|(item, _)| item.identifier() != "rct2.ride.bad"));
}
