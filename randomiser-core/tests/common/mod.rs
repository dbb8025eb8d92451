#![allow(dead_code)]

use research_randomiser_core::host::{MemoryHost, ObjectDefinition};
use research_randomiser_core::{
    Category, LevelIdentity, MemoryStore, Multiplier, RandomiseOptions, Randomiser, ResearchItem,
    ResourceHost,
};

pub const DEFAULT_GROUPS: &[&str] = &[
    "rct2.scenery_group.scgtrees",
    "rct2.scenery_group.scgwalls",
    "rct2.scenery_group.scgpathx",
    "rct2.scenery_group.scgshrub",
    "rct2.scenery_group.scggardn",
    "rct2.scenery_group.scgfence",
];

pub const EXTRA_GROUPS: &[&str] = &[
    "rct2.scenery_group.scgjungl",
    "rct2.scenery_group.scgsnow",
    "rct2.scenery_group.scgmine",
];

pub fn gentle(i: i32) -> String {
    format!("rct2.ride.gentle{i}")
}

pub fn thrill(i: i32) -> String {
    format!("rct2.ride.thrill{i}")
}

/// A park with ten gentle rides over four variants, five thrill rides,
/// six shops and nine scenery groups. Collections start as:
/// adopted = scgtrees, gentle0, gentle1, thrill0;
/// pending = toilets, gentle2, scgjungl.
pub fn fixture() -> MemoryHost {
    let mut host = MemoryHost::default();
    host.state_mut().level = LevelIdentity {
        name: "Fixture Park".to_string(),
        width: 128,
        height: 128,
    };

    for i in 0..10 {
        host.install(ObjectDefinition::ride(&gentle(i), &format!("Gentle Ride {i}"), &[10 + i % 4]));
    }
    for v in 10..14 {
        host.set_variant_category(v, Category::Gentle);
    }
    for i in 0..5 {
        host.install(ObjectDefinition::ride(&thrill(i), &format!("Thrill Ride {i}"), &[30 + i]));
        host.set_variant_category(30 + i, Category::Thrill);
    }

    host.install(ObjectDefinition::ride("rct1.ride.toilets", "Toilets", &[44]));
    host.install(ObjectDefinition::ride("rct2.ride.atm1", "Cash Machine", &[45]));
    host.install(ObjectDefinition::ride("rct2.ride.infok", "Information Kiosk", &[46]));
    for i in 0..4 {
        host.install(ObjectDefinition::ride(&format!("rct2.ride.shop{i}"), &format!("Shop {i}"), &[47 + i]));
        host.set_variant_category(47 + i, Category::Shop);
    }
    for v in 44..47 {
        host.set_variant_category(v, Category::Shop);
    }

    for id in DEFAULT_GROUPS.iter().chain(EXTRA_GROUPS) {
        host.install(ObjectDefinition::group(id, id));
    }

    let r = |host: &mut MemoryHost, id: &str, variant: Option<i32>| {
        host.research_ref(id, variant).expect("fixture object loads")
    };
    let adopted = vec![
        r(&mut host, "rct2.scenery_group.scgtrees", None),
        r(&mut host, &gentle(0), Some(10)),
        r(&mut host, &gentle(1), Some(11)),
        r(&mut host, &thrill(0), Some(30)),
    ];
    let pending = vec![
        r(&mut host, "rct1.ride.toilets", Some(44)),
        r(&mut host, &gentle(2), Some(12)),
        r(&mut host, "rct2.scenery_group.scgjungl", None),
    ];
    host.state_mut().adopted = adopted;
    host.state_mut().pending = pending;
    host
}

pub fn scanned(host: MemoryHost) -> Randomiser<MemoryHost, MemoryStore> {
    let mut randomiser = Randomiser::new(host, MemoryStore::new());
    randomiser.scan().expect("scan succeeds");
    randomiser
}

pub fn options(multiplier: f64, seed: u64) -> RandomiseOptions {
    RandomiseOptions {
        multiplier: Multiplier::new(multiplier).expect("valid multiplier"),
        guarantee_cash_machine: false,
        guarantee_info_kiosk: false,
        exclude_custom: false,
        seed,
    }
}

pub fn all_items<H: ResourceHost>(randomiser: &Randomiser<H, MemoryStore>) -> Vec<(ResearchItem, bool)> {
    research_randomiser_core::collections::snapshot(randomiser.host())
        .iter()
        .map(|(item, adopted)| (item.clone(), adopted))
        .collect()
}

/// Items not covered by the default list, active use or the singletons.
pub fn mutable_items<H: ResourceHost>(randomiser: &Randomiser<H, MemoryStore>) -> Vec<(ResearchItem, bool)> {
    let active = randomiser.host().active_use_identifiers().unwrap_or_default();
    all_items(randomiser)
        .into_iter()
        .filter(|(item, _)| {
            let id = item.identifier();
            !research_randomiser_core::protect::is_default_protected(id)
                && !research_randomiser_core::protect::is_guaranteed_singleton(id)
                && !active.contains(id)
        })
        .collect()
}

pub fn count_in(items: &[(ResearchItem, bool)], category: Category) -> usize {
    items.iter().filter(|(item, _)| item.category() == category).count()
}
