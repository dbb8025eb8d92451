use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::catalog::{is_custom_source, normalize_name, Catalog};
use crate::category::{Category, CategoryCounts};
use crate::collections::Snapshot;
use crate::item::{ResearchItem, StableKey};
use crate::protect::ProtectedSet;
use crate::store::UnusableVariants;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item: ResearchItem,
    pub signature: String,
}

#[derive(Debug, Clone, Default)]
pub struct Pools {
    by_category: BTreeMap<Category, Vec<Candidate>>,
}

impl Pools {
    pub fn get(&self, category: Category) -> &[Candidate] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn sizes(&self) -> CategoryCounts {
        Category::ALL
            .iter()
            .map(|&c| (c, self.get(c).len()))
            .collect()
    }
}

pub struct PoolOptions<'a> {
    pub protected: &'a ProtectedSet,
    pub unusable: &'a UnusableVariants,
    pub exclude_custom: bool,
}

struct PoolBuilder<'a> {
    catalog: &'a Catalog,
    options: PoolOptions<'a>,
    keys: HashSet<StableKey>,
    signatures: HashMap<(Category, String), String>,
    pools: Pools,
}

impl PoolBuilder<'_> {
    fn offer(&mut self, item: ResearchItem) {
        let identifier = item.identifier();
        if self.options.protected.contains(identifier) {
            return;
        }
        let key = item.stable_key();
        let entry = self.catalog.get(&key);
        if self.options.exclude_custom {
            let custom = entry.map_or_else(|| is_custom_source(identifier, &[]), |e| e.custom);
            if custom {
                return;
            }
        }
        if let Some(variant) = item.variant() {
            if self.options.unusable.contains(variant.raw()) {
                return;
            }
        }
        if self.keys.contains(&key) {
            return;
        }
        let signature = entry.map_or_else(|| normalize_name("", identifier), |e| e.signature.clone());
        let category = item.category();
        match self.signatures.get(&(category, signature.clone())) {
            Some(owner) if owner != identifier => {
                debug!(identifier, owner = %owner, "skipping look-alike candidate");
                return;
            }
            Some(_) => {}
            None => {
                self.signatures
                    .insert((category, signature.clone()), identifier.to_string());
            }
        }
        self.keys.insert(key);
        self.pools.by_category.entry(category).or_default().push(Candidate {
            item,
            signature,
        });
    }
}

/// Per-category candidates: what the collections already hold, then the
/// categorised catalog entries, deduplicated by stable key and by display
/// name signature within a category.
pub fn build_pools(snapshot: &Snapshot, catalog: &Catalog, options: PoolOptions<'_>) -> Pools {
    let mut builder = PoolBuilder {
        catalog,
        options,
        keys: HashSet::new(),
        signatures: HashMap::new(),
        pools: Pools::default(),
    };
    for (item, _) in snapshot.iter() {
        builder.offer(item.clone());
    }
    for entry in catalog.entries() {
        if let Some(item) = entry.to_item() {
            builder.offer(item);
        }
    }
    builder.pools
}
