use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The seven research buckets. Declaration order is the canonical order
/// used for every deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Transport,
    Gentle,
    Rollercoaster,
    Thrill,
    Water,
    Shop,
    Scenery,
}

impl Category {
    pub const COUNT: usize = 7;

    pub const ALL: [Category; Category::COUNT] = [
        Category::Transport,
        Category::Gentle,
        Category::Rollercoaster,
        Category::Thrill,
        Category::Water,
        Category::Shop,
        Category::Scenery,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Transport => "transport",
            Category::Gentle => "gentle",
            Category::Rollercoaster => "rollercoaster",
            Category::Thrill => "thrill",
            Category::Water => "water",
            Category::Shop => "shop",
            Category::Scenery => "scenery",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A count per category, stored densely in canonical order and persisted as
/// a `{ "gentle": 3, ... }` map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<Category, usize>",
    into = "BTreeMap<Category, usize>"
)]
pub struct CategoryCounts([usize; Category::COUNT]);

impl CategoryCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category) -> usize {
        self.0[category.index()]
    }

    pub fn set(&mut self, category: Category, value: usize) {
        self.0[category.index()] = value;
    }

    pub fn add(&mut self, category: Category, amount: usize) {
        self.0[category.index()] += amount;
    }

    pub fn increment(&mut self, category: Category) {
        self.add(category, 1);
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        Category::ALL.iter().map(move |&c| (c, self.get(c)))
    }
}

impl FromIterator<(Category, usize)> for CategoryCounts {
    fn from_iter<I: IntoIterator<Item = (Category, usize)>>(iter: I) -> Self {
        let mut counts = CategoryCounts::new();
        for (category, value) in iter {
            counts.add(category, value);
        }
        counts
    }
}

impl From<BTreeMap<Category, usize>> for CategoryCounts {
    fn from(map: BTreeMap<Category, usize>) -> Self {
        map.into_iter().collect()
    }
}

impl From<CategoryCounts> for BTreeMap<Category, usize> {
    fn from(counts: CategoryCounts) -> Self {
        counts.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_persist_as_named_map() {
        let mut counts = CategoryCounts::new();
        counts.set(Category::Gentle, 4);
        counts.increment(Category::Shop);

        let json = serde_json::to_value(counts).unwrap();
        assert_eq!(json["gentle"], 4);
        assert_eq!(json["shop"], 1);
        assert_eq!(json["water"], 0);

        let back: CategoryCounts = serde_json::from_value(json).unwrap();
        assert_eq!(back, counts);
        assert_eq!(back.total(), 5);
    }
}
