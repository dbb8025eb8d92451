//! Per-category quotas derived from a baseline and a multiplier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::category::{Category, CategoryCounts};

const EPSILON: f64 = 1e-9;

/// Split `total` across categories in proportion to `weights` using
/// largest-remainder apportionment. Leftover units go to the largest
/// fractional remainders; equal remainders are broken by canonical
/// category order. The result always sums to `total` unless every weight
/// is zero.
pub fn apportion(weights: &CategoryCounts, total: usize) -> CategoryCounts {
    let weight_sum = weights.total();
    let mut out = CategoryCounts::new();
    if weight_sum == 0 || total == 0 {
        return out;
    }

    let mut remainders: Vec<(u64, Category)> = Vec::with_capacity(Category::COUNT);
    for (category, weight) in weights.iter() {
        let exact = weight as f64 * total as f64 / weight_sum as f64;
        let floor = (exact + EPSILON).floor();
        out.set(category, floor as usize);
        // Quantised so near-equal remainders compare as equal.
        let frac = ((exact - floor).max(0.0) * 1e9).round() as u64;
        remainders.push((frac, category));
    }

    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    let need = total.saturating_sub(out.total());
    for (_, category) in remainders.iter().cycle().take(need) {
        out.increment(*category);
    }
    out
}

/// Scale every category by `multiplier`, keeping the grand total at
/// `round(total * multiplier)`.
pub fn apportion_scaled(weights: &CategoryCounts, multiplier: f64) -> CategoryCounts {
    let total = (weights.total() as f64 * multiplier).round().max(0.0) as usize;
    apportion(weights, total)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTarget {
    pub adopted: usize,
    pub pending: usize,
    pub selection: usize,
}

/// Integer targets for one multiplier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPlan {
    targets: BTreeMap<Category, CategoryTarget>,
}

impl TargetPlan {
    pub fn get(&self, category: Category) -> CategoryTarget {
        self.targets.get(&category).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, CategoryTarget)> + '_ {
        Category::ALL.iter().map(move |&c| (c, self.get(c)))
    }

    pub fn selection(&self) -> CategoryCounts {
        self.iter().map(|(c, t)| (c, t.selection)).collect()
    }

    pub fn adopted_total(&self) -> usize {
        self.iter().map(|(_, t)| t.adopted).sum()
    }

    pub fn pending_total(&self) -> usize {
        self.iter().map(|(_, t)| t.pending).sum()
    }

    pub fn selection_total(&self) -> usize {
        self.iter().map(|(_, t)| t.selection).sum()
    }
}

/// Targets for `multiplier`. Adopted targets stay at the baseline adopted
/// count; selection is the scaled baseline selection, never below adopted.
pub fn compute_targets(
    baseline_adopted: &CategoryCounts,
    baseline_selection: &CategoryCounts,
    multiplier: f64,
) -> TargetPlan {
    let scaled = apportion_scaled(baseline_selection, multiplier);
    let targets = Category::ALL
        .iter()
        .map(|&category| {
            let adopted = baseline_adopted.get(category);
            let selection = scaled.get(category).max(adopted);
            (
                category,
                CategoryTarget {
                    adopted,
                    pending: selection - adopted,
                    selection,
                },
            )
        })
        .collect();
    TargetPlan { targets }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(Category, usize)]) -> CategoryCounts {
        pairs.iter().copied().collect()
    }

    #[test]
    fn scales_by_one_and_a_half() {
        let base = counts(&[(Category::Gentle, 4), (Category::Thrill, 2), (Category::Shop, 2)]);
        let scaled = apportion_scaled(&base, 1.5);
        assert_eq!(scaled.total(), 12);
        assert_eq!(scaled.get(Category::Gentle), 6);
        assert_eq!(scaled.get(Category::Thrill), 3);
        assert_eq!(scaled.get(Category::Shop), 3);
    }

    #[test]
    fn ties_follow_canonical_order() {
        let base = counts(&[(Category::Water, 1), (Category::Transport, 1), (Category::Shop, 1)]);
        let out = apportion(&base, 4);
        assert_eq!(out.total(), 4);
        assert_eq!(out.get(Category::Transport), 2);
        assert_eq!(out.get(Category::Water), 1);
        assert_eq!(out.get(Category::Shop), 1);
    }

    #[test]
    fn totals_are_exact_for_many_multipliers() {
        let base = counts(&[
            (Category::Transport, 1),
            (Category::Gentle, 7),
            (Category::Rollercoaster, 3),
            (Category::Thrill, 5),
            (Category::Water, 2),
            (Category::Shop, 9),
        ]);
        for step in 1..=40 {
            let m = step as f64 * 0.25;
            let expected = (base.total() as f64 * m).round() as usize;
            assert_eq!(apportion_scaled(&base, m).total(), expected, "multiplier {m}");
        }
    }

    #[test]
    fn empty_weights_yield_nothing() {
        assert_eq!(apportion(&CategoryCounts::new(), 5).total(), 0);
    }

    #[test]
    fn targets_never_drop_below_adopted() {
        let adopted = counts(&[(Category::Gentle, 2), (Category::Thrill, 1)]);
        let selection = counts(&[(Category::Gentle, 3), (Category::Thrill, 1)]);

        let doubled = compute_targets(&adopted, &selection, 2.0);
        assert_eq!(doubled.get(Category::Gentle), CategoryTarget { adopted: 2, pending: 4, selection: 6 });
        assert_eq!(doubled.get(Category::Thrill), CategoryTarget { adopted: 1, pending: 1, selection: 2 });

        let halved = compute_targets(&adopted, &selection, 0.5);
        assert_eq!(halved.get(Category::Gentle).selection, 2);
        assert_eq!(halved.get(Category::Gentle).pending, 0);
        assert_eq!(halved.get(Category::Thrill).selection, 1);
        assert_eq!(halved.adopted_total(), 3);
    }
}
