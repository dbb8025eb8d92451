use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use research_randomiser_core::quota::{apportion_scaled, compute_targets};
use research_randomiser_core::{Category, CategoryCounts};

fn counts(pairs: &[(Category, usize)]) -> CategoryCounts {
    pairs.iter().copied().collect()
}

#[test]
fn one_and_a_half_times_eight_is_twelve() {
    let base = counts(&[(Category::Gentle, 4), (Category::Thrill, 2), (Category::Shop, 2)]);
    let plan = compute_targets(&CategoryCounts::new(), &base, 1.5);
    assert_eq!(plan.selection_total(), 12);
    assert_eq!(plan.get(Category::Gentle).selection, 6);
    assert_eq!(plan.get(Category::Thrill).selection, 3);
    assert_eq!(plan.get(Category::Shop).selection, 3);
}

#[test]
fn random_baselines_apportion_exactly() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..500 {
        let base: CategoryCounts = Category::ALL
            .iter()
            .map(|&c| (c, rng.gen_range(0..12)))
            .collect();
        let multiplier = rng.gen_range(1..=40) as f64 * 0.25;
        let expected = (base.total() as f64 * multiplier).round() as usize;
        let scaled = apportion_scaled(&base, multiplier);
        if base.total() == 0 {
            assert_eq!(scaled.total(), 0);
            continue;
        }
        assert_eq!(scaled.total(), expected, "{base:?} at {multiplier}");
        for (category, value) in scaled.iter() {
            let exact = base.get(category) as f64 * expected as f64 / base.total() as f64;
            assert!(
                (value as f64 - exact).abs() < 1.0 + 1e-9,
                "{category} got {value}, exact share {exact}"
            );
        }
    }
}

#[test]
fn adopted_targets_hold_across_multipliers() {
    let adopted = counts(&[(Category::Gentle, 2), (Category::Water, 1)]);
    let selection = counts(&[(Category::Gentle, 5), (Category::Water, 1), (Category::Shop, 3)]);
    for multiplier in [0.25, 0.5, 1.0, 1.5, 2.0, 3.0, 10.0] {
        let plan = compute_targets(&adopted, &selection, multiplier);
        for (category, target) in plan.iter() {
            assert_eq!(target.adopted, adopted.get(category));
            assert_eq!(target.pending, target.selection - target.adopted);
            assert!(target.selection >= target.adopted);
        }
    }
}
