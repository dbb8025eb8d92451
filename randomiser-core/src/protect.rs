use std::collections::HashSet;

/// Default scenery groups and the toilet block; always kept where they are.
pub const DEFAULT_PROTECTED: &[&str] = &[
    "rct2.scenery_group.scgwalls",
    "rct2.scenery_group.scgpathx",
    "rct2.scenery_group.scgshrub",
    "rct2.scenery_group.scggardn",
    "rct2.scenery_group.scgfence",
    "rct2.scenery_group.scgtrees",
    "rct1.ride.toilets",
];

pub const CASH_MACHINE: &str = "rct2.ride.atm1";
pub const INFO_KIOSK: &str = "rct2.ride.infok";

/// Singletons that can be guaranteed as adopted on request.
pub const GUARANTEED_SINGLETONS: &[&str] = &[CASH_MACHINE, INFO_KIOSK];

pub fn is_default_protected(identifier: &str) -> bool {
    DEFAULT_PROTECTED.contains(&identifier)
}

pub fn is_guaranteed_singleton(identifier: &str) -> bool {
    GUARANTEED_SINGLETONS.contains(&identifier)
}

/// Identifiers that are never selected, pruned or counted against a quota.
#[derive(Debug, Clone, Default)]
pub struct ProtectedSet {
    active_use: HashSet<String>,
    guaranteed: HashSet<String>,
}

impl ProtectedSet {
    pub fn new(
        active_use: impl IntoIterator<Item = String>,
        guaranteed_present: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            active_use: active_use.into_iter().collect(),
            guaranteed: guaranteed_present.into_iter().collect(),
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        is_default_protected(identifier)
            || self.active_use.contains(identifier)
            || self.guaranteed.contains(identifier)
    }

    pub fn is_active(&self, identifier: &str) -> bool {
        self.active_use.contains(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_defaults_active_use_and_guarantees() {
        let set = ProtectedSet::new(
            vec!["rct2.ride.mgr1".to_string()],
            vec![CASH_MACHINE.to_string()],
        );
        assert!(set.contains("rct1.ride.toilets"));
        assert!(set.contains("rct2.ride.mgr1"));
        assert!(set.contains(CASH_MACHINE));
        assert!(!set.contains(INFO_KIOSK));
        assert!(set.is_active("rct2.ride.mgr1"));
        assert!(!set.is_active("rct1.ride.toilets"));
    }
}
