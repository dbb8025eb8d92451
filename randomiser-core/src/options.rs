use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::Preferences;
use crate::{ResearchError, Result};

pub const MAX_MULTIPLIER: f64 = 10.0;

/// Multiplier presets offered to users, with their labels.
pub const MULTIPLIER_PRESETS: &[(f64, &str)] = &[(1.0, "1.0x"), (1.5, "1.5x"), (2.0, "2.0x"), (3.0, "3.0x")];

/// Scale factor applied to the baseline selection. Always finite and in
/// `(0, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Multiplier(f64);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(1.0);

    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 && value <= MAX_MULTIPLIER {
            Ok(Multiplier(value))
        } else {
            Err(ResearchError::Config(format!(
                "multiplier must be in (0, {MAX_MULTIPLIER}], got {value}"
            )))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn presets() -> impl Iterator<Item = (Multiplier, &'static str)> {
        MULTIPLIER_PRESETS.iter().map(|&(v, label)| (Multiplier(v), label))
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Multiplier::ONE
    }
}

impl TryFrom<f64> for Multiplier {
    type Error = ResearchError;

    fn try_from(value: f64) -> Result<Self> {
        Multiplier::new(value)
    }
}

impl From<Multiplier> for f64 {
    fn from(m: Multiplier) -> Self {
        m.0
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}x", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomiseOptions {
    pub multiplier: Multiplier,
    pub guarantee_cash_machine: bool,
    pub guarantee_info_kiosk: bool,
    pub exclude_custom: bool,
    pub seed: u64,
}

impl RandomiseOptions {
    /// Options from stored preferences. An out-of-range stored multiplier
    /// falls back to 1.0.
    pub fn from_preferences(prefs: &Preferences, seed: u64) -> Self {
        Self {
            multiplier: Multiplier::new(prefs.multiplier).unwrap_or_default(),
            guarantee_cash_machine: prefs.guarantee_cash_machine,
            guarantee_info_kiosk: prefs.guarantee_info_kiosk,
            exclude_custom: prefs.exclude_custom,
            seed,
        }
    }

    pub fn to_preferences(&self) -> Preferences {
        Preferences {
            multiplier: self.multiplier.value(),
            guarantee_cash_machine: self.guarantee_cash_machine,
            guarantee_info_kiosk: self.guarantee_info_kiosk,
            exclude_custom: self.exclude_custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_bounds() {
        assert!(Multiplier::new(0.0).is_err());
        assert!(Multiplier::new(f64::NAN).is_err());
        assert!(Multiplier::new(10.5).is_err());
        assert_eq!(Multiplier::new(0.5).unwrap().value(), 0.5);
        assert!(serde_json::from_str::<Multiplier>("-1.0").is_err());
        assert_eq!(Multiplier::new(1.5).unwrap().to_string(), "1.5x");
        assert_eq!(Multiplier::presets().count(), 4);
    }

    #[test]
    fn bad_stored_multiplier_falls_back() {
        let prefs = Preferences {
            multiplier: 99.0,
            exclude_custom: true,
            ..Preferences::default()
        };
        let options = RandomiseOptions::from_preferences(&prefs, 7);
        assert_eq!(options.multiplier, Multiplier::ONE);
        assert!(options.exclude_custom);
        assert_eq!(options.to_preferences().multiplier, 1.0);
    }
}
