use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::Category;

/// Raw value the host uses for "no usable variant".
pub const INVALID_VARIANT: i32 = 255;

/// A ride object's numeric sub-type. Only valid values can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Variant(u8);

impl Variant {
    pub fn from_raw(raw: i32) -> Option<Variant> {
        if (0..INVALID_VARIANT).contains(&raw) {
            Some(Variant(raw as u8))
        } else {
            None
        }
    }

    pub fn raw(self) -> i32 {
        i32::from(self.0)
    }
}

impl TryFrom<i32> for Variant {
    type Error = String;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Variant::from_raw(raw).ok_or_else(|| format!("invalid ride variant {raw}"))
    }
}

impl From<Variant> for i32 {
    fn from(variant: Variant) -> Self {
        variant.raw()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Ride,
    SceneryGroup,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Ride => "ride",
            ObjectKind::SceneryGroup => "scenery",
        }
    }
}

/// Canonical research record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResearchItem {
    Ride {
        identifier: String,
        variant: Variant,
        category: Category,
    },
    Group {
        identifier: String,
    },
}

impl ResearchItem {
    pub fn ride(identifier: impl Into<String>, variant: Variant, category: Category) -> Self {
        ResearchItem::Ride {
            identifier: identifier.into(),
            variant,
            category,
        }
    }

    pub fn group(identifier: impl Into<String>) -> Self {
        ResearchItem::Group {
            identifier: identifier.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            ResearchItem::Ride { identifier, .. } | ResearchItem::Group { identifier } => identifier,
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            ResearchItem::Ride { .. } => ObjectKind::Ride,
            ResearchItem::Group { .. } => ObjectKind::SceneryGroup,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            ResearchItem::Ride { category, .. } => *category,
            ResearchItem::Group { .. } => Category::Scenery,
        }
    }

    pub fn variant(&self) -> Option<Variant> {
        match self {
            ResearchItem::Ride { variant, .. } => Some(*variant),
            ResearchItem::Group { .. } => None,
        }
    }

    pub fn stable_key(&self) -> StableKey {
        match self {
            ResearchItem::Ride {
                identifier,
                variant,
                ..
            } => StableKey::Ride {
                identifier: identifier.clone(),
                variant: *variant,
            },
            ResearchItem::Group { identifier } => StableKey::Group {
                identifier: identifier.clone(),
            },
        }
    }
}

/// Identity of a research item across both collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StableKey {
    Ride { identifier: String, variant: Variant },
    Group { identifier: String },
}

impl StableKey {
    pub fn identifier(&self) -> &str {
        match self {
            StableKey::Ride { identifier, .. } | StableKey::Group { identifier } => identifier,
        }
    }
}

impl fmt::Display for StableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StableKey::Ride {
                identifier,
                variant,
            } => write!(f, "ride|{identifier}|{variant}"),
            StableKey::Group { identifier } => write!(f, "scenery|{identifier}"),
        }
    }
}
