//! The four-rank growth progression and its saturating transitions.
//!
//! A [`Stage`] only ever moves one rank at a time. [`Stage::advance`] is the
//! forward edge (fired by new activity) and [`Stage::regress`] the backward
//! edge (fired by staleness). Both saturate at their respective ends, so
//! calling them on `Mature` / `Dormant` returns the input unchanged. Callers
//! that only care about genuine transitions compare the result with the
//! input.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A rank in the activity progression.
///
/// The derived ordering follows declaration order:
/// `Dormant < Emerging < Established < Mature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Stage {
    /// No sustained activity yet (a seed).
    Dormant,
    /// First signs of activity (a sapling).
    Emerging,
    /// Regular activity (a plant).
    Established,
    /// Sustained activity, the top rank (a tree).
    Mature,
}

impl Stage {
    /// Every stage in ascending rank order.
    pub const ALL: [Self; 4] = [Self::Dormant, Self::Emerging, Self::Established, Self::Mature];

    /// The lowest rank, where every tracked account starts.
    pub const INITIAL: Self = Self::Dormant;

    /// Return the next-higher rank, or `self` when already [`Stage::Mature`].
    pub const fn advance(self) -> Self {
        match self {
            Self::Dormant => Self::Emerging,
            Self::Emerging => Self::Established,
            Self::Established | Self::Mature => Self::Mature,
        }
    }

    /// Return the next-lower rank, or `self` when already [`Stage::Dormant`].
    pub const fn regress(self) -> Self {
        match self {
            Self::Dormant | Self::Emerging => Self::Dormant,
            Self::Established => Self::Emerging,
            Self::Mature => Self::Established,
        }
    }

    /// Zero-based rank (`Dormant` = 0, `Mature` = 3).
    pub const fn rank(self) -> u8 {
        match self {
            Self::Dormant => 0,
            Self::Emerging => 1,
            Self::Established => 2,
            Self::Mature => 3,
        }
    }

    /// Inverse of [`Stage::rank`].
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::Dormant),
            1 => Some(Self::Emerging),
            2 => Some(Self::Established),
            3 => Some(Self::Mature),
            _ => None,
        }
    }

    /// Whether [`Stage::regress`] would be a no-op.
    pub const fn is_bottom(self) -> bool {
        matches!(self, Self::Dormant)
    }

    /// Canonical lowercase name, used as the persisted encoding.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::Emerging => "emerging",
            Self::Established => "established",
            Self::Mature => "mature",
        }
    }

    /// Plant-growth name shown to users.
    pub const fn domain_name(self) -> &'static str {
        match self {
            Self::Dormant => "seed",
            Self::Emerging => "sapling",
            Self::Established => "plant",
            Self::Mature => "tree",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A string did not name any [`Stage`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct StageParseError(pub String);

impl FromStr for Stage {
    type Err = StageParseError;

    /// Accepts canonical names and plant-growth names, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dormant" | "seed" => Ok(Self::Dormant),
            "emerging" | "sapling" => Ok(Self::Emerging),
            "established" | "plant" => Ok(Self::Established),
            "mature" | "tree" => Ok(Self::Mature),
            other => Err(StageParseError(other.to_owned())),
        }
    }
}
