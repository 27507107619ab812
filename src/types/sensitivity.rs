//! Sensitivity classification for block content.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered content-classification label: `Public < Internal < Restricted`.
///
/// Views handed to sub-agents are filtered against a maximum level;
/// blocks above it are replaced by redacted stubs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// Safe to show anywhere, including sub-agent forks.
    #[default]
    Public,
    /// Internal working material; withheld from forks by default.
    Internal,
    /// Must never leave the parent context unredacted.
    Restricted,
}

impl Sensitivity {
    /// Parse a sensitivity level from its canonical string form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "internal" => Some(Self::Internal),
            "restricted" => Some(Self::Restricted),
            _ => None,
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Internal => write!(f, "internal"),
            Self::Restricted => write!(f, "restricted"),
        }
    }
}
