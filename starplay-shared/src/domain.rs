use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stars(pub i32);

impl Stars {
    pub fn zero() -> Self {
        Stars(0)
    }
}

/// Score points needed for one star (rounded up when converting).
pub const SCORE_PER_STAR: i32 = 5;
/// Bonus credited when a full daily challenge is claimed.
pub const DAILY_CHALLENGE_BONUS: i32 = 50;

/// Convert a final game score into stars: every [`SCORE_PER_STAR`]
/// points yield one star, rounded up; a zero score earns nothing.
pub fn stars_for_score(score: i32) -> Stars {
    if score <= 0 {
        return Stars::zero();
    }
    Stars((score as u32).div_ceil(SCORE_PER_STAR as u32) as i32)
}

/// The three fixed age bands a child profile can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "6-7")]
    Young,
    #[serde(rename = "8-9")]
    Middle,
    #[serde(rename = "10")]
    Older,
}

impl AgeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBand::Young => "6-7",
            AgeBand::Middle => "8-9",
            AgeBand::Older => "10",
        }
    }
}

impl FromStr for AgeBand {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6-7" => Ok(AgeBand::Young),
            "8-9" => Ok(AgeBand::Middle),
            "10" => Ok(AgeBand::Older),
            other => Err(format!("unknown age band: {}", other)),
        }
    }
}

/// Daily challenge task categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Math,
    Language,
    Logic,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Math => "math",
            TaskCategory::Language => "language",
            TaskCategory::Logic => "logic",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "math" => Ok(TaskCategory::Math),
            "language" => Ok(TaskCategory::Language),
            "logic" => Ok(TaskCategory::Logic),
            other => Err(format!("unknown task category: {}", other)),
        }
    }
}

/// Shop item categories; each maps to one equip slot on the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Helmet,
    Suit,
    Pet,
    Background,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemCategory::Helmet => "helmet",
            ItemCategory::Suit => "suit",
            ItemCategory::Pet => "pet",
            ItemCategory::Background => "background",
        }
    }
}

impl FromStr for ItemCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "helmet" => Ok(ItemCategory::Helmet),
            "suit" => Ok(ItemCategory::Suit),
            "pet" => Ok(ItemCategory::Pet),
            "background" => Ok(ItemCategory::Background),
            other => Err(format!("unknown item category: {}", other)),
        }
    }
}

/// Catalog entry for the cosmetic shop, as configured by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    pub category: ItemCategory,
    pub cost: i32,
    pub asset_url: String,
}
