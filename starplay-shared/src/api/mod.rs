use serde::{Deserialize, Serialize};

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";

/// URL namespace all family-scoped resources live under.
pub fn tenant_scope(tenant_id: &str) -> String {
    format!("{}/family/{}", API_V1_PREFIX, tenant_id)
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

// Children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildDto {
    pub id: String,
    pub display_name: String,
    pub age_band: String,
    pub avatar_id: String,
    pub total_stars: i32,
    pub equipped: EquippedDto,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquippedDto {
    pub helmet: Option<String>,
    pub suit: Option<String>,
    pub pet: Option<String>,
    pub background: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChildReq {
    pub display_name: String,
    pub age_band: String,
    pub avatar_id: Option<String>,
}

// Per-child settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsDto {
    pub daily_limit_minutes: i32,
    /// Empty means no restriction: every module is allowed.
    pub enabled_modules: Vec<String>,
    pub sound_enabled: bool,
    pub rewards_enabled: bool,
    pub reporting_level: String, // "simple" | "detailed"
}

// Session / time lock
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStateDto {
    pub child_id: String,
    pub minutes_used: i32,
    pub daily_limit_minutes: i32,
    pub locked: bool,
    pub temporarily_unlocked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlockReq {
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreakDto {
    pub child_id: String,
    pub days: u32,
}

// Daily challenge
#[derive(Debug, Serialize, Deserialize)]
pub struct ChallengeDto {
    pub child_id: String,
    pub challenge_date: String, // YYYY-MM-DD
    pub math_completed: bool,
    pub language_completed: bool,
    pub logic_completed: bool,
    pub rewards_claimed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    Credited,
    NotComplete,
    AlreadyClaimed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResp {
    pub outcome: ClaimOutcome,
    pub bonus_stars: i32,
    pub total_stars: i32,
}

// Game sessions
#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionReq {
    pub module_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionResp {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerReq {
    pub question_id: String,
    pub answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub response_time_ms: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndSessionReq {
    pub score: i32,
    pub meta: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndSessionResp {
    pub stars_earned: i32,
    pub total_stars: i32,
    pub duration_seconds: i32,
}

// Shop
#[derive(Debug, Serialize, Deserialize)]
pub struct ShopItemDto {
    pub id: String,
    pub name: String,
    pub category: String,
    pub cost: i32,
    pub asset_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnedItemsDto {
    pub item_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseReq {
    pub item_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseResp {
    pub total_stars: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EquipReq {
    pub item_id: String,
}

// Parent settings
#[derive(Debug, Serialize, Deserialize)]
pub struct PinReq {
    /// `None` clears the PIN, restoring the fail-open default.
    pub pin: Option<String>,
}
