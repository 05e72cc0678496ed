use crate::storage::schema::{
    answer_log, child_profiles, child_settings, daily_challenges, daily_usage, game_sessions,
    parent_profiles, purchased_items, sessions, shop_items,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = child_profiles)]
pub struct ChildProfile {
    pub id: String,
    pub parent_username: String,
    pub display_name: String,
    pub age_band: String,
    pub avatar_id: String,
    pub total_stars: i32,
    pub equipped_helmet: Option<String>,
    pub equipped_suit: Option<String>,
    pub equipped_pet: Option<String>,
    pub equipped_background: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = child_profiles)]
pub struct NewChildProfile<'a> {
    pub id: &'a str,
    pub parent_username: &'a str,
    pub display_name: &'a str,
    pub age_band: &'a str,
    pub avatar_id: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = child_settings)]
#[diesel(primary_key(child_id))]
pub struct ChildSettings {
    pub child_id: String,
    pub daily_limit_minutes: i32,
    /// JSON-encoded array of module ids; `[]` means no restriction.
    pub enabled_modules: String,
    pub sound_enabled: bool,
    pub rewards_enabled: bool,
    pub reporting_level: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = child_settings)]
pub struct NewChildSettings<'a> {
    pub child_id: &'a str,
    pub daily_limit_minutes: i32,
    pub enabled_modules: &'a str,
    pub sound_enabled: bool,
    pub rewards_enabled: bool,
    pub reporting_level: &'a str,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = daily_usage)]
pub struct NewDailyUsage<'a> {
    pub child_id: &'a str,
    pub day: NaiveDate,
    pub minutes_used: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = game_sessions)]
pub struct GameSession {
    pub id: String,
    pub child_id: String,
    pub module_id: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub duration_seconds: i32,
    pub score: i32,
    pub meta: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = game_sessions)]
pub struct NewGameSession<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub module_id: &'a str,
    pub started_at: NaiveDateTime,
    pub duration_seconds: i32,
    pub score: i32,
}

#[derive(Insertable)]
#[diesel(table_name = answer_log)]
pub struct NewAnswerLogEntry<'a> {
    pub session_id: &'a str,
    pub question_id: &'a str,
    pub answer: &'a str,
    pub correct_answer: &'a str,
    pub is_correct: bool,
    pub response_time_ms: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = daily_challenges)]
#[diesel(primary_key(child_id, challenge_date))]
pub struct DailyChallenge {
    pub child_id: String,
    pub challenge_date: NaiveDate,
    pub math_completed: bool,
    pub language_completed: bool,
    pub logic_completed: bool,
    pub rewards_claimed: bool,
    pub created_at: NaiveDateTime,
}

impl DailyChallenge {
    pub fn all_tasks_completed(&self) -> bool {
        self.math_completed && self.language_completed && self.logic_completed
    }
}

#[derive(Insertable)]
#[diesel(table_name = daily_challenges)]
pub struct NewDailyChallenge<'a> {
    pub child_id: &'a str,
    pub challenge_date: NaiveDate,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = shop_items)]
pub struct ShopItemRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub cost: i32,
    pub asset_url: String,
}

#[derive(Insertable)]
#[diesel(table_name = shop_items)]
pub struct NewShopItem<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub category: &'a str,
    pub cost: i32,
    pub asset_url: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = purchased_items)]
pub struct NewPurchasedItem<'a> {
    pub child_id: &'a str,
    pub item_id: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = parent_profiles)]
pub struct NewParentProfile<'a> {
    pub username: &'a str,
    pub pin_code: Option<&'a str>,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}
