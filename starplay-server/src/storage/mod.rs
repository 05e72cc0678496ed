pub mod models;
pub mod schema;

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    ChildProfile, ChildSettings, DailyChallenge, GameSession, NewAnswerLogEntry, NewChildProfile,
    NewChildSettings, NewDailyChallenge, NewDailyUsage, NewGameSession, NewParentProfile,
    NewPurchasedItem, NewSession, NewShopItem, ShopItemRow,
};
use starplay_shared::domain::{DAILY_CHALLENGE_BONUS, stars_for_score};
use tracing::trace;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result of finishing a game session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The session transitioned to Ended just now; stars were credited.
    Finished {
        stars_earned: i32,
        total_stars: i32,
        duration_seconds: i32,
    },
    /// The session had already been ended; nothing was credited.
    AlreadyEnded {
        total_stars: i32,
        duration_seconds: i32,
    },
}

/// Result of claiming the daily-challenge bonus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeClaim {
    Credited { bonus: i32, total_stars: i32 },
    NotComplete,
    AlreadyClaimed { total_stars: i32 },
}

/// Result of a shop purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { total_stars: i32 },
    InsufficientStars { balance: i32, cost: i32 },
    AlreadyOwned,
    UnknownItem,
}

/// Result of equipping an owned cosmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EquipOutcome {
    Equipped,
    NotOwned,
    UnknownItem,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Upsert the shop catalog from config at startup.
    pub async fn seed_shop_items(
        &self,
        items: &[starplay_shared::domain::ShopItem],
    ) -> Result<(), StorageError> {
        use schema::shop_items;

        let pool = self.pool.clone();
        let items_owned = items.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            for item in &items_owned {
                let row = NewShopItem {
                    id: &item.id,
                    name: &item.name,
                    category: item.category.as_str(),
                    cost: item.cost,
                    asset_url: &item.asset_url,
                };
                diesel::insert_into(shop_items::table)
                    .values(&row)
                    .on_conflict(shop_items::id)
                    .do_update()
                    .set((
                        shop_items::name.eq(row.name),
                        shop_items::category.eq(row.category),
                        shop_items::cost.eq(row.cost),
                        shop_items::asset_url.eq(row.asset_url),
                    ))
                    .execute(&mut conn)?;
            }

            Ok(())
        })
        .await?
    }

    // ---- child profiles ----

    pub async fn create_child(
        &self,
        child_id: &str,
        parent_username: &str,
        display_name: &str,
        age_band: &str,
        avatar_id: &str,
    ) -> Result<ChildProfile, StorageError> {
        use schema::child_profiles::dsl as cp;
        let pool = self.pool.clone();
        let id_owned = child_id.to_string();
        let parent_owned = parent_username.to_string();
        let name_owned = display_name.to_string();
        let band_owned = age_band.to_string();
        let avatar_owned = avatar_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<ChildProfile, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new_child = NewChildProfile {
                id: &id_owned,
                parent_username: &parent_owned,
                display_name: &name_owned,
                age_band: &band_owned,
                avatar_id: &avatar_owned,
            };
            diesel::insert_into(cp::child_profiles)
                .values(&new_child)
                .execute(&mut conn)?;
            Ok(cp::child_profiles
                .filter(cp::id.eq(&id_owned))
                .first::<ChildProfile>(&mut conn)?)
        })
        .await?
    }

    pub async fn list_children(&self) -> Result<Vec<ChildProfile>, StorageError> {
        use schema::child_profiles::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ChildProfile>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(child_profiles
                .order(display_name.asc())
                .load::<ChildProfile>(&mut conn)?)
        })
        .await?
    }

    pub async fn get_child(&self, child: &str) -> Result<Option<ChildProfile>, StorageError> {
        use schema::child_profiles::dsl::*;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<ChildProfile>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(child_profiles
                .filter(id.eq(&child_owned))
                .first::<ChildProfile>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn child_exists(&self, child: &str) -> Result<bool, StorageError> {
        use schema::child_profiles::dsl::*;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let count: i64 = child_profiles
                .filter(id.eq(&child_owned))
                .count()
                .get_result(&mut conn)?;
            Ok(count > 0)
        })
        .await?
    }

    /// Delete a child profile and every row scoped to it, in one
    /// transaction. Returns `false` when the child does not exist.
    pub async fn delete_child_cascade(&self, child: &str) -> Result<bool, StorageError> {
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            use schema::{
                answer_log, child_profiles, child_settings, daily_challenges, daily_usage,
                game_sessions, purchased_items,
            };
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<bool, StorageError> {
                let session_ids = game_sessions::table
                    .filter(game_sessions::child_id.eq(&child_owned))
                    .select(game_sessions::id);
                diesel::delete(
                    answer_log::table.filter(answer_log::session_id.eq_any(session_ids)),
                )
                .execute(conn)?;
                diesel::delete(
                    game_sessions::table.filter(game_sessions::child_id.eq(&child_owned)),
                )
                .execute(conn)?;
                diesel::delete(daily_usage::table.filter(daily_usage::child_id.eq(&child_owned)))
                    .execute(conn)?;
                diesel::delete(
                    daily_challenges::table.filter(daily_challenges::child_id.eq(&child_owned)),
                )
                .execute(conn)?;
                diesel::delete(
                    purchased_items::table.filter(purchased_items::child_id.eq(&child_owned)),
                )
                .execute(conn)?;
                diesel::delete(
                    child_settings::table.filter(child_settings::child_id.eq(&child_owned)),
                )
                .execute(conn)?;
                let deleted = diesel::delete(
                    child_profiles::table.filter(child_profiles::id.eq(&child_owned)),
                )
                .execute(conn)?;
                Ok(deleted > 0)
            })
        })
        .await?
    }

    pub async fn child_stars(&self, child: &str) -> Result<Option<i32>, StorageError> {
        use schema::child_profiles::dsl::*;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<i32>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(child_profiles
                .filter(id.eq(&child_owned))
                .select(total_stars)
                .first::<i32>(&mut conn)
                .optional()?)
        })
        .await?
    }

    // ---- per-child settings ----

    pub async fn get_settings(&self, child: &str) -> Result<Option<ChildSettings>, StorageError> {
        use schema::child_settings::dsl::*;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<ChildSettings>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(child_settings
                .filter(child_id.eq(&child_owned))
                .first::<ChildSettings>(&mut conn)
                .optional()?)
        })
        .await?
    }

    pub async fn upsert_settings(
        &self,
        child: &str,
        daily_limit: i32,
        enabled_modules_json: &str,
        sound: bool,
        rewards: bool,
        reporting: &str,
    ) -> Result<ChildSettings, StorageError> {
        use schema::child_settings::dsl as cs;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let modules_owned = enabled_modules_json.to_string();
        let reporting_owned = reporting.to_string();
        tokio::task::spawn_blocking(move || -> Result<ChildSettings, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let row = NewChildSettings {
                child_id: &child_owned,
                daily_limit_minutes: daily_limit,
                enabled_modules: &modules_owned,
                sound_enabled: sound,
                rewards_enabled: rewards,
                reporting_level: &reporting_owned,
                updated_at: now,
            };
            diesel::insert_into(cs::child_settings)
                .values(&row)
                .on_conflict(cs::child_id)
                .do_update()
                .set((
                    cs::daily_limit_minutes.eq(row.daily_limit_minutes),
                    cs::enabled_modules.eq(row.enabled_modules),
                    cs::sound_enabled.eq(row.sound_enabled),
                    cs::rewards_enabled.eq(row.rewards_enabled),
                    cs::reporting_level.eq(row.reporting_level),
                    cs::updated_at.eq(now),
                ))
                .execute(&mut conn)?;
            Ok(cs::child_settings
                .filter(cs::child_id.eq(&child_owned))
                .first::<ChildSettings>(&mut conn)?)
        })
        .await?
    }

    // ---- usage ledger ----

    /// Atomically add one minute to the child's counter for `day` and
    /// return the new total. The row is created with one minute on the
    /// first tick of the day; the counter only ever grows.
    pub async fn tick_usage(&self, child: &str, day: NaiveDate) -> Result<i32, StorageError> {
        use schema::daily_usage::dsl as du;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        trace!(child_id = %child_owned, %day, "tick_usage");
        tokio::task::spawn_blocking(move || -> Result<i32, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<i32, StorageError> {
                let row = NewDailyUsage {
                    child_id: &child_owned,
                    day,
                    minutes_used: 1,
                };
                diesel::insert_into(du::daily_usage)
                    .values(&row)
                    .on_conflict((du::child_id, du::day))
                    .do_update()
                    .set(du::minutes_used.eq(du::minutes_used + 1))
                    .execute(conn)?;
                Ok(du::daily_usage
                    .filter(du::child_id.eq(&child_owned))
                    .filter(du::day.eq(day))
                    .select(du::minutes_used)
                    .first::<i32>(conn)?)
            })
        })
        .await?
    }

    /// Ensure a usage row exists for `day` without adding any minutes,
    /// so the day registers for the streak.
    pub async fn touch_usage(&self, child: &str, day: NaiveDate) -> Result<(), StorageError> {
        use schema::daily_usage::dsl as du;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = NewDailyUsage {
                child_id: &child_owned,
                day,
                minutes_used: 0,
            };
            diesel::insert_into(du::daily_usage)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn get_usage(&self, child: &str, day: NaiveDate) -> Result<i32, StorageError> {
        use schema::daily_usage::dsl as du;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<i32, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(du::daily_usage
                .filter(du::child_id.eq(&child_owned))
                .filter(du::day.eq(day))
                .select(du::minutes_used)
                .first::<i32>(&mut conn)
                .optional()?
                .unwrap_or(0))
        })
        .await?
    }

    /// Distinct usage dates for a child, most recent first.
    pub async fn usage_dates(&self, child: &str) -> Result<Vec<NaiveDate>, StorageError> {
        use schema::daily_usage::dsl as du;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<NaiveDate>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(du::daily_usage
                .filter(du::child_id.eq(&child_owned))
                .select(du::day)
                .order(du::day.desc())
                .load::<NaiveDate>(&mut conn)?)
        })
        .await?
    }

    // ---- parent profiles (unlock PIN) ----

    pub async fn get_parent_pin(&self, username: &str) -> Result<Option<String>, StorageError> {
        use schema::parent_profiles::dsl as pp;
        let pool = self.pool.clone();
        let user_owned = username.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<String>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let pin: Option<Option<String>> = pp::parent_profiles
                .filter(pp::username.eq(&user_owned))
                .select(pp::pin_code)
                .first::<Option<String>>(&mut conn)
                .optional()?;
            Ok(pin.flatten())
        })
        .await?
    }

    pub async fn set_parent_pin(
        &self,
        username: &str,
        pin: Option<&str>,
    ) -> Result<(), StorageError> {
        use schema::parent_profiles::dsl as pp;
        let pool = self.pool.clone();
        let user_owned = username.to_string();
        let pin_owned = pin.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let row = NewParentProfile {
                username: &user_owned,
                pin_code: pin_owned.as_deref(),
                updated_at: now,
            };
            diesel::insert_into(pp::parent_profiles)
                .values(&row)
                .on_conflict(pp::username)
                .do_update()
                .set((pp::pin_code.eq(pin_owned.as_deref()), pp::updated_at.eq(now)))
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    // ---- game sessions ----

    /// Create a game session row (score 0, no end time) and register
    /// today's usage date in the same transaction so a freshly started
    /// day immediately counts toward the streak.
    pub async fn start_game_session(
        &self,
        session_id: &str,
        child: &str,
        module: &str,
        day: NaiveDate,
    ) -> Result<GameSession, StorageError> {
        use schema::daily_usage::dsl as du;
        use schema::game_sessions::dsl as gs;
        let pool = self.pool.clone();
        let sid_owned = session_id.to_string();
        let child_owned = child.to_string();
        let module_owned = module.to_string();
        tokio::task::spawn_blocking(move || -> Result<GameSession, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<GameSession, StorageError> {
                let now = Utc::now().naive_utc();
                let row = NewGameSession {
                    id: &sid_owned,
                    child_id: &child_owned,
                    module_id: &module_owned,
                    started_at: now,
                    duration_seconds: 0,
                    score: 0,
                };
                diesel::insert_into(gs::game_sessions)
                    .values(&row)
                    .execute(conn)?;
                let usage = NewDailyUsage {
                    child_id: &child_owned,
                    day,
                    minutes_used: 0,
                };
                diesel::insert_into(du::daily_usage)
                    .values(&usage)
                    .on_conflict_do_nothing()
                    .execute(conn)?;
                Ok(gs::game_sessions
                    .filter(gs::id.eq(&sid_owned))
                    .first::<GameSession>(conn)?)
            })
        })
        .await?
    }

    pub async fn get_game_session(
        &self,
        session_id: &str,
        child: &str,
    ) -> Result<Option<GameSession>, StorageError> {
        use schema::game_sessions::dsl as gs;
        let pool = self.pool.clone();
        let sid_owned = session_id.to_string();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<GameSession>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(gs::game_sessions
                .filter(gs::id.eq(&sid_owned))
                .filter(gs::child_id.eq(&child_owned))
                .first::<GameSession>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Append one graded-interaction row. Append-only; never mutated.
    pub async fn append_answer(
        &self,
        session_id: &str,
        question_id: &str,
        answer: &str,
        correct_answer: &str,
        is_correct: bool,
        response_time_ms: i32,
    ) -> Result<(), StorageError> {
        use schema::answer_log;
        let pool = self.pool.clone();
        let sid = session_id.to_string();
        let qid = question_id.to_string();
        let ans = answer.to_string();
        let correct = correct_answer.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rec = NewAnswerLogEntry {
                session_id: &sid,
                question_id: &qid,
                answer: &ans,
                correct_answer: &correct,
                is_correct,
                response_time_ms,
            };
            diesel::insert_into(answer_log::table)
                .values(&rec)
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    /// End a session and credit stars for the score, exactly once.
    /// The UPDATE is guarded by `ended_at IS NULL`; a second call finds
    /// zero affected rows and reports [`SessionEnd::AlreadyEnded`]
    /// without touching the balance. Returns `None` for an unknown
    /// session id (or one belonging to another child).
    pub async fn finish_game_session(
        &self,
        session_id: &str,
        child: &str,
        score: i32,
        meta: Option<&str>,
    ) -> Result<Option<SessionEnd>, StorageError> {
        use schema::child_profiles::dsl as cp;
        use schema::game_sessions::dsl as gs;
        let pool = self.pool.clone();
        let sid_owned = session_id.to_string();
        let child_owned = child.to_string();
        let meta_owned = meta.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<Option<SessionEnd>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Option<SessionEnd>, StorageError> {
                let session: Option<GameSession> = gs::game_sessions
                    .filter(gs::id.eq(&sid_owned))
                    .filter(gs::child_id.eq(&child_owned))
                    .first::<GameSession>(conn)
                    .optional()?;
                let Some(session) = session else {
                    return Ok(None);
                };

                let now = Utc::now().naive_utc();
                let duration = (now - session.started_at).num_seconds().max(0) as i32;
                let updated = diesel::update(
                    gs::game_sessions
                        .filter(gs::id.eq(&sid_owned))
                        .filter(gs::ended_at.is_null()),
                )
                .set((
                    gs::ended_at.eq(Some(now)),
                    gs::duration_seconds.eq(duration),
                    gs::score.eq(score),
                    gs::meta.eq(meta_owned.as_deref()),
                ))
                .execute(conn)?;

                if updated == 0 {
                    let balance: i32 = cp::child_profiles
                        .filter(cp::id.eq(&child_owned))
                        .select(cp::total_stars)
                        .first::<i32>(conn)?;
                    return Ok(Some(SessionEnd::AlreadyEnded {
                        total_stars: balance,
                        duration_seconds: session.duration_seconds,
                    }));
                }

                let stars = stars_for_score(score).0;
                if stars > 0 {
                    diesel::update(cp::child_profiles.filter(cp::id.eq(&child_owned)))
                        .set(cp::total_stars.eq(cp::total_stars + stars))
                        .execute(conn)?;
                }
                let balance: i32 = cp::child_profiles
                    .filter(cp::id.eq(&child_owned))
                    .select(cp::total_stars)
                    .first::<i32>(conn)?;
                Ok(Some(SessionEnd::Finished {
                    stars_earned: stars,
                    total_stars: balance,
                    duration_seconds: duration,
                }))
            })
        })
        .await?
    }

    // ---- daily challenges ----

    /// Get today's challenge row, creating it with all flags false on
    /// first access of the day.
    pub async fn ensure_daily_challenge(
        &self,
        child: &str,
        day: NaiveDate,
    ) -> Result<DailyChallenge, StorageError> {
        use schema::daily_challenges::dsl as dc;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<DailyChallenge, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = NewDailyChallenge {
                child_id: &child_owned,
                challenge_date: day,
            };
            diesel::insert_into(dc::daily_challenges)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(dc::daily_challenges
                .filter(dc::child_id.eq(&child_owned))
                .filter(dc::challenge_date.eq(day))
                .first::<DailyChallenge>(&mut conn)?)
        })
        .await?
    }

    /// Flip one completion flag false→true. Idempotent: an
    /// already-true flag stays true and nothing else changes.
    pub async fn mark_challenge_task(
        &self,
        child: &str,
        day: NaiveDate,
        category: starplay_shared::domain::TaskCategory,
    ) -> Result<DailyChallenge, StorageError> {
        use schema::daily_challenges::dsl as dc;
        use starplay_shared::domain::TaskCategory;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<DailyChallenge, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<DailyChallenge, StorageError> {
                let row = NewDailyChallenge {
                    child_id: &child_owned,
                    challenge_date: day,
                };
                diesel::insert_into(dc::daily_challenges)
                    .values(&row)
                    .on_conflict_do_nothing()
                    .execute(conn)?;
                let target = dc::daily_challenges
                    .filter(dc::child_id.eq(&child_owned))
                    .filter(dc::challenge_date.eq(day));
                match category {
                    TaskCategory::Math => {
                        diesel::update(target)
                            .set(dc::math_completed.eq(true))
                            .execute(conn)?;
                    }
                    TaskCategory::Language => {
                        diesel::update(target)
                            .set(dc::language_completed.eq(true))
                            .execute(conn)?;
                    }
                    TaskCategory::Logic => {
                        diesel::update(target)
                            .set(dc::logic_completed.eq(true))
                            .execute(conn)?;
                    }
                }
                Ok(dc::daily_challenges
                    .filter(dc::child_id.eq(&child_owned))
                    .filter(dc::challenge_date.eq(day))
                    .first::<DailyChallenge>(conn)?)
            })
        })
        .await?
    }

    /// Claim the daily bonus. Reads the freshest row inside the
    /// transaction; the claimed flag can transition exactly once, and
    /// only when all three task flags are true.
    pub async fn claim_challenge_reward(
        &self,
        child: &str,
        day: NaiveDate,
    ) -> Result<ChallengeClaim, StorageError> {
        use schema::child_profiles::dsl as cp;
        use schema::daily_challenges::dsl as dc;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<ChallengeClaim, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<ChallengeClaim, StorageError> {
                let challenge: Option<DailyChallenge> = dc::daily_challenges
                    .filter(dc::child_id.eq(&child_owned))
                    .filter(dc::challenge_date.eq(day))
                    .first::<DailyChallenge>(conn)
                    .optional()?;
                let Some(challenge) = challenge else {
                    return Ok(ChallengeClaim::NotComplete);
                };
                if challenge.rewards_claimed {
                    let total = cp::child_profiles
                        .filter(cp::id.eq(&child_owned))
                        .select(cp::total_stars)
                        .first::<i32>(conn)?;
                    return Ok(ChallengeClaim::AlreadyClaimed { total_stars: total });
                }
                if !challenge.all_tasks_completed() {
                    return Ok(ChallengeClaim::NotComplete);
                }
                let updated = diesel::update(
                    dc::daily_challenges
                        .filter(dc::child_id.eq(&child_owned))
                        .filter(dc::challenge_date.eq(day))
                        .filter(dc::rewards_claimed.eq(false)),
                )
                .set(dc::rewards_claimed.eq(true))
                .execute(conn)?;
                if updated == 0 {
                    let total = cp::child_profiles
                        .filter(cp::id.eq(&child_owned))
                        .select(cp::total_stars)
                        .first::<i32>(conn)?;
                    return Ok(ChallengeClaim::AlreadyClaimed { total_stars: total });
                }
                diesel::update(cp::child_profiles.filter(cp::id.eq(&child_owned)))
                    .set(cp::total_stars.eq(cp::total_stars + DAILY_CHALLENGE_BONUS))
                    .execute(conn)?;
                let total = cp::child_profiles
                    .filter(cp::id.eq(&child_owned))
                    .select(cp::total_stars)
                    .first::<i32>(conn)?;
                Ok(ChallengeClaim::Credited {
                    bonus: DAILY_CHALLENGE_BONUS,
                    total_stars: total,
                })
            })
        })
        .await?
    }

    // ---- shop ----

    pub async fn list_shop_items(&self) -> Result<Vec<ShopItemRow>, StorageError> {
        use schema::shop_items::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<ShopItemRow>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(shop_items.order(name.asc()).load::<ShopItemRow>(&mut conn)?)
        })
        .await?
    }

    pub async fn owned_item_ids(&self, child: &str) -> Result<Vec<String>, StorageError> {
        use schema::purchased_items::dsl as pi;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(pi::purchased_items
                .filter(pi::child_id.eq(&child_owned))
                .select(pi::item_id)
                .load::<String>(&mut conn)?)
        })
        .await?
    }

    /// Debit the balance and record ownership in one transaction. The
    /// debit UPDATE carries a `total_stars >= cost` guard, so the
    /// balance can never go negative even under concurrent spenders.
    pub async fn purchase_item(
        &self,
        child: &str,
        item: &str,
    ) -> Result<PurchaseOutcome, StorageError> {
        use schema::child_profiles::dsl as cp;
        use schema::purchased_items::dsl as pi;
        use schema::shop_items::dsl as si;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let item_owned = item.to_string();
        tokio::task::spawn_blocking(move || -> Result<PurchaseOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<PurchaseOutcome, StorageError> {
                let item_row: Option<ShopItemRow> = si::shop_items
                    .filter(si::id.eq(&item_owned))
                    .first::<ShopItemRow>(conn)
                    .optional()?;
                let Some(item_row) = item_row else {
                    return Ok(PurchaseOutcome::UnknownItem);
                };
                let owned: i64 = pi::purchased_items
                    .filter(pi::child_id.eq(&child_owned))
                    .filter(pi::item_id.eq(&item_owned))
                    .count()
                    .get_result(conn)?;
                if owned > 0 {
                    return Ok(PurchaseOutcome::AlreadyOwned);
                }
                let balance: i32 = cp::child_profiles
                    .filter(cp::id.eq(&child_owned))
                    .select(cp::total_stars)
                    .first::<i32>(conn)?;
                if balance < item_row.cost {
                    return Ok(PurchaseOutcome::InsufficientStars {
                        balance,
                        cost: item_row.cost,
                    });
                }
                let updated = diesel::update(
                    cp::child_profiles
                        .filter(cp::id.eq(&child_owned))
                        .filter(cp::total_stars.ge(item_row.cost)),
                )
                .set(cp::total_stars.eq(cp::total_stars - item_row.cost))
                .execute(conn)?;
                if updated == 0 {
                    return Ok(PurchaseOutcome::InsufficientStars {
                        balance,
                        cost: item_row.cost,
                    });
                }
                let rec = NewPurchasedItem {
                    child_id: &child_owned,
                    item_id: &item_owned,
                };
                diesel::insert_into(pi::purchased_items)
                    .values(&rec)
                    .execute(conn)?;
                let total = cp::child_profiles
                    .filter(cp::id.eq(&child_owned))
                    .select(cp::total_stars)
                    .first::<i32>(conn)?;
                Ok(PurchaseOutcome::Purchased { total_stars: total })
            })
        })
        .await?
    }

    /// Put an owned cosmetic into its category's equip slot. Balance is
    /// never touched by equipping.
    pub async fn equip_item(&self, child: &str, item: &str) -> Result<EquipOutcome, StorageError> {
        use schema::child_profiles::dsl as cp;
        use schema::purchased_items::dsl as pi;
        use schema::shop_items::dsl as si;
        let pool = self.pool.clone();
        let child_owned = child.to_string();
        let item_owned = item.to_string();
        tokio::task::spawn_blocking(move || -> Result<EquipOutcome, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let item_row: Option<ShopItemRow> = si::shop_items
                .filter(si::id.eq(&item_owned))
                .first::<ShopItemRow>(&mut conn)
                .optional()?;
            let Some(item_row) = item_row else {
                return Ok(EquipOutcome::UnknownItem);
            };
            let owned: i64 = pi::purchased_items
                .filter(pi::child_id.eq(&child_owned))
                .filter(pi::item_id.eq(&item_owned))
                .count()
                .get_result(&mut conn)?;
            if owned == 0 {
                return Ok(EquipOutcome::NotOwned);
            }
            let target = cp::child_profiles.filter(cp::id.eq(&child_owned));
            match item_row.category.as_str() {
                "helmet" => {
                    diesel::update(target)
                        .set(cp::equipped_helmet.eq(Some(item_row.asset_url.as_str())))
                        .execute(&mut conn)?;
                }
                "suit" => {
                    diesel::update(target)
                        .set(cp::equipped_suit.eq(Some(item_row.asset_url.as_str())))
                        .execute(&mut conn)?;
                }
                "pet" => {
                    diesel::update(target)
                        .set(cp::equipped_pet.eq(Some(item_row.asset_url.as_str())))
                        .execute(&mut conn)?;
                }
                "background" => {
                    diesel::update(target)
                        .set(cp::equipped_background.eq(Some(item_row.asset_url.as_str())))
                        .execute(&mut conn)?;
                }
                other => {
                    return Err(StorageError::InvalidInput(format!(
                        "unknown item category in catalog: {}",
                        other
                    )));
                }
            }
            Ok(EquipOutcome::Equipped)
        })
        .await?
    }

    // ---- auth session helpers for JWT inactivity windows ----

    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let u = username_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_session(&self, jti_: &str) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let deleted = diesel::delete(sessions.filter(jti.eq(&j))).execute(&mut conn)?;
            Ok(deleted > 0)
        })
        .await?
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    ///
    /// This combines the idle timeout check and the `last_used_at` update into
    /// a single atomic UPDATE, eliminating the race condition between checking
    /// and updating the session.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
