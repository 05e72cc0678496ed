mod acl;
pub mod auth;
mod config;

use std::sync::Arc;

use crate::server::auth::AuthCtx;
use crate::session::{
    DEFAULT_DAILY_LIMIT_MINUTES, Supervisor, day, ledger::StarLedger, lock, module_allowed, streak,
};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::{Method, StatusCode, header},
    routing::{delete, get, post, put},
};
use bcrypt::verify;
use chrono_tz::Tz;
pub use config::{AppConfig, ConfigError, UserConfig};
use mime_guess::from_path;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use starplay_shared::api;
use starplay_shared::auth::Role;
use starplay_shared::domain::{AgeBand, TaskCategory};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

const DEFAULT_AVATAR: &str = "astro-1";
const DEFAULT_REPORTING_LEVEL: &str = "simple";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: crate::storage::Store,
    pub supervisor: Arc<Supervisor>,
    pub ledger: Arc<StarLedger>,
    tz: Tz,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Result<Self, ConfigError> {
        let tz = config.timezone()?;
        let shutdown = CancellationToken::new();
        let supervisor = Arc::new(Supervisor::new(
            store.clone(),
            tz,
            config.heartbeat_interval(),
            shutdown.clone(),
        ));
        let ledger = Arc::new(StarLedger::new(store.clone()));
        Ok(Self {
            config: Arc::new(config),
            store,
            supervisor,
            ledger,
            tz,
            shutdown,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let scope = api::tenant_scope(&state.config.tenant_id);
    let private = Router::new()
        .route(&format!("{scope}/children"), get(api_list_children))
        .route(&format!("{scope}/children"), post(api_create_child))
        .route(&format!("{scope}/children/{{id}}"), get(api_get_child))
        .route(
            &format!("{scope}/children/{{id}}"),
            delete(api_delete_child),
        )
        .route(
            &format!("{scope}/children/{{id}}/settings"),
            get(api_get_settings).put(api_put_settings),
        )
        .route(
            &format!("{scope}/children/{{id}}/select"),
            post(api_select_child),
        )
        .route(
            &format!("{scope}/children/{{id}}/deselect"),
            post(api_deselect_child),
        )
        .route(
            &format!("{scope}/children/{{id}}/session"),
            get(api_session_state),
        )
        .route(&format!("{scope}/children/{{id}}/unlock"), post(api_unlock))
        .route(&format!("{scope}/children/{{id}}/streak"), get(api_streak))
        .route(
            &format!("{scope}/children/{{id}}/challenge"),
            get(api_get_challenge),
        )
        .route(
            &format!("{scope}/children/{{id}}/challenge/{{category}}/complete"),
            post(api_complete_challenge_task),
        )
        .route(
            &format!("{scope}/children/{{id}}/challenge/claim"),
            post(api_claim_challenge),
        )
        .route(
            &format!("{scope}/children/{{id}}/sessions"),
            post(api_start_game_session),
        )
        .route(
            &format!("{scope}/children/{{id}}/sessions/{{sid}}/answers"),
            post(api_record_answer),
        )
        .route(
            &format!("{scope}/children/{{id}}/sessions/{{sid}}/end"),
            post(api_end_game_session),
        )
        .route(&format!("{scope}/shop/items"), get(api_list_shop_items))
        .route(
            &format!("{scope}/children/{{id}}/items"),
            get(api_owned_items),
        )
        .route(
            &format!("{scope}/children/{{id}}/purchase"),
            post(api_purchase),
        )
        .route(&format!("{scope}/children/{{id}}/equip"), post(api_equip))
        .route(&format!("{scope}/parent/pin"), put(api_set_parent_pin))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            acl::enforce_acl,
        ))
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Logout sits outside the tenant scope, so it gets bearer auth
    // without the ACL.
    let session_only = Router::new()
        .route("/api/v1/auth/logout", post(api_auth_logout))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            child_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(private)
        .merge(session_only)
        .fallback(get(serve_embedded))
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS; harmless otherwise
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") || path == "/api" {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            HeaderName::from_static("expires"),
            HeaderValue::from_static("0"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(&auth.claims.role));
        if let Some(cid) = &auth.claims.child_id {
            span.record("child_id", tracing::field::display(cid));
        }
    }
    Ok(next.run(req).await)
}

fn child_dto(c: crate::storage::models::ChildProfile) -> api::ChildDto {
    api::ChildDto {
        id: c.id,
        display_name: c.display_name,
        age_band: c.age_band,
        avatar_id: c.avatar_id,
        total_stars: c.total_stars,
        equipped: api::EquippedDto {
            helmet: c.equipped_helmet,
            suit: c.equipped_suit,
            pet: c.equipped_pet,
            background: c.equipped_background,
        },
    }
}

async fn api_list_children(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ChildDto>>, AppError> {
    // ACL enforced by middleware
    let rows = state
        .store
        .list_children()
        .await
        .map_err(AppError::internal)?;
    Ok(Json(rows.into_iter().map(child_dto).collect()))
}

async fn api_create_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateChildReq>,
) -> Result<(StatusCode, Json<api::ChildDto>), AppError> {
    let name = body.display_name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("display_name cannot be empty"));
    }
    body.age_band
        .parse::<AgeBand>()
        .map_err(AppError::bad_request)?;

    // Derive a stable id from the name; disambiguate on collision.
    let mut id = slug::slugify(name);
    if id.is_empty() {
        id = Uuid::new_v4().to_string();
    }
    if state
        .store
        .child_exists(&id)
        .await
        .map_err(AppError::internal)?
    {
        let suffix = Uuid::new_v4().to_string();
        id = format!("{}-{}", id, &suffix[..8]);
    }

    let avatar = body.avatar_id.as_deref().unwrap_or(DEFAULT_AVATAR);
    let row = state
        .store
        .create_child(&id, &auth.claims.sub, name, &body.age_band, avatar)
        .await
        .map_err(AppError::internal)?;
    Ok((StatusCode::CREATED, Json(child_dto(row))))
}

async fn api_get_child(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::ChildDto>, AppError> {
    let row = state
        .store
        .get_child(&id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("child not found: {}", id)))?;
    Ok(Json(child_dto(row)))
}

async fn api_delete_child(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .store
        .delete_child_cascade(&id)
        .await
        .map_err(AppError::internal)?;
    if !deleted {
        return Err(AppError::not_found(format!("child not found: {}", id)));
    }
    state.supervisor.evict_child(&id).await;
    state.ledger.forget_child(&id).await;
    Ok(StatusCode::NO_CONTENT)
}

fn default_settings() -> api::SettingsDto {
    api::SettingsDto {
        daily_limit_minutes: DEFAULT_DAILY_LIMIT_MINUTES,
        enabled_modules: Vec::new(),
        sound_enabled: true,
        rewards_enabled: true,
        reporting_level: DEFAULT_REPORTING_LEVEL.to_string(),
    }
}

fn settings_dto(row: crate::storage::models::ChildSettings) -> Result<api::SettingsDto, AppError> {
    let modules: Vec<String> =
        serde_json::from_str(&row.enabled_modules).map_err(AppError::internal)?;
    Ok(api::SettingsDto {
        daily_limit_minutes: row.daily_limit_minutes,
        enabled_modules: modules,
        sound_enabled: row.sound_enabled,
        rewards_enabled: row.rewards_enabled,
        reporting_level: row.reporting_level,
    })
}

async fn api_get_settings(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::SettingsDto>, AppError> {
    ensure_child_exists(&state, &id).await?;
    let dto = match state
        .store
        .get_settings(&id)
        .await
        .map_err(AppError::internal)?
    {
        Some(row) => settings_dto(row)?,
        None => default_settings(),
    };
    Ok(Json(dto))
}

async fn api_put_settings(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::SettingsDto>,
) -> Result<Json<api::SettingsDto>, AppError> {
    ensure_child_exists(&state, &id).await?;
    let limit = body.daily_limit_minutes;
    if !(10..=120).contains(&limit) || limit % 5 != 0 {
        return Err(AppError::bad_request(
            "daily_limit_minutes must be between 10 and 120 in steps of 5",
        ));
    }
    if body.reporting_level != "simple" && body.reporting_level != "detailed" {
        return Err(AppError::bad_request(
            "reporting_level must be \"simple\" or \"detailed\"",
        ));
    }
    let modules_json = serde_json::to_string(&body.enabled_modules).map_err(AppError::internal)?;
    let row = state
        .store
        .upsert_settings(
            &id,
            limit,
            &modules_json,
            body.sound_enabled,
            body.rewards_enabled,
            &body.reporting_level,
        )
        .await
        .map_err(AppError::internal)?;
    // A lowered limit must lock a running session right away.
    state.supervisor.apply_limit_change(&id, limit).await;
    Ok(Json(settings_dto(row)?))
}

async fn api_select_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::SessionStateDto>, AppError> {
    ensure_child_exists(&state, &id).await?;
    let gate = state
        .supervisor
        .select(&auth.claims.sub, &id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(session_state_from_gate(&id, &gate)))
}

async fn api_deselect_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.supervisor.deselect(&auth.claims.sub, Some(&id)).await;
    Ok(StatusCode::NO_CONTENT)
}

fn session_state_from_gate(child_id: &str, gate: &lock::LockGate) -> api::SessionStateDto {
    api::SessionStateDto {
        child_id: child_id.to_string(),
        minutes_used: gate.minutes_used(),
        daily_limit_minutes: gate.daily_limit(),
        locked: gate.is_locked(),
        temporarily_unlocked: gate.temporarily_unlocked(),
    }
}

async fn api_session_state(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::SessionStateDto>, AppError> {
    ensure_child_exists(&state, &id).await?;
    if let Some(gate) = state.supervisor.gate(&auth.claims.sub, &id).await {
        return Ok(Json(session_state_from_gate(&id, &gate)));
    }
    // No live session for this user; derive from stored state. A
    // temporary unlock never survives deselection.
    let today = day::today(state.tz);
    let used = state
        .store
        .get_usage(&id, today)
        .await
        .map_err(AppError::internal)?;
    let limit = match state
        .store
        .get_settings(&id)
        .await
        .map_err(AppError::internal)?
    {
        Some(s) => s.daily_limit_minutes,
        None => DEFAULT_DAILY_LIMIT_MINUTES,
    };
    let locked = lock::derive_lock_state(used, limit, false).is_locked();
    Ok(Json(api::SessionStateDto {
        child_id: id,
        minutes_used: used,
        daily_limit_minutes: limit,
        locked,
        temporarily_unlocked: false,
    }))
}

async fn api_unlock(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::UnlockReq>,
) -> Result<Json<api::SessionStateDto>, AppError> {
    let child = state
        .store
        .get_child(&id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("child not found: {}", id)))?;
    let gate = state
        .supervisor
        .gate(&auth.claims.sub, &id)
        .await
        .ok_or_else(|| AppError::conflict("no active session for this child"))?;

    // No PIN configured means the household opted out of the lock.
    if let Some(hash) = state
        .store
        .get_parent_pin(&child.parent_username)
        .await
        .map_err(AppError::internal)?
    {
        let ok = verify(&body.pin, &hash).map_err(AppError::internal)?;
        if !ok {
            tracing::warn!(child_id = %id, username = %auth.claims.sub, "unlock: wrong PIN");
            return Err(AppError::forbidden());
        }
    }
    gate.grant_temporary_unlock();
    tracing::info!(child_id = %id, username = %auth.claims.sub, "temporary unlock granted");
    Ok(Json(session_state_from_gate(&id, &gate)))
}

async fn api_streak(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::StreakDto>, AppError> {
    ensure_child_exists(&state, &id).await?;
    let dates = state
        .store
        .usage_dates(&id)
        .await
        .map_err(AppError::internal)?;
    let set = dates.into_iter().collect();
    let days = streak::current_streak(&set, day::today(state.tz));
    Ok(Json(api::StreakDto { child_id: id, days }))
}

fn challenge_dto(row: crate::storage::models::DailyChallenge) -> api::ChallengeDto {
    api::ChallengeDto {
        child_id: row.child_id,
        challenge_date: row.challenge_date.format("%Y-%m-%d").to_string(),
        math_completed: row.math_completed,
        language_completed: row.language_completed,
        logic_completed: row.logic_completed,
        rewards_claimed: row.rewards_claimed,
    }
}

async fn api_get_challenge(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::ChallengeDto>, AppError> {
    ensure_child_exists(&state, &id).await?;
    let row = state
        .store
        .ensure_daily_challenge(&id, day::today(state.tz))
        .await
        .map_err(AppError::internal)?;
    Ok(Json(challenge_dto(row)))
}

#[derive(Deserialize)]
struct ChallengePath {
    id: String,
    category: String,
}

async fn api_complete_challenge_task(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChallengePath>,
) -> Result<Json<api::ChallengeDto>, AppError> {
    ensure_child_exists(&state, &p.id).await?;
    let category = p
        .category
        .parse::<TaskCategory>()
        .map_err(AppError::bad_request)?;
    let row = state
        .store
        .mark_challenge_task(&p.id, day::today(state.tz), category)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(challenge_dto(row)))
}

async fn api_claim_challenge(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::ClaimResp>, AppError> {
    ensure_child_exists(&state, &id).await?;
    use crate::storage::ChallengeClaim;
    let resp = match state
        .ledger
        .claim_daily_bonus(&id, day::today(state.tz))
        .await
        .map_err(AppError::internal)?
    {
        ChallengeClaim::Credited { bonus, total_stars } => api::ClaimResp {
            outcome: api::ClaimOutcome::Credited,
            bonus_stars: bonus,
            total_stars,
        },
        ChallengeClaim::NotComplete => {
            let total = state
                .store
                .child_stars(&id)
                .await
                .map_err(AppError::internal)?
                .unwrap_or(0);
            api::ClaimResp {
                outcome: api::ClaimOutcome::NotComplete,
                bonus_stars: 0,
                total_stars: total,
            }
        }
        ChallengeClaim::AlreadyClaimed { total_stars } => api::ClaimResp {
            outcome: api::ClaimOutcome::AlreadyClaimed,
            bonus_stars: 0,
            total_stars,
        },
    };
    Ok(Json(resp))
}

async fn api_start_game_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::StartSessionReq>,
) -> Result<Json<api::StartSessionResp>, AppError> {
    ensure_child_exists(&state, &id).await?;
    let gate = state
        .supervisor
        .gate(&auth.claims.sub, &id)
        .await
        .ok_or_else(|| AppError::conflict("no active session for this child"))?;
    if gate.is_locked() {
        return Err(AppError::locked("daily play time is used up"));
    }
    if let Some(settings) = state
        .store
        .get_settings(&id)
        .await
        .map_err(AppError::internal)?
    {
        let enabled: Vec<String> =
            serde_json::from_str(&settings.enabled_modules).map_err(AppError::internal)?;
        if !module_allowed(&enabled, &body.module_id) {
            return Err(AppError::forbidden());
        }
    }

    let session_id = Uuid::new_v4().to_string();
    state
        .store
        .start_game_session(&session_id, &id, &body.module_id, day::today(state.tz))
        .await
        .map_err(AppError::internal)?;
    Ok(Json(api::StartSessionResp { session_id }))
}

#[derive(Deserialize)]
struct GameSessionPath {
    id: String,
    sid: String,
}

async fn api_record_answer(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<GameSessionPath>,
    Json(body): Json<api::AnswerReq>,
) -> Result<StatusCode, AppError> {
    let session = state
        .store
        .get_game_session(&p.sid, &p.id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("session not found: {}", p.sid)))?;

    // Answer logging is best-effort telemetry; a write failure must
    // never interrupt play.
    if let Err(e) = state
        .store
        .append_answer(
            &session.id,
            &body.question_id,
            &body.answer,
            &body.correct_answer,
            body.is_correct,
            body.response_time_ms,
        )
        .await
    {
        tracing::warn!(session_id = %session.id, error = %e, "answer log write failed");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn api_end_game_session(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<GameSessionPath>,
    Json(body): Json<api::EndSessionReq>,
) -> Result<Json<api::EndSessionResp>, AppError> {
    let meta = match &body.meta {
        Some(v) => Some(serde_json::to_string(v).map_err(AppError::internal)?),
        None => None,
    };
    use crate::storage::SessionEnd;
    let outcome = state
        .ledger
        .settle_session(&p.sid, &p.id, body.score, meta.as_deref())
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("session not found: {}", p.sid)))?;
    let resp = match outcome {
        SessionEnd::Finished {
            stars_earned,
            total_stars,
            duration_seconds,
        } => api::EndSessionResp {
            stars_earned,
            total_stars,
            duration_seconds,
        },
        SessionEnd::AlreadyEnded {
            total_stars,
            duration_seconds,
        } => api::EndSessionResp {
            stars_earned: 0,
            total_stars,
            duration_seconds,
        },
    };
    Ok(Json(resp))
}

async fn api_list_shop_items(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::ShopItemDto>>, AppError> {
    let rows = state
        .store
        .list_shop_items()
        .await
        .map_err(AppError::internal)?;
    let items = rows
        .into_iter()
        .map(|r| api::ShopItemDto {
            id: r.id,
            name: r.name,
            category: r.category,
            cost: r.cost,
            asset_url: r.asset_url,
        })
        .collect();
    Ok(Json(items))
}

async fn api_owned_items(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<api::OwnedItemsDto>, AppError> {
    ensure_child_exists(&state, &id).await?;
    let item_ids = state
        .store
        .owned_item_ids(&id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(api::OwnedItemsDto { item_ids }))
}

async fn api_purchase(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::PurchaseReq>,
) -> Result<Json<api::PurchaseResp>, AppError> {
    ensure_child_exists(&state, &id).await?;
    use crate::storage::PurchaseOutcome;
    match state
        .ledger
        .purchase(&id, &body.item_id)
        .await
        .map_err(AppError::internal)?
    {
        PurchaseOutcome::Purchased { total_stars } => Ok(Json(api::PurchaseResp { total_stars })),
        PurchaseOutcome::InsufficientStars { balance, cost } => Err(AppError::conflict(format!(
            "not enough stars: have {}, need {}",
            balance, cost
        ))),
        PurchaseOutcome::AlreadyOwned => Err(AppError::conflict("item already owned")),
        PurchaseOutcome::UnknownItem => Err(AppError::not_found(format!(
            "item not found: {}",
            body.item_id
        ))),
    }
}

async fn api_equip(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<api::EquipReq>,
) -> Result<StatusCode, AppError> {
    ensure_child_exists(&state, &id).await?;
    use crate::storage::EquipOutcome;
    match state
        .store
        .equip_item(&id, &body.item_id)
        .await
        .map_err(AppError::internal)?
    {
        EquipOutcome::Equipped => Ok(StatusCode::NO_CONTENT),
        EquipOutcome::NotOwned => Err(AppError::conflict("item not owned")),
        EquipOutcome::UnknownItem => Err(AppError::not_found(format!(
            "item not found: {}",
            body.item_id
        ))),
    }
}

async fn api_set_parent_pin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::PinReq>,
) -> Result<StatusCode, AppError> {
    let hash = match &body.pin {
        None => None,
        Some(pin) => {
            if pin.len() != 4 || !pin.chars().all(|c| c.is_ascii_digit()) {
                return Err(AppError::bad_request("pin must be exactly 4 digits"));
            }
            Some(bcrypt::hash(pin, bcrypt::DEFAULT_COST).map_err(AppError::internal)?)
        }
    };
    state
        .store
        .set_parent_pin(&auth.claims.sub, hash.as_deref())
        .await
        .map_err(AppError::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_child_exists(state: &AppState, id: &str) -> Result<(), AppError> {
    let exists = state
        .store
        .child_exists(id)
        .await
        .map_err(AppError::internal)?;
    if exists {
        Ok(())
    } else {
        Err(AppError::not_found(format!("child not found: {}", id)))
    }
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    // Find user in config
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    if user.role == Role::Child && user.child_id.is_none() {
        tracing::error!(username=%body.username, "login: child user missing child_id in config");
        return Err(AppError::internal("child user missing child_id"));
    }
    let token = auth::issue_jwt_for_user(
        &state,
        &user.username,
        user.role,
        user.child_id.clone(),
        &state.config.tenant_id,
    )
    .await?;
    Ok(Json(api::AuthResp { token }))
}

async fn api_auth_logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .delete_session(&auth.claims.jti)
        .await
        .map_err(AppError::internal)?;
    state.supervisor.deselect(&auth.claims.sub, None).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    Locked(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }
    fn locked<T: Into<String>>(msg: T) -> Self {
        Self::Locked(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            AppError::Locked(m) => (StatusCode::LOCKED, m, "locked", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}

#[derive(RustEmbed)]
#[folder = "../starplay-web/dist/"]
struct WebAssets;

async fn serve_embedded(
    uri: axum::http::Uri,
) -> Result<axum::response::Response, (StatusCode, String)> {
    let path = uri.path().trim_start_matches('/');
    let candidate = if path.is_empty() { "index.html" } else { path };
    let asset = WebAssets::get(candidate)
        .or_else(|| WebAssets::get("index.html"))
        .ok_or((StatusCode::NOT_FOUND, "asset not found".to_string()))?;

    let bytes = asset.data.into_owned();
    let mime = from_path(candidate).first_or_octet_stream();

    let mut resp = axum::response::Response::new(axum::body::Body::from(bytes));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_str(mime.as_ref())
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );
    Ok(resp)
}
