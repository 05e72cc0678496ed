use axum::http::StatusCode;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use starplay_server::{server, storage};
use starplay_shared::auth::Role;
use starplay_shared::domain::{ItemCategory, ShopItem};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

const LOGIN_PATH: &str = "/api/v1/auth/login";
const TENANT_ID: &str = "test-family";

struct TestServer {
    base: String,
    client: Client,
    store: storage::Store,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, store, handle) = match start_server(&db_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            store,
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = self
            .request_expect(
                "POST",
                LOGIN_PATH,
                None,
                Some(json!({"username": username, "password": password})),
                StatusCode::OK,
            )
            .await;
        body.get("token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            "DELETE" => self.client.delete(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        value
    }

    /// Burn `minutes` of today's allowance directly through the store.
    async fn seed_usage(&self, child_id: &str, minutes: i32) {
        let today = Utc::now().date_naive();
        for _ in 0..minutes {
            self.store.tick_usage(child_id, today).await.unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
) -> Result<(SocketAddr, storage::Store, tokio::task::JoinHandle<()>), std::io::Error> {
    let parent_pwd = "secret123";
    let child_pwd = "kidpass";
    let parent_hash = bcrypt::hash(parent_pwd, bcrypt::DEFAULT_COST).unwrap();
    let child_hash = bcrypt::hash(child_pwd, bcrypt::DEFAULT_COST).unwrap();
    let config = server::AppConfig {
        tenant_id: TENANT_ID.into(),
        jwt_secret: "testsecret".into(),
        users: vec![
            server::UserConfig {
                username: "parent".into(),
                password_hash: parent_hash,
                role: Role::Parent,
                child_id: None,
            },
            server::UserConfig {
                username: "alice".into(),
                password_hash: child_hash,
                role: Role::Child,
                child_id: Some("alice".into()),
            },
        ],
        shop_items: vec![
            ShopItem {
                id: "helmet-gold".into(),
                name: "Gold Helmet".into(),
                category: ItemCategory::Helmet,
                cost: 40,
                asset_url: "/assets/helmet-gold.png".into(),
            },
            ShopItem {
                id: "pet-comet".into(),
                name: "Comet".into(),
                category: ItemCategory::Pet,
                cost: 10,
                asset_url: "/assets/pet-comet.png".into(),
            },
        ],
        timezone: None,
        heartbeat_interval_secs: Some(1),
        dev_cors_origin: None,
        listen_port: None,
    };

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");
    store.seed_shop_items(&config.shop_items).await.expect("seed");

    let state = server::AppState::new(config, store.clone()).expect("state");
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, store, handle))
}

fn tenant_path(suffix: &str) -> String {
    format!(
        "{}/{}",
        starplay_shared::api::tenant_scope(TENANT_ID),
        suffix.trim_start_matches('/')
    )
}

/// Create the child profile "alice" through the parent account so the
/// preconfigured child login can use it.
async fn create_alice(server: &TestServer, parent_token: &str) {
    let created = server
        .request_expect(
            "POST",
            &tenant_path("children"),
            Some(parent_token),
            Some(json!({"display_name": "Alice", "age_band": "6-7"})),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(created.get("id").and_then(|v| v.as_str()).unwrap(), "alice");
}

#[tokio::test]
async fn public_endpoints_work() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    server
        .request_expect("GET", "/healthz", None, None, StatusCode::OK)
        .await;
    let token = server.login("parent", "secret123").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let cases: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", tenant_path("children"), None),
        (
            "POST",
            tenant_path("children"),
            Some(json!({"display_name": "X", "age_band": "6-7"})),
        ),
        ("GET", tenant_path("children/alice/session"), None),
        (
            "POST",
            tenant_path("children/alice/unlock"),
            Some(json!({"pin": "1234"})),
        ),
        ("GET", tenant_path("children/alice/streak"), None),
        ("GET", tenant_path("shop/items"), None),
        ("PUT", tenant_path("parent/pin"), Some(json!({"pin": "1234"}))),
    ];

    for (method, path, body) in cases.iter() {
        server
            .request_expect(method, path, None, body.clone(), StatusCode::UNAUTHORIZED)
            .await;
    }
}

#[tokio::test]
async fn parent_manages_children_and_settings() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;

    let children = server
        .request_expect(
            "GET",
            &tenant_path("children"),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(
        children
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c.get("id").unwrap() == "alice")
    );

    // Settings fall back to defaults until saved
    let settings = server
        .request_expect(
            "GET",
            &tenant_path("children/alice/settings"),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        settings
            .get("daily_limit_minutes")
            .and_then(|v| v.as_i64())
            .unwrap(),
        30
    );
    assert!(
        settings
            .get("enabled_modules")
            .and_then(|v| v.as_array())
            .unwrap()
            .is_empty()
    );

    // Limit outside the allowed grid is rejected
    server
        .request_expect(
            "PUT",
            &tenant_path("children/alice/settings"),
            Some(&parent_token),
            Some(json!({
                "daily_limit_minutes": 17,
                "enabled_modules": [],
                "sound_enabled": true,
                "rewards_enabled": true,
                "reporting_level": "simple"
            })),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let saved = server
        .request_expect(
            "PUT",
            &tenant_path("children/alice/settings"),
            Some(&parent_token),
            Some(json!({
                "daily_limit_minutes": 20,
                "enabled_modules": ["math-race"],
                "sound_enabled": false,
                "rewards_enabled": true,
                "reporting_level": "detailed"
            })),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        saved
            .get("daily_limit_minutes")
            .and_then(|v| v.as_i64())
            .unwrap(),
        20
    );

    // Unknown age band is rejected
    server
        .request_expect(
            "POST",
            &tenant_path("children"),
            Some(&parent_token),
            Some(json!({"display_name": "Rex", "age_band": "12"})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    server
        .request_expect(
            "DELETE",
            &tenant_path("children/alice"),
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "GET",
            &tenant_path("children/alice"),
            Some(&parent_token),
            None,
            StatusCode::NOT_FOUND,
        )
        .await;
}

#[tokio::test]
async fn game_session_flow_credits_stars() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;
    let child_token = server.login("alice", "kidpass").await;

    // Starting a game without an active selection is refused
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions"),
            Some(&child_token),
            Some(json!({"module_id": "math-race"})),
            StatusCode::CONFLICT,
        )
        .await;

    let state = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/select"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(state.get("locked").and_then(|v| v.as_bool()).unwrap(), false);

    let started = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions"),
            Some(&child_token),
            Some(json!({"module_id": "math-race"})),
            StatusCode::OK,
        )
        .await;
    let session_id = started
        .get("session_id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    server
        .request_expect(
            "POST",
            &tenant_path(&format!("children/alice/sessions/{session_id}/answers")),
            Some(&child_token),
            Some(json!({
                "question_id": "q1",
                "answer": "7",
                "correct_answer": "7",
                "is_correct": true,
                "response_time_ms": 1500
            })),
            StatusCode::NO_CONTENT,
        )
        .await;

    // Unknown session id
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions/nope/answers"),
            Some(&child_token),
            Some(json!({
                "question_id": "q1",
                "answer": "7",
                "correct_answer": "7",
                "is_correct": true,
                "response_time_ms": 1500
            })),
            StatusCode::NOT_FOUND,
        )
        .await;

    // Score 17 rounds up to 4 stars
    let ended = server
        .request_expect(
            "POST",
            &tenant_path(&format!("children/alice/sessions/{session_id}/end")),
            Some(&child_token),
            Some(json!({"score": 17})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(ended.get("stars_earned").and_then(|v| v.as_i64()).unwrap(), 4);
    assert_eq!(ended.get("total_stars").and_then(|v| v.as_i64()).unwrap(), 4);

    // Ending again credits nothing
    let ended_again = server
        .request_expect(
            "POST",
            &tenant_path(&format!("children/alice/sessions/{session_id}/end")),
            Some(&child_token),
            Some(json!({"score": 17})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        ended_again
            .get("stars_earned")
            .and_then(|v| v.as_i64())
            .unwrap(),
        0
    );
    assert_eq!(
        ended_again
            .get("total_stars")
            .and_then(|v| v.as_i64())
            .unwrap(),
        4
    );
}

#[tokio::test]
async fn module_restrictions_apply_when_configured() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;
    let child_token = server.login("alice", "kidpass").await;

    server
        .request_expect(
            "PUT",
            &tenant_path("children/alice/settings"),
            Some(&parent_token),
            Some(json!({
                "daily_limit_minutes": 30,
                "enabled_modules": ["math-race"],
                "sound_enabled": true,
                "rewards_enabled": true,
                "reporting_level": "simple"
            })),
            StatusCode::OK,
        )
        .await;

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/select"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions"),
            Some(&child_token),
            Some(json!({"module_id": "word-hunt"})),
            StatusCode::FORBIDDEN,
        )
        .await;
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions"),
            Some(&child_token),
            Some(json!({"module_id": "math-race"})),
            StatusCode::OK,
        )
        .await;
}

#[tokio::test]
async fn lock_and_pin_unlock_flow() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;
    let child_token = server.login("alice", "kidpass").await;

    server
        .request_expect(
            "PUT",
            &tenant_path("children/alice/settings"),
            Some(&parent_token),
            Some(json!({
                "daily_limit_minutes": 10,
                "enabled_modules": [],
                "sound_enabled": true,
                "rewards_enabled": true,
                "reporting_level": "simple"
            })),
            StatusCode::OK,
        )
        .await;
    server.seed_usage("alice", 10).await;

    let state = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/select"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(state.get("locked").and_then(|v| v.as_bool()).unwrap(), true);

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions"),
            Some(&child_token),
            Some(json!({"module_id": "math-race"})),
            StatusCode::LOCKED,
        )
        .await;

    // No PIN configured: unlock is granted without a matching code
    let unlocked = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/unlock"),
            Some(&child_token),
            Some(json!({"pin": "0000"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        unlocked.get("locked").and_then(|v| v.as_bool()).unwrap(),
        false
    );
    assert_eq!(
        unlocked
            .get("temporarily_unlocked")
            .and_then(|v| v.as_bool())
            .unwrap(),
        true
    );

    // Parent sets a PIN; re-selecting drops the temporary unlock
    server
        .request_expect(
            "PUT",
            &tenant_path("parent/pin"),
            Some(&parent_token),
            Some(json!({"pin": "4321"})),
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "PUT",
            &tenant_path("parent/pin"),
            Some(&parent_token),
            Some(json!({"pin": "12ab"})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    let reselected = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/select"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        reselected.get("locked").and_then(|v| v.as_bool()).unwrap(),
        true
    );
    assert_eq!(
        reselected
            .get("temporarily_unlocked")
            .and_then(|v| v.as_bool())
            .unwrap(),
        false
    );

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/unlock"),
            Some(&child_token),
            Some(json!({"pin": "1111"})),
            StatusCode::FORBIDDEN,
        )
        .await;
    let unlocked = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/unlock"),
            Some(&child_token),
            Some(json!({"pin": "4321"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        unlocked.get("locked").and_then(|v| v.as_bool()).unwrap(),
        false
    );

    // The override reopens the gate for gameplay, not just the status
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions"),
            Some(&child_token),
            Some(json!({"module_id": "math-race"})),
            StatusCode::OK,
        )
        .await;

    // Unlock needs an active selection
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/deselect"),
            Some(&child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/unlock"),
            Some(&child_token),
            Some(json!({"pin": "4321"})),
            StatusCode::CONFLICT,
        )
        .await;
}

#[tokio::test]
async fn heartbeat_accrues_minutes_until_locked() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;
    let child_token = server.login("alice", "kidpass").await;

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/select"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;

    // heartbeat_interval_secs is 1 in the test config
    tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
    let state = server
        .request_expect(
            "GET",
            &tenant_path("children/alice/session"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let used = state
        .get("minutes_used")
        .and_then(|v| v.as_i64())
        .unwrap();
    assert!(used >= 2, "expected at least 2 accrued minutes, got {used}");

    // Once the gate is locked, ticks stop accruing
    server.seed_usage("alice", 30).await;
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/select"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let before = server
        .request_expect(
            "GET",
            &tenant_path("children/alice/session"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(before.get("locked").and_then(|v| v.as_bool()).unwrap(), true);
    let before_used = before.get("minutes_used").and_then(|v| v.as_i64()).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1800)).await;
    let after = server
        .request_expect(
            "GET",
            &tenant_path("children/alice/session"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        after.get("minutes_used").and_then(|v| v.as_i64()).unwrap(),
        before_used
    );
}

#[tokio::test]
async fn streak_counts_consecutive_days() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;

    let today = Utc::now().date_naive();
    for offset in 0..3 {
        server
            .store
            .tick_usage("alice", today - Duration::days(offset))
            .await
            .unwrap();
    }
    // A gap further back must not count
    server
        .store
        .tick_usage("alice", today - Duration::days(5))
        .await
        .unwrap();

    let streak = server
        .request_expect(
            "GET",
            &tenant_path("children/alice/streak"),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(streak.get("days").and_then(|v| v.as_i64()).unwrap(), 3);
}

#[tokio::test]
async fn daily_challenge_claims_once() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;
    let child_token = server.login("alice", "kidpass").await;

    let challenge = server
        .request_expect(
            "GET",
            &tenant_path("children/alice/challenge"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        challenge
            .get("math_completed")
            .and_then(|v| v.as_bool())
            .unwrap(),
        false
    );

    for category in ["math", "language"] {
        server
            .request_expect(
                "POST",
                &tenant_path(&format!("children/alice/challenge/{category}/complete")),
                Some(&child_token),
                None,
                StatusCode::OK,
            )
            .await;
    }

    let early = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/challenge/claim"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        early.get("outcome").and_then(|v| v.as_str()).unwrap(),
        "not_complete"
    );

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/challenge/math/complete"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await; // marking twice is idempotent
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/challenge/logic/complete"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;

    let claimed = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/challenge/claim"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        claimed.get("outcome").and_then(|v| v.as_str()).unwrap(),
        "credited"
    );
    assert_eq!(
        claimed.get("bonus_stars").and_then(|v| v.as_i64()).unwrap(),
        50
    );
    assert_eq!(
        claimed.get("total_stars").and_then(|v| v.as_i64()).unwrap(),
        50
    );

    let again = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/challenge/claim"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        again.get("outcome").and_then(|v| v.as_str()).unwrap(),
        "already_claimed"
    );
    assert_eq!(
        again.get("total_stars").and_then(|v| v.as_i64()).unwrap(),
        50
    );

    // Unknown category
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/challenge/music/complete"),
            Some(&child_token),
            None,
            StatusCode::BAD_REQUEST,
        )
        .await;
}

#[tokio::test]
async fn shop_purchase_and_equip() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;
    let child_token = server.login("alice", "kidpass").await;

    let items = server
        .request_expect(
            "GET",
            &tenant_path("shop/items"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(items.as_array().unwrap().len(), 2);

    // Earn 20 stars from a score of 100
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/select"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let started = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/sessions"),
            Some(&child_token),
            Some(json!({"module_id": "math-race"})),
            StatusCode::OK,
        )
        .await;
    let session_id = started
        .get("session_id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    server
        .request_expect(
            "POST",
            &tenant_path(&format!("children/alice/sessions/{session_id}/end")),
            Some(&child_token),
            Some(json!({"score": 100})),
            StatusCode::OK,
        )
        .await;

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/purchase"),
            Some(&child_token),
            Some(json!({"item_id": "helmet-gold"})),
            StatusCode::CONFLICT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/purchase"),
            Some(&child_token),
            Some(json!({"item_id": "no-such-item"})),
            StatusCode::NOT_FOUND,
        )
        .await;

    let bought = server
        .request_expect(
            "POST",
            &tenant_path("children/alice/purchase"),
            Some(&child_token),
            Some(json!({"item_id": "pet-comet"})),
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        bought.get("total_stars").and_then(|v| v.as_i64()).unwrap(),
        10
    );
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/purchase"),
            Some(&child_token),
            Some(json!({"item_id": "pet-comet"})),
            StatusCode::CONFLICT,
        )
        .await;

    let owned = server
        .request_expect(
            "GET",
            &tenant_path("children/alice/items"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        owned.get("item_ids").and_then(|v| v.as_array()).unwrap(),
        &vec![json!("pet-comet")]
    );

    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/equip"),
            Some(&child_token),
            Some(json!({"item_id": "helmet-gold"})),
            StatusCode::CONFLICT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &tenant_path("children/alice/equip"),
            Some(&child_token),
            Some(json!({"item_id": "pet-comet"})),
            StatusCode::NO_CONTENT,
        )
        .await;

    let child = server
        .request_expect(
            "GET",
            &tenant_path("children/alice"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(
        child
            .get("equipped")
            .and_then(|e| e.get("pet"))
            .and_then(|v| v.as_str())
            .unwrap(),
        "pet-comet"
    );
}

#[tokio::test]
async fn child_access_control() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    create_alice(&server, &parent_token).await;
    server
        .request_expect(
            "POST",
            &tenant_path("children"),
            Some(&parent_token),
            Some(json!({"display_name": "Bob", "age_band": "8-9"})),
            StatusCode::CREATED,
        )
        .await;
    let child_token = server.login("alice", "kidpass").await;

    let negative_cases: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", tenant_path("children"), None),
        (
            "POST",
            tenant_path("children"),
            Some(json!({"display_name": "Eve", "age_band": "6-7"})),
        ),
        ("DELETE", tenant_path("children/alice"), None),
        (
            "PUT",
            tenant_path("children/alice/settings"),
            Some(json!({
                "daily_limit_minutes": 120,
                "enabled_modules": [],
                "sound_enabled": true,
                "rewards_enabled": true,
                "reporting_level": "simple"
            })),
        ),
        ("GET", tenant_path("children/bob/session"), None),
        ("GET", tenant_path("children/bob/streak"), None),
        ("POST", tenant_path("children/bob/select"), None),
        (
            "POST",
            tenant_path("children/bob/purchase"),
            Some(json!({"item_id": "pet-comet"})),
        ),
        ("PUT", tenant_path("parent/pin"), Some(json!({"pin": "9999"}))),
    ];

    for (method, path, body) in negative_cases.iter() {
        server
            .request_expect(
                method,
                path,
                Some(&child_token),
                body.clone(),
                StatusCode::FORBIDDEN,
            )
            .await;
    }

    // Own-profile gameplay routes remain available
    server
        .request_expect(
            "GET",
            &tenant_path("children/alice/settings"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "GET",
            &tenant_path("children/alice/streak"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
}

#[tokio::test]
async fn logout_invalidates_token() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    server
        .request_expect(
            "POST",
            "/api/v1/auth/logout",
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "GET",
            &tenant_path("children"),
            Some(&parent_token),
            None,
            StatusCode::UNAUTHORIZED,
        )
        .await;
}
