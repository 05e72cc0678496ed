use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use starplay_shared::auth::Role;
use starplay_shared::jwt::{self, JwtClaims};
use tracing::{error, warn};

use super::{AppError, AppState};

/// How many days of inactivity before a session is considered expired.
const SESSION_IDLE_DAYS: i64 = 14;
/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let header_val = match req.headers().get(header::AUTHORIZATION) {
        Some(v) => v,
        None => return unauthorized(),
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let prefix = "Bearer ";
    if !header_str.starts_with(prefix) {
        return unauthorized();
    }
    let token = &header_str[prefix.len()..];

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    validate_claims(&state, &claims).map_err(|e| {
        tracing::warn!(error=?e, username=%claims.sub, "auth: validate_claims failed");
        // Invalid token, log out the user
        AppError::unauthorized()
    })?;

    if claims.tenant_id != state.config.tenant_id {
        tracing::warn!(
            token_tenant=%claims.tenant_id,
            config_tenant=%state.config.tenant_id,
            "auth: tenant mismatch"
        );
        return unauthorized();
    }
    let jti = claims.jti.clone();
    let cutoff = Utc::now() - Duration::days(SESSION_IDLE_DAYS);
    match state
        .store
        .touch_session_with_cutoff(&jti, cutoff.naive_utc())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(
                jti = %jti,
                username = %claims.sub,
                cutoff = %cutoff,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            return unauthorized();
        }
        Err(e) => {
            error!(jti = %jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::internal(e));
        }
    }
    let auth = AuthCtx { claims };
    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

pub async fn issue_jwt_for_user(
    state: &AppState,
    username: &str,
    role: Role,
    child_id: Option<String>,
    tenant_id: &str,
) -> Result<String, AppError> {
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp();
    let claims = JwtClaims {
        sub: username.to_string(),
        jti: jti.clone(),
        exp,
        role,
        child_id,
        tenant_id: tenant_id.to_string(),
    };

    validate_claims(state, &claims)?;

    state
        .store
        .create_session(&jti, username)
        .await
        .map_err(|e| {
            error!(username, error=%e, "login: create_session failed");
            AppError::internal(e)
        })?;
    let token = jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(username, error=%e, "login: jwt encode failed");
        AppError::internal(e)
    })?;
    Ok(token)
}

fn validate_claims(state: &AppState, claims: &JwtClaims) -> Result<(), AppError> {
    if claims.tenant_id != state.config.tenant_id {
        warn!(
            username = %claims.sub,
            requested_tenant = %claims.tenant_id,
            configured_tenant = %state.config.tenant_id,
            "issue_jwt: tenant mismatch"
        );
        return Err(AppError::forbidden());
    }
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == claims.sub)
        .ok_or_else(|| {
            warn!(username = %claims.sub, "issue_jwt: unknown user");
            AppError::forbidden()
        })?;

    match claims.role {
        Role::Parent => {
            if user.role != Role::Parent {
                warn!(
                    username = %claims.sub,
                    requested_role = ?claims.role,
                    actual_role = ?user.role,
                    "issue_jwt: role mismatch"
                );
                return Err(AppError::forbidden());
            }
            if claims.child_id.is_some() {
                warn!(
                    username = %claims.sub,
                    "issue_jwt: parent token must not include a child binding"
                );
                return Err(AppError::forbidden());
            }
        }
        Role::Child => {
            if user.role != Role::Child {
                warn!(
                    username = %claims.sub,
                    requested_role = ?claims.role,
                    actual_role = ?user.role,
                    "issue_jwt: role mismatch"
                );
                return Err(AppError::forbidden());
            }
            let child_id = claims.child_id.as_deref().ok_or_else(|| {
                warn!(username = %claims.sub, "issue_jwt: child token missing child_id");
                AppError::forbidden()
            })?;
            let expected_child = user.child_id.as_deref().ok_or_else(|| {
                warn!(
                    username = %claims.sub,
                    "issue_jwt: user missing child binding in config"
                );
                AppError::forbidden()
            })?;
            if expected_child != child_id {
                warn!(
                    username = %claims.sub,
                    expected = expected_child,
                    requested = child_id,
                    "issue_jwt: child mismatch"
                );
                return Err(AppError::forbidden());
            }
        }
    }

    Ok(())
}
