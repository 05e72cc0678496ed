use super::{AppError, AppState, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::{OriginalUri, State},
    http::{Method, Request},
    middleware::Next,
};
use percent_encoding::percent_decode_str;
use starplay_shared::auth::Role;
use starplay_shared::jwt::JwtClaims;

pub async fn enforce_acl(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    let tenant_prefix = ["api", "v1", "family", state.config.tenant_id.as_str()];
    if !segs.as_slice().starts_with(&tenant_prefix) {
        tracing::warn!(?segs, "ACL: path outside tenant scope");
        return Err(AppError::forbidden());
    }
    let rest = &segs[tenant_prefix.len()..];

    let decision = match claims.role {
        Role::Parent => allow_parent(&method, rest),
        Role::Child => allow_child(&method, rest, claims),
    };

    if let Err(err) = decision {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_child = ?claims.child_id,
            "ACL: no rule matched; denying"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}

/// Parents can do everything: manage profiles and settings, run play
/// sessions on a child's behalf, and manage the shop and PIN.
fn allow_parent(method: &Method, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        ["children"] if *method == Method::GET || *method == Method::POST => Ok(()),
        ["children", _] if *method == Method::GET || *method == Method::DELETE => Ok(()),
        ["children", _, "settings"] if *method == Method::GET || *method == Method::PUT => Ok(()),
        ["children", _, "select"] if *method == Method::POST => Ok(()),
        ["children", _, "deselect"] if *method == Method::POST => Ok(()),
        ["children", _, "session"] if *method == Method::GET => Ok(()),
        ["children", _, "unlock"] if *method == Method::POST => Ok(()),
        ["children", _, "streak"] if *method == Method::GET => Ok(()),
        ["children", _, "challenge"] if *method == Method::GET => Ok(()),
        ["children", _, "challenge", "claim"] if *method == Method::POST => Ok(()),
        ["children", _, "challenge", _, "complete"] if *method == Method::POST => Ok(()),
        ["children", _, "sessions"] if *method == Method::POST => Ok(()),
        ["children", _, "sessions", _, "answers"] if *method == Method::POST => Ok(()),
        ["children", _, "sessions", _, "end"] if *method == Method::POST => Ok(()),
        ["children", _, "items"] if *method == Method::GET => Ok(()),
        ["children", _, "purchase"] if *method == Method::POST => Ok(()),
        ["children", _, "equip"] if *method == Method::POST => Ok(()),
        ["shop", "items"] if *method == Method::GET => Ok(()),
        ["parent", "pin"] if *method == Method::PUT => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

/// Children are confined to gameplay routes for their own profile;
/// settings are read-only and the parent PIN is off limits.
fn allow_child(method: &Method, rest: &[&str], claims: &JwtClaims) -> Result<(), AppError> {
    match rest {
        ["children", child] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "settings"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "select"] if *method == Method::POST => ensure_child(claims, child),
        ["children", child, "deselect"] if *method == Method::POST => ensure_child(claims, child),
        ["children", child, "session"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "unlock"] if *method == Method::POST => ensure_child(claims, child),
        ["children", child, "streak"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "challenge"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "challenge", "claim"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "challenge", _, "complete"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "sessions"] if *method == Method::POST => ensure_child(claims, child),
        ["children", child, "sessions", _, "answers"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "sessions", _, "end"] if *method == Method::POST => {
            ensure_child(claims, child)
        }
        ["children", child, "items"] if *method == Method::GET => ensure_child(claims, child),
        ["children", child, "purchase"] if *method == Method::POST => ensure_child(claims, child),
        ["children", child, "equip"] if *method == Method::POST => ensure_child(claims, child),
        ["shop", "items"] if *method == Method::GET => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode(seg: &str) -> String {
    percent_decode_str(seg).decode_utf8_lossy().to_string()
}

fn ensure_child(claims: &JwtClaims, seg: &str) -> Result<(), AppError> {
    let expected = claims.child_id.as_ref().ok_or_else(AppError::forbidden)?;
    let provided = decode(seg);
    if expected == &provided {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}
