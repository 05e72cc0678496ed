use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, tenant_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn auth_logout(base: &str) -> String {
    base_join(base, &format!("{}/auth/logout", API_V1_PREFIX))
}
pub fn children(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/children", tenant_scope(tenant_id)))
}
pub fn child(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!("{}/children/{}", tenant_scope(tenant_id), enc(child_id)),
    )
}
pub fn child_settings(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/settings",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_select(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/select",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_deselect(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/deselect",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_session_state(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/session",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_unlock(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/unlock",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_streak(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/streak",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_challenge(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/challenge",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_challenge_complete(
    base: &str,
    tenant_id: &str,
    child_id: &str,
    category: &str,
) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/challenge/{}/complete",
            tenant_scope(tenant_id),
            enc(child_id),
            enc(category)
        ),
    )
}
pub fn child_challenge_claim(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/challenge/claim",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_game_sessions(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/sessions",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn game_session_answers(
    base: &str,
    tenant_id: &str,
    child_id: &str,
    session_id: &str,
) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/sessions/{}/answers",
            tenant_scope(tenant_id),
            enc(child_id),
            enc(session_id)
        ),
    )
}
pub fn game_session_end(base: &str, tenant_id: &str, child_id: &str, session_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/sessions/{}/end",
            tenant_scope(tenant_id),
            enc(child_id),
            enc(session_id)
        ),
    )
}
pub fn child_items(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/items",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn shop_items(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/shop/items", tenant_scope(tenant_id)))
}
pub fn child_purchase(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/purchase",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn child_equip(base: &str, tenant_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/equip",
            tenant_scope(tenant_id),
            enc(child_id)
        ),
    )
}
pub fn parent_pin(base: &str, tenant_id: &str) -> String {
    base_join(base, &format!("{}/parent/pin", tenant_scope(tenant_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_double_slash() {
        assert_eq!(
            auth_login("http://x/"),
            "http://x/api/v1/auth/login".to_string()
        );
    }

    #[test]
    fn encodes_path_segments() {
        let url = child_unlock("http://x", "fam", "a b");
        assert_eq!(url, "http://x/api/v1/family/fam/children/a%20b/unlock");
    }
}
