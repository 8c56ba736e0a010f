//! Best-effort audit trail. A failed audit write is logged and dropped; it
//! never fails or delays the operation being audited.

use actix_web::HttpRequest;
use serde_json::Value;

use crate::models::{Id, NewAudit, User};
use crate::repo::AuditRepo;

/// Who/where metadata pulled off the inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn from_request(req: &HttpRequest) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .or_else(|| header("cf-connecting-ip"))
            .or_else(|| req.peer_addr().map(|a| a.ip().to_string()));
        Self { ip, user_agent: header("user-agent") }
    }
}

pub async fn record<R: AuditRepo + ?Sized>(
    repo: &R,
    meta: &RequestMeta,
    action: &'static str,
    actor: Option<&User>,
    target_kind: &'static str,
    target_id: Id,
    detail: Value,
) {
    let entry = NewAudit {
        action,
        actor_id: actor.map(|u| u.id),
        actor_name: actor.map(|u| u.name.clone()),
        target_kind,
        target_id,
        detail,
        ip: meta.ip.clone(),
        user_agent: meta.user_agent.clone(),
    };
    if let Err(e) = repo.record_audit(entry).await {
        tracing::warn!(action, %target_id, "audit write failed: {e}");
    }
}
