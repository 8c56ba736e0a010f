//! Post submission and the moderator review queue.
//!
//! Every post enters as `pending`. A moderator decides it exactly once;
//! approval is the only place quest points are granted.

use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::audit::{self, RequestMeta};
use crate::error::ApiError;
use crate::models::{Id, Moderation, ModerationDecision, NewPost, Post, User};
use crate::quests;
use crate::repo::{Repo, RepoError};
use crate::require_moderator;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitPost {
    pub body: String,
    #[serde(alias = "image_url", alias = "video_url")]
    pub media_url: Option<String>,
    pub quest_id: Option<String>,
    /// Ignored for signed-out submitters, who are always anonymous.
    pub anonymous: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitReceipt {
    pub id: Id,
    pub status: crate::models::PostStatus,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ModerateRequest {
    pub decision: ModerationDecision,
    pub reason: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub async fn submit_post(
    repo: &dyn Repo,
    meta: &RequestMeta,
    req: SubmitPost,
    author: Option<&User>,
) -> Result<Post, ApiError> {
    let body = req.body.trim().to_string();
    if body.is_empty() {
        return Err(ApiError::validation("body is required"));
    }
    let media_url = non_blank(req.media_url).ok_or_else(|| ApiError::validation("a photo or video is required"))?;
    let anonymous = match author {
        Some(_) => req.anonymous.unwrap_or(false),
        None => true,
    };

    let post = repo
        .create_post(NewPost {
            author_id: author.map(|u| u.id),
            author_name: author.filter(|_| !anonymous).map(|u| u.name.clone()),
            anonymous,
            body,
            media_url: Some(media_url),
            quest_id: non_blank(req.quest_id),
        })
        .await?;

    metrics::counter!("eco_posts_submitted_total").increment(1);
    tracing::info!(post_id = %post.id, anonymous, quest = ?post.quest_id, "post submitted for review");
    audit::record(repo, meta, "post.create", author, "posts", post.id, json!({ "quest_id": post.quest_id })).await;
    Ok(post)
}

pub async fn list_pending(repo: &dyn Repo, viewer: Option<&User>) -> Result<Vec<Post>, ApiError> {
    require_moderator!(viewer);
    Ok(repo.list_pending().await?)
}

pub async fn moderate(
    repo: &dyn Repo,
    meta: &RequestMeta,
    post_id: Id,
    req: ModerateRequest,
    viewer: Option<&User>,
) -> Result<Post, ApiError> {
    const ALREADY_DECIDED: &str = "post has already been moderated";

    let moderator = require_moderator!(viewer);
    let post = repo.get_post(post_id).await?;
    if !post.is_pending() {
        return Err(ApiError::Conflict(ALREADY_DECIDED));
    }

    let reward = match (req.decision, post.author_id) {
        (ModerationDecision::Approve, Some(_)) => quests::reward_for(post.quest_id.as_deref()),
        _ => 0,
    };
    let reason = non_blank(req.reason);

    // the store re-checks `pending` inside the unit, so a racing second
    // decision lands here as a conflict instead of a second credit
    let decided = repo
        .moderate_post(Moderation {
            post_id,
            decision: req.decision,
            moderator_id: moderator.id,
            reason: reason.clone(),
            reward,
        })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::Conflict(ALREADY_DECIDED),
            other => other.into(),
        })?;

    let decision = match req.decision {
        ModerationDecision::Approve => "approve",
        ModerationDecision::Decline => "decline",
    };
    metrics::counter!("eco_moderation_decisions_total", "decision" => decision).increment(1);
    tracing::info!(%post_id, moderator = %moderator.id, decision, reward, "post moderated");
    audit::record(
        repo,
        meta,
        "post.moderate",
        Some(moderator),
        "posts",
        post_id,
        json!({ "decision": decision, "reason": reason, "reward": reward }),
    )
    .await;
    Ok(decided)
}
