use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value; // audit detail payload
use utoipa::ToSchema;
use uuid::Uuid;

pub type Id = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub name: String,
    #[serde(skip_serializing)]
    #[schema(skip)]
    pub password_hash: String,
    pub profile_pic_url: Option<String>,
    pub bio: Option<String>,
    pub school: Option<String>,
    pub points: i64,
    pub is_moderator: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub password_hash: String,
    pub profile_pic_url: Option<String>,
}

/// Partial profile edit; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub school: Option<String>,
    #[serde(alias = "avatar_url")]
    pub profile_pic_url: Option<String>,
}

/// What other people get to see about a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicProfile {
    pub id: Id,
    pub name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub school: Option<String>,
    pub points: i64,
    pub joined_at: DateTime<Utc>,
}

impl From<&User> for PublicProfile {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            handle: handle_for(&u.name),
            avatar_url: u.profile_pic_url.clone(),
            bio: u.bio.clone(),
            school: u.school.clone(),
            points: u.points,
            joined_at: u.created_at,
        }
    }
}

/// `@` + lowercase name with all whitespace removed.
pub fn handle_for(name: &str) -> String {
    let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    format!("@{}", compact.to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Approved,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub author_id: Option<Id>,
    pub author_name: Option<String>, // snapshot taken at creation, refreshed on rename
    pub anonymous: bool,
    pub body: String,
    pub media_url: Option<String>,
    pub quest_id: Option<String>,
    pub likes: i64,
    /// Who currently likes the post. Kept server side; clients only see `likes`.
    #[serde(default, skip_serializing)]
    pub liked_by: Vec<Id>,
    pub comments: i64,
    /// `None` marks posts stored before moderation existed; they count as approved.
    pub status: Option<PostStatus>,
    pub decline_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub moderated_by: Option<Id>,
}

impl Post {
    pub fn is_visible(&self) -> bool {
        matches!(self.status, None | Some(PostStatus::Approved))
    }

    pub fn is_pending(&self) -> bool {
        self.status == Some(PostStatus::Pending)
    }

    /// Copy safe to hand to clients: anonymous posts lose their attribution.
    pub fn public(mut self) -> Self {
        if self.anonymous {
            self.author_id = None;
            self.author_name = None;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Option<Id>,
    pub author_name: Option<String>,
    pub anonymous: bool,
    pub body: String,
    pub media_url: Option<String>,
    pub quest_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostUpdate {
    pub body: Option<String>,
    #[serde(alias = "image_url", alias = "video_url")]
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ModerationDecision {
    Approve,
    Decline,
}

impl ModerationDecision {
    pub fn status(self) -> PostStatus {
        match self {
            ModerationDecision::Approve => PostStatus::Approved,
            ModerationDecision::Decline => PostStatus::Declined,
        }
    }
}

/// A decided moderation outcome, applied by the store as one unit.
#[derive(Debug, Clone)]
pub struct Moderation {
    pub post_id: Id,
    pub decision: ModerationDecision,
    pub moderator_id: Id,
    pub reason: Option<String>,
    /// Points credited to the author on approval.
    pub reward: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes: i64,
}

/// Per-author aggregate over approved, attributed posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuthorStats {
    pub author_id: Id,
    pub posts: i64,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Option<Id>,
    pub author_name: Option<String>,
    pub anonymous: bool,
    pub body: String,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn public(mut self) -> Self {
        if self.anonymous {
            self.author_id = None;
            self.author_name = None;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub author_id: Option<Id>,
    pub author_name: Option<String>,
    pub anonymous: bool,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Id,
    pub action: String,
    pub actor_id: Option<Id>,
    pub actor_name: Option<String>,
    pub target_kind: String,
    pub target_id: Id,
    #[schema(value_type = Object)]
    pub detail: Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAudit {
    pub action: &'static str,
    pub actor_id: Option<Id>,
    pub actor_name: Option<String>,
    pub target_kind: &'static str,
    pub target_id: Id,
    pub detail: Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}
