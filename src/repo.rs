use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the display name is taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn find_user_by_name(&self, name: &str) -> RepoResult<User>;
    /// Applies the edit and, when the name changes, rewrites the author
    /// snapshot on the user's attributed posts and comments.
    async fn update_profile(&self, id: Id, upd: ProfileUpdate) -> RepoResult<User>;
    /// Users among `ids` that still exist, in no particular order.
    async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>>;
    async fn set_moderator(&self, id: Id, is_moderator: bool) -> RepoResult<User>;
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Approved and legacy posts, newest first.
    async fn list_feed(&self) -> RepoResult<Vec<Post>>;
    /// Pending posts, oldest first.
    async fn list_pending(&self) -> RepoResult<Vec<Post>>;
    /// Visible posts attributed to `author_id`, newest first.
    async fn list_by_author(&self, author_id: Id, include_anonymous: bool) -> RepoResult<Vec<Post>>;
    async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post>;
    /// Removes the post together with its comments and likes.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    /// Moves a pending post to its decided status and credits `reward`
    /// points to the author on approval, as one unit. `Conflict` when the
    /// post is no longer pending.
    async fn moderate_post(&self, m: Moderation) -> RepoResult<Post>;
    /// Flips `user_id`'s membership in the like-set, adjusting the like
    /// counter and the author's points by one in the same unit.
    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle>;
    async fn author_stats(&self) -> RepoResult<Vec<AuthorStats>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// `NotFound` when the parent post does not exist.
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    /// Oldest first.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn update_comment(&self, id: Id, body: String) -> RepoResult<Comment>;
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn record_audit(&self, entry: NewAudit) -> RepoResult<()>;
    /// Newest first.
    async fn recent_audits(&self, limit: i64) -> RepoResult<Vec<AuditEntry>>;
}

pub trait Repo: UserRepo + PostRepo + CommentRepo + AuditRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + CommentRepo + AuditRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem;

#[cfg(feature = "postgres-store")]
pub mod pg;
