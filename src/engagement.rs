use crate::error::ApiError;
use crate::models::{Id, LikeToggle, User};
use crate::repo::Repo;

/// Flip `user`'s like on a feed-visible post. The author's balance moves
/// with the like count, one point per like.
pub async fn toggle_like(repo: &dyn Repo, post_id: Id, user: &User) -> Result<LikeToggle, ApiError> {
    let post = repo.get_post(post_id).await?;
    if !post.is_visible() {
        return Err(ApiError::NotFound);
    }
    let outcome = repo.toggle_like(post_id, user.id).await?;

    let label = if outcome.liked { "liked" } else { "unliked" };
    metrics::counter!("eco_like_toggles_total", "outcome" => label).increment(1);
    tracing::debug!(%post_id, user = %user.id, liked = outcome.liked, likes = outcome.likes, "like toggled");
    Ok(outcome)
}
