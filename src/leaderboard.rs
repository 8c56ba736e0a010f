//! Ranking of identifiable authors by their current point balance.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{handle_for, AuthorStats, Id, User};
use crate::repo::Repo;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LeaderboardEntry {
    pub id: Id,
    pub name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
    pub school: Option<String>,
    pub points: i64,
    pub posts: i64,
    pub likes: i64,
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Order authors by points (then likes, posts, name) and keep the top
/// `limit`. Authors without a live account are dropped after truncation,
/// so a deleted account never shifts later ranks up into the window.
pub fn rank(stats: Vec<AuthorStats>, users: &HashMap<Id, User>, limit: usize) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<(AuthorStats, Option<&User>)> = stats
        .into_iter()
        .map(|s| {
            let user = users.get(&s.author_id);
            (s, user)
        })
        .collect();

    fn points(u: Option<&User>) -> i64 {
        u.map(|u| u.points).unwrap_or(0)
    }
    fn name(u: Option<&User>) -> &str {
        u.map(|u| u.name.as_str()).unwrap_or("Anonymous")
    }
    rows.sort_by(|(sa, ua), (sb, ub)| {
        points(*ub)
            .cmp(&points(*ua))
            .then(sb.likes.cmp(&sa.likes))
            .then(sb.posts.cmp(&sa.posts))
            .then_with(|| name(*ua).cmp(name(*ub)))
    });
    rows.truncate(limit);

    rows.into_iter()
        .filter_map(|(s, user)| {
            let u = user?;
            Some(LeaderboardEntry {
                id: u.id,
                name: u.name.clone(),
                handle: handle_for(&u.name),
                avatar_url: u.profile_pic_url.clone(),
                school: u.school.clone(),
                points: u.points,
                posts: s.posts,
                likes: s.likes,
            })
        })
        .collect()
}

pub async fn leaderboard(repo: &dyn Repo, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>, ApiError> {
    let stats = repo.author_stats().await?;
    let ids: Vec<Id> = stats.iter().map(|s| s.author_id).collect();
    let users: HashMap<Id, User> = repo.get_users(&ids).await?.into_iter().map(|u| (u.id, u)).collect();
    Ok(rank(stats, &users, clamp_limit(limit)))
}
