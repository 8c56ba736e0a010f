use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::*;

#[derive(Default)]
struct State {
    users: HashMap<Id, User>,
    posts: HashMap<Id, Post>,
    comments: HashMap<Id, Comment>,
    audits: Vec<AuditEntry>,
}

/// Process-local store. Every mutation runs under one write lock, so each
/// operation is atomic with respect to the others.
#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }
}

fn credit(s: &mut State, user_id: Option<Id>, delta: i64) {
    if let Some(user) = user_id.and_then(|id| s.users.get_mut(&id)) {
        user.points = (user.points + delta).max(0);
    }
}

// ties on the timestamp fall back to the id so listings stay stable
fn newest_first(a: &Post, b: &Post) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

fn oldest_first(a: &Post, b: &Post) -> Ordering {
    a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.write()?;
        if s.users.values().any(|u| u.name == new.name) {
            return Err(RepoError::Conflict);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            password_hash: new.password_hash,
            profile_pic_url: new.profile_pic_url,
            bio: None,
            school: None,
            points: 0,
            is_moderator: false,
            created_at: Utc::now(),
        };
        s.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read()?.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn find_user_by_name(&self, name: &str) -> RepoResult<User> {
        self.read()?
            .users
            .values()
            .find(|u| u.name == name)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn update_profile(&self, id: Id, upd: ProfileUpdate) -> RepoResult<User> {
        let mut s = self.write()?;

        // uniqueness check before taking the mutable borrow
        if let Some(ref name) = upd.name {
            if s.users.values().any(|u| u.name == *name && u.id != id) {
                return Err(RepoError::Conflict);
            }
        }

        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        let renamed = upd.name.as_ref().filter(|n| **n != user.name).cloned();
        if let Some(name) = upd.name { user.name = name; }
        if let Some(bio) = upd.bio { user.bio = Some(bio); }
        if let Some(school) = upd.school { user.school = Some(school); }
        if let Some(pic) = upd.profile_pic_url { user.profile_pic_url = Some(pic); }
        let updated = user.clone();

        if let Some(name) = renamed {
            for p in s.posts.values_mut().filter(|p| p.author_id == Some(id) && !p.anonymous) {
                p.author_name = Some(name.clone());
            }
            for c in s.comments.values_mut().filter(|c| c.author_id == Some(id) && !c.anonymous) {
                c.author_name = Some(name.clone());
            }
        }
        Ok(updated)
    }

    async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
        let s = self.read()?;
        Ok(ids.iter().filter_map(|id| s.users.get(id)).cloned().collect())
    }

    async fn set_moderator(&self, id: Id, is_moderator: bool) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        user.is_moderator = is_moderator;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        self.write()?.users.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            author_id: new.author_id,
            author_name: new.author_name,
            anonymous: new.anonymous,
            body: new.body,
            media_url: new.media_url,
            quest_id: new.quest_id,
            likes: 0,
            liked_by: Vec::new(),
            comments: 0,
            status: Some(PostStatus::Pending),
            decline_reason: None,
            created_at: Utc::now(),
            moderated_at: None,
            moderated_by: None,
        };
        self.write()?.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        self.read()?.posts.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_feed(&self) -> RepoResult<Vec<Post>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.posts.values().filter(|p| p.is_visible()).cloned().collect();
        v.sort_by(newest_first);
        Ok(v)
    }

    async fn list_pending(&self) -> RepoResult<Vec<Post>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.posts.values().filter(|p| p.is_pending()).cloned().collect();
        v.sort_by(oldest_first);
        Ok(v)
    }

    async fn list_by_author(&self, author_id: Id, include_anonymous: bool) -> RepoResult<Vec<Post>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .posts
            .values()
            .filter(|p| p.author_id == Some(author_id) && p.is_visible())
            .filter(|p| include_anonymous || !p.anonymous)
            .cloned()
            .collect();
        v.sort_by(newest_first);
        Ok(v)
    }

    async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(body) = upd.body { post.body = body; }
        if let Some(media) = upd.media_url { post.media_url = Some(media); }
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.posts.remove(&id).ok_or(RepoError::NotFound)?;
        s.comments.retain(|_, c| c.post_id != id);
        Ok(())
    }

    async fn moderate_post(&self, m: Moderation) -> RepoResult<Post> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&m.post_id).ok_or(RepoError::NotFound)?;
        if !post.is_pending() {
            return Err(RepoError::Conflict);
        }
        post.status = Some(m.decision.status());
        post.moderated_at = Some(Utc::now());
        post.moderated_by = Some(m.moderator_id);
        if m.decision == ModerationDecision::Decline {
            post.decline_reason = m.reason;
        }
        let decided = post.clone();
        if m.decision == ModerationDecision::Approve && m.reward > 0 {
            credit(&mut s, decided.author_id, m.reward);
        }
        Ok(decided)
    }

    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&post_id).ok_or(RepoError::NotFound)?;
        let liked = match post.liked_by.iter().position(|u| *u == user_id) {
            Some(i) => {
                post.liked_by.swap_remove(i);
                false
            }
            None => {
                post.liked_by.push(user_id);
                true
            }
        };
        let delta = if liked { 1 } else { -1 };
        post.likes = (post.likes + delta).max(0);
        let outcome = LikeToggle { liked, likes: post.likes };
        let author = post.author_id;
        credit(&mut s, author, delta);
        Ok(outcome)
    }

    async fn author_stats(&self) -> RepoResult<Vec<AuthorStats>> {
        let s = self.read()?;
        let mut acc: HashMap<Id, AuthorStats> = HashMap::new();
        for p in s.posts.values().filter(|p| p.is_visible() && !p.anonymous) {
            let Some(author_id) = p.author_id else { continue };
            let entry = acc.entry(author_id).or_insert(AuthorStats { author_id, posts: 0, likes: 0 });
            entry.posts += 1;
            entry.likes += p.likes;
        }
        Ok(acc.into_values().collect())
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&new.post_id).ok_or(RepoError::NotFound)?;
        post.comments += 1;
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: new.post_id,
            author_id: new.author_id,
            author_name: new.author_name,
            anonymous: new.anonymous,
            body: new.body,
            likes: 0,
            created_at: Utc::now(),
        };
        s.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        self.read()?.comments.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.comments.values().filter(|c| c.post_id == post_id).cloned().collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn update_comment(&self, id: Id, body: String) -> RepoResult<Comment> {
        let mut s = self.write()?;
        let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        comment.body = body;
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        let removed = s.comments.remove(&id).ok_or(RepoError::NotFound)?;
        if let Some(post) = s.posts.get_mut(&removed.post_id) {
            post.comments = (post.comments - 1).max(0);
        }
        Ok(())
    }
}

#[async_trait]
impl AuditRepo for InMemRepo {
    async fn record_audit(&self, entry: NewAudit) -> RepoResult<()> {
        let audit = AuditEntry {
            id: Uuid::new_v4(),
            action: entry.action.to_string(),
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            target_kind: entry.target_kind.to_string(),
            target_id: entry.target_id,
            detail: entry.detail,
            ip: entry.ip,
            user_agent: entry.user_agent,
            at: Utc::now(),
        };
        self.write()?.audits.push(audit);
        Ok(())
    }

    async fn recent_audits(&self, limit: i64) -> RepoResult<Vec<AuditEntry>> {
        let s = self.read()?;
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(s.audits.iter().rev().take(take).cloned().collect())
    }
}
