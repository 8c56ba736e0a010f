use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::*;

const USER_COLUMNS: &str =
    "id, name, password_hash, profile_pic_url, bio, school, points, is_moderator, created_at";

const POST_COLUMNS: &str = r#"
    p.id, p.author_id, p.author_name, p.anonymous, p.body, p.media_url, p.quest_id,
    p.likes, ARRAY(SELECT l.user_id FROM post_likes l WHERE l.post_id = p.id) AS liked_by,
    p.comments, p.status, p.decline_reason, p.created_at, p.moderated_at, p.moderated_by
"#;

const COMMENT_COLUMNS: &str = "id, post_id, author_id, author_name, anonymous, body, likes, created_at";

const VISIBLE: &str = "(p.status = 'approved' OR p.status IS NULL)";

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    pub fn pool(&self) -> &Pool<Postgres> { &self.pool }
}

fn map_err(e: sqlx::Error) -> RepoError {
    match e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
        other => RepoError::Internal(other.to_string()),
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, name, password_hash, profile_pic_url) VALUES ($1,$2,$3,$4) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.profile_pic_url.as_ref())
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn find_user_by_name(&self, name: &str) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE name = $1"))
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn update_profile(&self, id: Id, upd: ProfileUpdate) -> RepoResult<User> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = COALESCE($2, name), bio = COALESCE($3, bio), \
             school = COALESCE($4, school), profile_pic_url = COALESCE($5, profile_pic_url) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(upd.name.as_ref())
        .bind(upd.bio.as_ref())
        .bind(upd.school.as_ref())
        .bind(upd.profile_pic_url.as_ref())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;

        if upd.name.is_some() {
            sqlx::query("UPDATE posts SET author_name = $2 WHERE author_id = $1 AND anonymous = false")
                .bind(id)
                .bind(&user.name)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            sqlx::query("UPDATE comments SET author_name = $2 WHERE author_id = $1 AND anonymous = false")
                .bind(id)
                .bind(&user.name)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
        }
        tx.commit().await.map_err(map_err)?;
        Ok(user)
    }

    async fn get_users(&self, ids: &[Id]) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn set_moderator(&self, id: Id, is_moderator: bool) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_moderator = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(is_moderator)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO posts (id, author_id, author_name, anonymous, body, media_url, quest_id, status) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,'pending')",
        )
        .bind(id)
        .bind(new.author_id)
        .bind(new.author_name.as_ref())
        .bind(new.anonymous)
        .bind(&new.body)
        .bind(new.media_url.as_ref())
        .bind(new.quest_id.as_ref())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        self.get_post(id).await
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn list_feed(&self) -> RepoResult<Vec<Post>> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE {VISIBLE} ORDER BY p.created_at DESC, p.id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn list_pending(&self) -> RepoResult<Vec<Post>> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.status = 'pending' ORDER BY p.created_at ASC, p.id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn list_by_author(&self, author_id: Id, include_anonymous: bool) -> RepoResult<Vec<Post>> {
        sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts p \
             WHERE p.author_id = $1 AND {VISIBLE} AND ($2 OR p.anonymous = false) \
             ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(author_id)
        .bind(include_anonymous)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn update_post(&self, id: Id, upd: PostUpdate) -> RepoResult<Post> {
        let res = sqlx::query(
            "UPDATE posts SET body = COALESCE($2, body), media_url = COALESCE($3, media_url) WHERE id = $1",
        )
        .bind(id)
        .bind(upd.body.as_ref())
        .bind(upd.media_url.as_ref())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        self.get_post(id).await
    }

    async fn delete_post(&self, id: Id) -> RepoResult<()> {
        // comments and post_likes go with it (ON DELETE CASCADE)
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }

    async fn moderate_post(&self, m: Moderation) -> RepoResult<Post> {
        let status = m.decision.status();
        let reason = match m.decision {
            ModerationDecision::Decline => m.reason.clone(),
            ModerationDecision::Approve => None,
        };
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let decided: Option<Option<Id>> = sqlx::query_scalar(
            "UPDATE posts SET status = $2, moderated_at = now(), moderated_by = $3, decline_reason = $4 \
             WHERE id = $1 AND status = 'pending' RETURNING author_id",
        )
        .bind(m.post_id)
        .bind(status)
        .bind(m.moderator_id)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?;

        let Some(author_id) = decided else {
            let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM posts WHERE id = $1")
                .bind(m.post_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_err)?;
            return Err(if exists.is_some() { RepoError::Conflict } else { RepoError::NotFound });
        };

        if let (ModerationDecision::Approve, Some(author_id)) = (m.decision, author_id) {
            if m.reward > 0 {
                sqlx::query("UPDATE users SET points = points + $2 WHERE id = $1")
                    .bind(author_id)
                    .bind(m.reward)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_err)?;
            }
        }
        tx.commit().await.map_err(map_err)?;
        self.get_post(m.post_id).await
    }

    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        // row lock serializes toggles on the same post
        let author_id: Option<Id> = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
            .rows_affected();

        let (liked, delta) = if removed > 0 {
            (false, -1i64)
        } else {
            sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
            (true, 1i64)
        };

        let likes: i64 = sqlx::query_scalar("UPDATE posts SET likes = GREATEST(likes + $2, 0) WHERE id = $1 RETURNING likes")
            .bind(post_id)
            .bind(delta)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;

        if let Some(author_id) = author_id {
            sqlx::query("UPDATE users SET points = GREATEST(points + $2, 0) WHERE id = $1")
                .bind(author_id)
                .bind(delta)
                .execute(&mut *tx)
                .await
                .map_err(map_err)?;
        }
        tx.commit().await.map_err(map_err)?;
        Ok(LikeToggle { liked, likes })
    }

    async fn author_stats(&self) -> RepoResult<Vec<AuthorStats>> {
        sqlx::query_as::<_, AuthorStats>(&format!(
            "SELECT p.author_id AS author_id, COUNT(*)::BIGINT AS posts, COALESCE(SUM(p.likes), 0)::BIGINT AS likes \
             FROM posts p WHERE {VISIBLE} AND p.anonymous = false AND p.author_id IS NOT NULL \
             GROUP BY p.author_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<Comment> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let bumped = sqlx::query("UPDATE posts SET comments = comments + 1 WHERE id = $1")
            .bind(new.post_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        if bumped.rows_affected() == 0 { return Err(RepoError::NotFound); }
        let comment = sqlx::query_as::<_, Comment>(&format!(
            "INSERT INTO comments (id, post_id, author_id, author_name, anonymous, body) \
             VALUES ($1,$2,$3,$4,$5,$6) RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.post_id)
        .bind(new.author_id)
        .bind(new.author_name.as_ref())
        .bind(new.anonymous)
        .bind(&new.body)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;
        tx.commit().await.map_err(map_err)?;
        Ok(comment)
    }

    async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_err)
    }

    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
        sqlx::query_as::<_, Comment>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn update_comment(&self, id: Id, body: String) -> RepoResult<Comment> {
        sqlx::query_as::<_, Comment>(&format!(
            "UPDATE comments SET body = $2 WHERE id = $1 RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)
    }

    async fn delete_comment(&self, id: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        let post_id: Id = sqlx::query_scalar("DELETE FROM comments WHERE id = $1 RETURNING post_id")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_err)?;
        sqlx::query("UPDATE posts SET comments = GREATEST(comments - 1, 0) WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        tx.commit().await.map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl AuditRepo for PgRepo {
    async fn record_audit(&self, entry: NewAudit) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO audits (id, action, actor_id, actor_name, target_kind, target_id, detail, ip, user_agent) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(Uuid::new_v4())
        .bind(entry.action)
        .bind(entry.actor_id)
        .bind(entry.actor_name)
        .bind(entry.target_kind)
        .bind(entry.target_id)
        .bind(entry.detail)
        .bind(entry.ip)
        .bind(entry.user_agent)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn recent_audits(&self, limit: i64) -> RepoResult<Vec<AuditEntry>> {
        sqlx::query_as::<_, AuditEntry>(
            "SELECT id, action, actor_id, actor_name, target_kind, target_id, detail, ip, user_agent, at \
             FROM audits ORDER BY at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)
    }
}
