use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::audit::{self, RequestMeta};
use crate::auth::{hash_password, verify_password, AuthUser, CurrentUser, SessionSigner};
use crate::error::ApiError;
use crate::leaderboard;
use crate::media::{self, MediaStore, MediaStoreError, MAX_MEDIA_BYTES};
use crate::models::*;
use crate::moderation::{self, ModerateRequest, SubmitPost, SubmitReceipt};
use crate::quests::{self, Quest};
use crate::rate_limit::{Action, RateLimiterFacade};
use crate::repo::{Repo, RepoError};
use crate::{engagement, require_moderator};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::validation(format!("invalid JSON body: {err}")).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::validation(format!("invalid query: {err}")).into()),
    )
    .app_data(web::PathConfig::default().error_handler(|_err, _req| ApiError::NotFound.into()));

    cfg.service(
        web::scope("/api")
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_feed))
                    .route(web::post().to(create_post)),
            )
            // literal segments must be registered ahead of `/posts/{id}`
            .service(web::resource("/posts/moderation").route(web::get().to(list_pending)))
            .service(web::resource("/posts/by-author/{user_id}").route(web::get().to(list_posts_by_author)))
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::patch().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/moderate").route(web::post().to(moderate_post)))
            .service(web::resource("/posts/{id}/like").route(web::post().to(toggle_like)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(web::resource("/comments/by-post/{post_id}").route(web::get().to(list_comments)))
            .service(
                web::resource("/comments/{id}")
                    .route(web::get().to(get_comment))
                    .route(web::patch().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(
                web::resource("/users/me")
                    .route(web::get().to(get_me))
                    .route(web::patch().to(update_me))
                    .route(web::delete().to(delete_me)),
            )
            .service(web::resource("/users/me/posts").route(web::get().to(my_posts)))
            .service(web::resource("/users/{id}").route(web::get().to(get_user_profile)))
            .service(web::resource("/quests/today").route(web::get().to(quests_today)))
            .service(web::resource("/leaderboard").route(web::get().to(get_leaderboard)))
            .service(web::resource("/audits").route(web::get().to(list_audits)))
            .service(web::resource("/media").route(web::post().to(upload_media))),
    );
    // outside /api so `<img src="/media/{hash}">` works as-is
    cfg.route("/media/{hash}", web::get().to(get_media));
    cfg.route("/metrics", web::get().to(metrics_endpoint));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub media: Arc<dyn MediaStore>,
    pub session: SessionSigner,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub bootstrap_moderators: Vec<String>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, media: Arc<dyn MediaStore>, session: SessionSigner) -> Self {
        Self { repo, media, session, rate_limiter: None, bootstrap_moderators: Vec::new(), metrics: None }
    }

    pub fn with_rate_limiter(mut self, rl: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(rl);
        self
    }

    pub fn with_bootstrap_moderators(mut self, names: Vec<String>) -> Self {
        self.bootstrap_moderators = names;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn limit(&self, action: Action, req: &HttpRequest) -> Result<(), ApiError> {
        match &self.rate_limiter {
            Some(rl) => rl.guard(action, req),
            None => Ok(()),
        }
    }
}

/// Author of the content, or a moderator.
fn can_manage(user: &User, author_id: Option<Id>) -> bool {
    user.is_moderator || author_id == Some(user.id)
}

fn required_text(value: &str, field: &str) -> Result<String, ApiError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(v.to_string())
}

// ---------------- Auth ----------------

const MIN_NAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 3;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
    #[serde(alias = "avatar_url")]
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionInfo {
    pub id: Id,
    pub name: String,
    pub profile_pic_url: Option<String>,
    pub is_moderator: bool,
    /// Same token as the cookie, for clients using `Authorization: Bearer`.
    pub token: String,
}

fn valid_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(ApiError::validation(format!("name must be at least {MIN_NAME_LEN} characters")));
    }
    Ok(name.to_string())
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "Name or password too short"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn register(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let RegisterRequest { name, password, profile_pic_url } = payload.into_inner();
    let name = valid_name(&name)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    let password_hash = web::block(move || hash_password(&password))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            log::error!("password hashing failed: {e}");
            ApiError::Internal
        })?;

    let user = data
        .repo
        .create_user(NewUser { name, password_hash, profile_pic_url })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::Conflict("name already taken"),
            other => other.into(),
        })?;

    metrics::counter!("eco_registrations_total").increment(1);
    tracing::info!(user_id = %user.id, "user registered");
    let meta = RequestMeta::from_request(&req);
    audit::record(data.repo.as_ref(), &meta, "user.register", Some(&user), "users", user.id, json!({})).await;
    Ok(HttpResponse::Created().json(json!({ "id": user.id, "name": user.name })))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = SessionInfo),
        (status = 401, description = "Bad credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    data.limit(Action::Login, &req)?;
    let LoginRequest { name, password } = payload.into_inner();

    let found = match data.repo.find_user_by_name(name.trim()).await {
        Ok(u) => Some(u),
        Err(RepoError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    let Some(mut user) = found else {
        metrics::counter!("eco_logins_total", "outcome" => "rejected").increment(1);
        return Err(ApiError::Unauthorized);
    };
    let hash = user.password_hash.clone();
    let ok = web::block(move || verify_password(&password, &hash))
        .await
        .map_err(|_| ApiError::Internal)?;
    if !ok {
        metrics::counter!("eco_logins_total", "outcome" => "rejected").increment(1);
        return Err(ApiError::Unauthorized);
    }

    if !user.is_moderator && data.bootstrap_moderators.iter().any(|n| n == &user.name) {
        user = data.repo.set_moderator(user.id, true).await?;
        tracing::info!(user_id = %user.id, "promoted bootstrap moderator");
    }

    let token = data.session.issue(user.id).map_err(|e| {
        log::error!("token signing failed: {e}");
        ApiError::Internal
    })?;
    metrics::counter!("eco_logins_total", "outcome" => "accepted").increment(1);
    Ok(HttpResponse::Ok().cookie(data.session.cookie(token.clone())).json(SessionInfo {
        id: user.id,
        name: user.name,
        profile_pic_url: user.profile_pic_url,
        is_moderator: user.is_moderator,
        token,
    }))
}

#[utoipa::path(post, path = "/api/auth/logout", responses((status = 204, description = "Session cookie cleared")))]
pub async fn logout(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::NoContent().cookie(data.session.expired_cookie()).finish()
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "No valid session")
    )
)]
pub async fn auth_me(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(user.0)
}

// ---------------- Posts ----------------

#[utoipa::path(
    get,
    path = "/api/posts",
    responses((status = 200, description = "Approved posts, newest first", body = [Post]))
)]
pub async fn list_feed(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts: Vec<Post> = data.repo.list_feed().await?.into_iter().map(Post::public).collect();
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = SubmitPost,
    responses(
        (status = 201, description = "Queued for moderation", body = SubmitReceipt),
        (status = 400, description = "Missing body or media"),
        (status = 429, description = "Too many submissions")
    )
)]
pub async fn create_post(
    req: HttpRequest,
    viewer: CurrentUser,
    data: web::Data<AppState>,
    payload: web::Json<SubmitPost>,
) -> Result<HttpResponse, ApiError> {
    data.limit(Action::Post, &req)?;
    let meta = RequestMeta::from_request(&req);
    let post = moderation::submit_post(data.repo.as_ref(), &meta, payload.into_inner(), viewer.user()).await?;
    Ok(HttpResponse::Created().json(SubmitReceipt {
        id: post.id,
        status: PostStatus::Pending,
        message: "Post submitted and awaiting moderation".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/posts/moderation",
    responses(
        (status = 200, description = "Pending posts, oldest first", body = [Post]),
        (status = 403, description = "Moderators only")
    )
)]
pub async fn list_pending(viewer: CurrentUser, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts: Vec<Post> = moderation::list_pending(data.repo.as_ref(), viewer.user())
        .await?
        .into_iter()
        .map(Post::public)
        .collect();
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/moderate",
    request_body = ModerateRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Decision applied", body = Post),
        (status = 403, description = "Moderators only"),
        (status = 404, description = "Post not found"),
        (status = 409, description = "Post was already moderated")
    )
)]
pub async fn moderate_post(
    req: HttpRequest,
    viewer: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ModerateRequest>,
) -> Result<HttpResponse, ApiError> {
    let meta = RequestMeta::from_request(&req);
    let post = moderation::moderate(data.repo.as_ref(), &meta, path.into_inner(), payload.into_inner(), viewer.user())
        .await?;
    Ok(HttpResponse::Ok().json(post.public()))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "New like state", body = LikeToggle),
        (status = 401, description = "Sign-in required"),
        (status = 404, description = "Post not found or not visible")
    )
)]
pub async fn toggle_like(user: AuthUser, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let outcome = engagement::toggle_like(data.repo.as_ref(), path.into_inner(), &user.0).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 200, description = "Post", body = Post), (status = 404, description = "Post not found"))
)]
pub async fn get_post(viewer: CurrentUser, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let allowed = post.is_visible() || viewer.user().is_some_and(|u| can_manage(u, post.author_id));
    if !allowed {
        return Err(ApiError::NotFound);
    }
    Ok(HttpResponse::Ok().json(post.public()))
}

#[utoipa::path(
    patch,
    path = "/api/posts/{id}",
    request_body = PostUpdate,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 403, description = "Only the author may edit"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    req: HttpRequest,
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PostUpdate>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if post.author_id != Some(user.0.id) {
        return Err(ApiError::Forbidden);
    }
    let PostUpdate { body, media_url } = payload.into_inner();
    let upd = PostUpdate {
        body: body.map(|b| required_text(&b, "body")).transpose()?,
        media_url: media_url.map(|m| required_text(&m, "media")).transpose()?,
    };
    let updated = data.repo.update_post(id, upd).await?;
    let meta = RequestMeta::from_request(&req);
    audit::record(data.repo.as_ref(), &meta, "post.update", Some(&user.0), "posts", id, json!({})).await;
    Ok(HttpResponse::Ok().json(updated.public()))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post and its comments removed"),
        (status = 403, description = "Author or moderator only"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    req: HttpRequest,
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if !can_manage(&user.0, post.author_id) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_post(id).await?;
    tracing::info!(post_id = %id, by = %user.0.id, "post deleted");
    let meta = RequestMeta::from_request(&req);
    audit::record(
        data.repo.as_ref(),
        &meta,
        "post.delete",
        Some(&user.0),
        "posts",
        id,
        json!({ "comments": post.comments, "by_moderator": post.author_id != Some(user.0.id) }),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/posts/by-author/{user_id}",
    params(("user_id" = Id, Path, description = "Author id")),
    responses((status = 200, description = "Author's approved, attributed posts", body = [Post]))
)]
pub async fn list_posts_by_author(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_by_author(path.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(posts))
}

// ---------------- Comments ----------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateComment {
    pub post_id: Id,
    pub body: String,
    pub anonymous: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditComment {
    pub body: String,
}

#[utoipa::path(
    get,
    path = "/api/comments/by-post/{post_id}",
    params(("post_id" = Id, Path, description = "Parent post id")),
    responses((status = 200, description = "Comments, oldest first", body = [Comment]))
)]
pub async fn list_comments(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let comments: Vec<Comment> = data
        .repo
        .list_comments(path.into_inner())
        .await?
        .into_iter()
        .map(Comment::public)
        .collect();
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    post,
    path = "/api/comments",
    request_body = CreateComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Empty body"),
        (status = 404, description = "Post not found"),
        (status = 429, description = "Too many comments")
    )
)]
pub async fn create_comment(
    req: HttpRequest,
    viewer: CurrentUser,
    data: web::Data<AppState>,
    payload: web::Json<CreateComment>,
) -> Result<HttpResponse, ApiError> {
    data.limit(Action::Comment, &req)?;
    let CreateComment { post_id, body, anonymous } = payload.into_inner();
    let body = required_text(&body, "body")?;

    let post = data.repo.get_post(post_id).await?;
    if !post.is_visible() && !viewer.user().is_some_and(|u| can_manage(u, post.author_id)) {
        return Err(ApiError::NotFound);
    }

    let author = viewer.user();
    let anonymous = author.is_none() || anonymous.unwrap_or(false);
    let comment = data
        .repo
        .create_comment(NewComment {
            post_id,
            author_id: author.map(|u| u.id),
            author_name: author.filter(|_| !anonymous).map(|u| u.name.clone()),
            anonymous,
            body,
        })
        .await?;

    metrics::counter!("eco_comments_created_total").increment(1);
    let meta = RequestMeta::from_request(&req);
    audit::record(
        data.repo.as_ref(),
        &meta,
        "comment.create",
        author,
        "comments",
        comment.id,
        json!({ "post_id": post_id }),
    )
    .await;
    Ok(HttpResponse::Created().json(comment.public()))
}

#[utoipa::path(
    get,
    path = "/api/comments/{id}",
    params(("id" = Id, Path, description = "Comment id")),
    responses((status = 200, description = "Comment", body = Comment), (status = 404, description = "Not found"))
)]
pub async fn get_comment(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let comment = data.repo.get_comment(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comment.public()))
}

#[utoipa::path(
    patch,
    path = "/api/comments/{id}",
    request_body = EditComment,
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment updated", body = Comment),
        (status = 403, description = "Only the author may edit"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_comment(
    req: HttpRequest,
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<EditComment>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let comment = data.repo.get_comment(id).await?;
    if comment.author_id != Some(user.0.id) {
        return Err(ApiError::Forbidden);
    }
    let body = required_text(&payload.body, "body")?;
    let updated = data.repo.update_comment(id, body).await?;
    let meta = RequestMeta::from_request(&req);
    audit::record(data.repo.as_ref(), &meta, "comment.update", Some(&user.0), "comments", id, json!({})).await;
    Ok(HttpResponse::Ok().json(updated.public()))
}

#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    params(("id" = Id, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Comment removed"),
        (status = 403, description = "Author or moderator only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_comment(
    req: HttpRequest,
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let comment = data.repo.get_comment(id).await?;
    if !can_manage(&user.0, comment.author_id) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_comment(id).await?;
    let meta = RequestMeta::from_request(&req);
    audit::record(
        data.repo.as_ref(),
        &meta,
        "comment.delete",
        Some(&user.0),
        "comments",
        id,
        json!({ "post_id": comment.post_id }),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Users ----------------

#[utoipa::path(
    get,
    path = "/api/users/me",
    responses((status = 200, description = "Own account", body = User), (status = 401, description = "No valid session"))
)]
pub async fn get_me(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(user.0)
}

#[utoipa::path(
    patch,
    path = "/api/users/me",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Name too short"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn update_me(
    req: HttpRequest,
    user: AuthUser,
    data: web::Data<AppState>,
    payload: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, ApiError> {
    let mut upd = payload.into_inner();
    upd.name = upd.name.as_deref().map(valid_name).transpose()?;
    let renamed = upd.name.as_ref().is_some_and(|n| n != &user.0.name);

    let updated = data.repo.update_profile(user.0.id, upd).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::Conflict("name already taken"),
        other => other.into(),
    })?;
    if renamed {
        let meta = RequestMeta::from_request(&req);
        audit::record(
            data.repo.as_ref(),
            &meta,
            "user.rename",
            Some(&updated),
            "users",
            updated.id,
            json!({ "from": user.0.name, "to": updated.name }),
        )
        .await;
    }
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/users/me",
    responses((status = 204, description = "Account deleted; session cleared"), (status = 401, description = "No valid session"))
)]
pub async fn delete_me(req: HttpRequest, user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_user(user.0.id).await?;
    tracing::info!(user_id = %user.0.id, "account deleted");
    let meta = RequestMeta::from_request(&req);
    audit::record(data.repo.as_ref(), &meta, "user.delete", Some(&user.0), "users", user.0.id, json!({})).await;
    Ok(HttpResponse::NoContent().cookie(data.session.expired_cookie()).finish())
}

#[utoipa::path(
    get,
    path = "/api/users/me/posts",
    responses((status = 200, description = "Own approved posts, anonymous ones included", body = [Post]))
)]
pub async fn my_posts(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_by_author(user.0.id, true).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses((status = 200, description = "Public profile", body = PublicProfile), (status = 404, description = "Not found"))
)]
pub async fn get_user_profile(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PublicProfile::from(&user)))
}

// ---------------- Quests, leaderboard, audits ----------------

#[derive(Debug, Serialize, ToSchema)]
pub struct QuestsToday {
    /// UTC calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub quests: Vec<Quest>,
}

#[utoipa::path(get, path = "/api/quests/today", responses((status = 200, description = "Today's quests", body = QuestsToday)))]
pub async fn quests_today() -> HttpResponse {
    let now = chrono::Utc::now();
    HttpResponse::Ok().json(QuestsToday { date: now.format("%Y-%m-%d").to_string(), quests: quests::today_quests(now) })
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/leaderboard",
    params(("limit" = Option<usize>, Query, description = "Entries to return (default 50, max 100)")),
    responses((status = 200, description = "Ranked authors", body = [LeaderboardEntry]))
)]
pub async fn get_leaderboard(data: web::Data<AppState>, query: web::Query<LimitQuery>) -> Result<HttpResponse, ApiError> {
    let board = leaderboard::leaderboard(data.repo.as_ref(), query.limit).await?;
    Ok(HttpResponse::Ok().json(board))
}

#[utoipa::path(
    get,
    path = "/api/audits",
    params(("limit" = Option<usize>, Query, description = "Entries to return (default 100, max 500)")),
    responses((status = 200, description = "Newest audit entries", body = [AuditEntry]), (status = 403, description = "Moderators only"))
)]
pub async fn list_audits(
    viewer: CurrentUser,
    data: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse, ApiError> {
    require_moderator!(viewer.user());
    let limit = query.limit.unwrap_or(100).clamp(1, 500) as i64;
    Ok(HttpResponse::Ok().json(data.repo.recent_audits(limit).await?))
}

// ---------------- Media ----------------

#[utoipa::path(
    post,
    path = "/api/media",
    responses(
        (status = 201, description = "Media stored (new)", body = UploadedMedia),
        (status = 200, description = "Media already existed", body = UploadedMedia),
        (status = 400, description = "Missing, oversized or unsupported file"),
        (status = 429, description = "Too many uploads")
    )
)]
pub async fn upload_media(
    req: HttpRequest,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    data.limit(Action::Media, &req)?;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::warn!("multipart error: {e}");
        ApiError::validation("malformed multipart body")
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::warn!("multipart stream error: {e}");
            ApiError::validation("malformed multipart body")
        })? {
            if bytes.len() + chunk.len() > MAX_MEDIA_BYTES {
                return Err(ApiError::validation("file exceeds 10 MiB"));
            }
            bytes.extend_from_slice(&chunk);
        }
        let stored = media::ingest(data.media.as_ref(), &bytes).await?;
        let status = if stored.duplicate { StatusCode::OK } else { StatusCode::CREATED };
        return Ok(HttpResponse::build(status).json(stored));
    }
    Err(ApiError::validation("multipart field `file` is required"))
}

pub async fn get_media(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    match data.media.load(&path.into_inner()).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .insert_header(("Cache-Control", "public, max-age=31536000, immutable"))
            .body(bytes)),
        Err(MediaStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("media load error: {e}");
            Err(ApiError::Internal)
        }
    }
}

pub async fn metrics_endpoint(data: web::Data<AppState>) -> HttpResponse {
    match &data.metrics {
        Some(handle) => HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}
