use crate::leaderboard::LeaderboardEntry;
use crate::media::UploadedMedia;
use crate::models::{
    AuditEntry, Comment, LikeToggle, ModerationDecision, Post, PostStatus, PostUpdate, ProfileUpdate, PublicProfile,
    User,
};
use crate::moderation::{ModerateRequest, SubmitPost, SubmitReceipt};
use crate::quests::Quest;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::auth_me,
        crate::routes::list_feed,
        crate::routes::create_post,
        crate::routes::list_pending,
        crate::routes::moderate_post,
        crate::routes::toggle_like,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::list_posts_by_author,
        crate::routes::list_comments,
        crate::routes::create_comment,
        crate::routes::get_comment,
        crate::routes::update_comment,
        crate::routes::delete_comment,
        crate::routes::get_me,
        crate::routes::update_me,
        crate::routes::delete_me,
        crate::routes::my_posts,
        crate::routes::get_user_profile,
        crate::routes::quests_today,
        crate::routes::get_leaderboard,
        crate::routes::list_audits,
        crate::routes::upload_media,
    ),
    components(schemas(
        User, PublicProfile, ProfileUpdate,
        Post, PostStatus, PostUpdate, ModerationDecision, LikeToggle,
        Comment, AuditEntry, Quest, LeaderboardEntry, UploadedMedia,
        SubmitPost, SubmitReceipt, ModerateRequest,
        crate::routes::RegisterRequest, crate::routes::LoginRequest, crate::routes::SessionInfo,
        crate::routes::CreateComment, crate::routes::EditComment, crate::routes::QuestsToday
    )),
    tags(
        (name = "posts", description = "Submission, moderation and likes"),
        (name = "comments", description = "Comment operations"),
        (name = "users", description = "Accounts and profiles"),
    )
)]
pub struct ApiDoc;
