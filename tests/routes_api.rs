#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use eco_leveling::config;
use eco_leveling::models::PostStatus;
use eco_leveling::repo::inmem::InMemRepo;
use eco_leveling::repo::{PostRepo, UserRepo};
use serde_json::{json, Value};

macro_rules! app {
    ($state:expr) => {
        test::init_service(App::new().app_data(web::Data::new($state.clone())).configure(config)).await
    };
}

async fn body_json(resp: actix_web::dev::ServiceResponse) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

#[actix_web::test]
async fn quest_approval_and_like_scenario() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);

    let alice = common::user(&repo, "Alice").await;
    let bob = common::user(&repo, "Bob").await;
    let moderator = common::moderator(&repo, "Mod").await;
    let alice_c = common::session_cookie(&state, &alice);
    let bob_c = common::session_cookie(&state, &bob);
    let mod_c = common::session_cookie(&state, &moderator);

    // submit: pending, hidden from the feed
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice_c.clone())
        .set_json(json!({"body": "cleaned the park", "image_url": "/media/abc", "quest_id": "pick-litter"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let receipt = body_json(resp).await;
    assert_eq!(receipt["status"], "pending");
    let post_id = receipt["id"].as_str().unwrap().to_string();

    let feed = body_json(test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await).await;
    assert_eq!(feed.as_array().unwrap().len(), 0);

    // moderator sees it in the queue and approves
    let req = test::TestRequest::get().uri("/api/posts/moderation").cookie(mod_c.clone()).to_request();
    let queue = body_json(test::call_service(&app, req).await).await;
    assert_eq!(queue[0]["id"], post_id.as_str());

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/moderate"))
        .cookie(mod_c.clone())
        .set_json(json!({"decision": "approve"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await["status"], "approved");
    assert_eq!(repo.get_user(alice.id).await.unwrap().points, 10);

    let feed = body_json(test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await).await;
    assert_eq!(feed.as_array().unwrap().len(), 1);
    assert_eq!(feed[0]["author_name"], "Alice");

    // like, then unlike
    let like = |c| test::TestRequest::post().uri(&format!("/api/posts/{post_id}/like")).cookie(c).to_request();
    let first = body_json(test::call_service(&app, like(bob_c.clone())).await).await;
    assert_eq!(first, json!({"liked": true, "likes": 1}));
    assert_eq!(repo.get_user(alice.id).await.unwrap().points, 11);

    // likers stay private in every listing
    let feed = body_json(test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await).await;
    assert_eq!(feed[0]["likes"], 1);
    assert!(feed[0].get("liked_by").is_none());
    let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}")).to_request();
    let single = body_json(test::call_service(&app, req).await).await;
    assert!(single.get("liked_by").is_none());

    let second = body_json(test::call_service(&app, like(bob_c.clone())).await).await;
    assert_eq!(second, json!({"liked": false, "likes": 0}));
    assert_eq!(repo.get_user(alice.id).await.unwrap().points, 10);

    // a second decision is rejected and credits nothing
    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/moderate"))
        .cookie(mod_c)
        .set_json(json!({"decision": "approve"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);
    assert_eq!(repo.get_user(alice.id).await.unwrap().points, 10);

    // leaderboard: only Alice has approved attributed posts
    let board = body_json(test::call_service(&app, test::TestRequest::get().uri("/api/leaderboard").to_request()).await).await;
    let board = board.as_array().unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0]["name"], "Alice");
    assert_eq!(board[0]["handle"], "@alice");
    assert_eq!(board[0]["points"], 10);
    assert_eq!(board[0]["posts"], 1);
}

#[actix_web::test]
async fn non_moderator_cannot_moderate() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let alice = common::user(&repo, "Alice").await;
    let alice_c = common::session_cookie(&state, &alice);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice_c.clone())
        .set_json(json!({"body": "my bottle", "media_url": "/media/x", "quest_id": "reusable-bottle"}))
        .to_request();
    let id: uuid::Uuid = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().parse().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{id}/moderate"))
        .cookie(alice_c.clone())
        .set_json(json!({"decision": "approve"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::get().uri("/api/posts/moderation").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let post = repo.get_post(id).await.unwrap();
    assert_eq!(post.status, Some(PostStatus::Pending));
    assert_eq!(repo.get_user(alice.id).await.unwrap().points, 0);
}

#[actix_web::test]
async fn decline_records_reason_without_points() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let alice = common::user(&repo, "Alice").await;
    let moderator = common::moderator(&repo, "Mod").await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(common::session_cookie(&state, &alice))
        .set_json(json!({"body": "b", "media_url": "/media/x", "quest_id": "before-after-cleanup"}))
        .to_request();
    let id = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{id}/moderate"))
        .cookie(common::session_cookie(&state, &moderator))
        .set_json(json!({"decision": "decline", "reason": "blurry photo"}))
        .to_request();
    let decided = body_json(test::call_service(&app, req).await).await;
    assert_eq!(decided["status"], "declined");
    assert_eq!(decided["decline_reason"], "blurry photo");
    assert_eq!(repo.get_user(alice.id).await.unwrap().points, 0);

    // declined posts are invisible to strangers but not to their author
    let req = test::TestRequest::get().uri(&format!("/api/posts/{id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::get()
        .uri(&format!("/api/posts/{id}"))
        .cookie(common::session_cookie(&state, &alice))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn anonymous_posts_hide_author_and_skip_leaderboard() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let alice = common::user(&repo, "Alice").await;
    let moderator = common::moderator(&repo, "Mod").await;
    let mod_c = common::session_cookie(&state, &moderator);

    // signed in but anonymous, and signed out
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(common::session_cookie(&state, &alice))
        .set_json(json!({"body": "quiet", "media_url": "/media/a", "anonymous": true, "quest_id": "plant-care"}))
        .to_request();
    let signed_in = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .set_json(json!({"body": "drive-by", "media_url": "/media/b"}))
        .to_request();
    let signed_out = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();

    for id in [&signed_in, &signed_out] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/posts/{id}/moderate"))
            .cookie(mod_c.clone())
            .set_json(json!({"decision": "approve"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    let feed = body_json(test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await).await;
    for p in feed.as_array().unwrap() {
        assert_eq!(p["anonymous"], true);
        assert!(p["author_id"].is_null());
        assert!(p["author_name"].is_null());
    }
    // quest points still reach the hidden author
    assert_eq!(repo.get_user(alice.id).await.unwrap().points, 10);

    let board = body_json(test::call_service(&app, test::TestRequest::get().uri("/api/leaderboard").to_request()).await).await;
    assert!(board.as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn like_requires_session_and_visible_post() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let bob = common::user(&repo, "Bob").await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .set_json(json!({"body": "pending", "media_url": "/media/p"}))
        .to_request();
    let id = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post().uri(&format!("/api/posts/{id}/like")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{id}/like"))
        .cookie(common::session_cookie(&state, &bob))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn submission_validation() {
    let repo = InMemRepo::new();
    let app = app!(common::state(&repo));

    let cases = [
        json!({"body": "   ", "media_url": "/media/x"}),
        json!({"body": "no media"}),
        json!({"body": "blank media", "video_url": "  "}),
    ];
    for payload in cases {
        let req = test::TestRequest::post().uri("/api/posts").set_json(payload).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        assert!(body_json(resp).await["error"].is_string());
    }

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn comments_and_cascade_delete() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let alice = common::user(&repo, "Alice").await;
    let bob = common::user(&repo, "Bob").await;
    let moderator = common::moderator(&repo, "Mod").await;
    let alice_c = common::session_cookie(&state, &alice);
    let bob_c = common::session_cookie(&state, &bob);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice_c.clone())
        .set_json(json!({"body": "compost bin", "media_url": "/media/c"}))
        .to_request();
    let post_id = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();
    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/moderate"))
        .cookie(common::session_cookie(&state, &moderator))
        .set_json(json!({"decision": "approve"}))
        .to_request();
    test::call_service(&app, req).await;

    for (cookie, body) in [(Some(bob_c.clone()), "nice"), (None, "agreed")] {
        let mut req = test::TestRequest::post().uri("/api/comments");
        if let Some(c) = cookie {
            req = req.cookie(c);
        }
        let resp = test::call_service(&app, req.set_json(json!({"post_id": post_id, "body": body})).to_request()).await;
        assert_eq!(resp.status(), 201);
    }

    let req = test::TestRequest::get().uri(&format!("/api/comments/by-post/{post_id}")).to_request();
    let comments = body_json(test::call_service(&app, req).await).await;
    let comments = comments.as_array().unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[0]["body"], "nice");
    assert_eq!(comments[0]["author_name"], "Bob");
    assert_eq!(comments[1]["anonymous"], true);
    assert_eq!(repo.get_post(post_id.parse().unwrap()).await.unwrap().comments, 2);

    // strangers cannot delete; the author can
    let req = test::TestRequest::delete().uri(&format!("/api/posts/{post_id}")).cookie(bob_c).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    let req = test::TestRequest::delete().uri(&format!("/api/posts/{post_id}")).cookie(alice_c).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/comments/by-post/{post_id}")).to_request();
    assert_eq!(body_json(test::call_service(&app, req).await).await, json!([]));
    let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn comment_on_missing_post_is_not_found() {
    let repo = InMemRepo::new();
    let app = app!(common::state(&repo));
    let req = test::TestRequest::post()
        .uri("/api/comments")
        .set_json(json!({"post_id": uuid::Uuid::new_v4(), "body": "hello?"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn comment_edit_and_delete_permissions() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let alice = common::user(&repo, "Alice").await;
    let bob = common::user(&repo, "Bob").await;
    let moderator = common::moderator(&repo, "Mod").await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(common::session_cookie(&state, &alice))
        .set_json(json!({"body": "b", "media_url": "/media/m"}))
        .to_request();
    let post_id = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();
    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/moderate"))
        .cookie(common::session_cookie(&state, &moderator))
        .set_json(json!({"decision": "approve"}))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::post()
        .uri("/api/comments")
        .cookie(common::session_cookie(&state, &bob))
        .set_json(json!({"post_id": post_id, "body": "first"}))
        .to_request();
    let comment_id = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();

    let edit = |c| {
        test::TestRequest::patch()
            .uri(&format!("/api/comments/{comment_id}"))
            .cookie(c)
            .set_json(json!({"body": "edited"}))
            .to_request()
    };
    assert_eq!(test::call_service(&app, edit(common::session_cookie(&state, &alice))).await.status(), 403);
    let resp = test::call_service(&app, edit(common::session_cookie(&state, &bob))).await;
    assert_eq!(body_json(resp).await["body"], "edited");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/comments/{comment_id}"))
        .cookie(common::session_cookie(&state, &moderator))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    assert_eq!(repo.get_post(post_id.parse().unwrap()).await.unwrap().comments, 0);
}

#[actix_web::test]
async fn rename_refreshes_author_snapshots() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let alice = common::user(&repo, "Alice").await;
    common::user(&repo, "Taken").await;
    let alice_c = common::session_cookie(&state, &alice);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(alice_c.clone())
        .set_json(json!({"body": "b", "media_url": "/media/r"}))
        .to_request();
    let post_id = body_json(test::call_service(&app, req).await).await["id"].as_str().unwrap().to_string();

    let rename = |name: &str| {
        test::TestRequest::patch()
            .uri("/api/users/me")
            .cookie(alice_c.clone())
            .set_json(json!({"name": name, "school": "Riverside High"}))
            .to_request()
    };
    assert_eq!(test::call_service(&app, rename("Taken")).await.status(), 409);
    assert_eq!(test::call_service(&app, rename("Al")).await.status(), 400);
    let resp = test::call_service(&app, rename("Alicia")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(body_json(resp).await["school"], "Riverside High");

    let post = repo.get_post(post_id.parse().unwrap()).await.unwrap();
    assert_eq!(post.author_name.as_deref(), Some("Alicia"));

    let req = test::TestRequest::get().uri(&format!("/api/users/{}", alice.id)).to_request();
    let profile = body_json(test::call_service(&app, req).await).await;
    assert_eq!(profile["handle"], "@alicia");
    assert!(profile.get("password_hash").is_none());
    assert!(profile.get("is_moderator").is_none());
}

#[actix_web::test]
async fn quests_today_lists_three() {
    let repo = InMemRepo::new();
    let app = app!(common::state(&repo));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/quests/today").to_request()).await;
    assert_eq!(resp.status(), 200);
    let v = body_json(resp).await;
    assert_eq!(v["date"], chrono::Utc::now().format("%Y-%m-%d").to_string());
    let quests = v["quests"].as_array().unwrap();
    assert_eq!(quests.len(), 3);
    assert!(quests.iter().all(|q| q["points"].as_i64().unwrap() > 0));
}

#[actix_web::test]
async fn audits_are_moderator_only() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = app!(state);
    let alice = common::user(&repo, "Alice").await;
    let moderator = common::moderator(&repo, "Mod").await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(common::session_cookie(&state, &alice))
        .insert_header(("user-agent", "eco-test"))
        .set_json(json!({"body": "b", "media_url": "/media/q"}))
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/api/audits").cookie(common::session_cookie(&state, &alice)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::get()
        .uri("/api/audits?limit=10")
        .cookie(common::session_cookie(&state, &moderator))
        .to_request();
    let audits = body_json(test::call_service(&app, req).await).await;
    assert_eq!(audits[0]["action"], "post.create");
    assert_eq!(audits[0]["actor_name"], "Alice");
    assert_eq!(audits[0]["user_agent"], "eco-test");
}
