#![cfg(feature = "inmem-store")]

mod common;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::{test, web, App};
use eco_leveling::auth::SESSION_COOKIE;
use eco_leveling::repo::inmem::InMemRepo;
use eco_leveling::repo::UserRepo;
use eco_leveling::{config, AppState};
use serde_json::{json, Value};

/// Register through the API, log in and hand back the session cookie.
macro_rules! register_and_login {
    ($app:expr, $name:expr, $password:expr) => {{
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({"name": $name, "password": $password}))
            .to_request();
        assert_eq!(test::call_service($app, req).await.status(), 201);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"name": $name, "password": $password}))
            .to_request();
        let resp = test::call_service($app, req).await;
        assert_eq!(resp.status(), 200);
        let cookie: Cookie<'static> = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .expect("login sets the session cookie")
            .into_owned();
        assert_eq!(cookie.http_only(), Some(true));
        cookie
    }};
}

#[actix_web::test]
async fn register_login_me_logout() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let cookie = register_and_login!(&app, "Green Alice", "s3cret");

    let req = test::TestRequest::get().uri("/api/auth/me").cookie(cookie.clone()).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let me: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(me["name"], "Green Alice");
    assert_eq!(me["points"], 0);
    assert_eq!(me["is_moderator"], false);
    assert!(me.get("password_hash").is_none());

    let req = test::TestRequest::post().uri("/api/auth/logout").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    let cleared = resp.response().cookies().find(|c| c.name() == SESSION_COOKIE).unwrap();
    assert_eq!(cleared.max_age(), Some(CookieDuration::ZERO));
}

#[actix_web::test]
async fn bearer_header_is_accepted() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({"name": "bob", "password": "pw123"}))
        .to_request();
    test::call_service(&app, req).await;
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({"name": "bob", "password": "pw123"}))
        .to_request();
    let login: Value = test::call_and_read_body_json(&app, req).await;
    let token = login["token"].as_str().unwrap();

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn registration_rules() {
    let repo = InMemRepo::new();
    let app = test::init_service(App::new().app_data(web::Data::new(common::state(&repo))).configure(config)).await;

    let register = |name: &str, password: &str| {
        test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({"name": name, "password": password}))
            .to_request()
    };
    assert_eq!(test::call_service(&app, register("ab", "long-enough")).await.status(), 400);
    assert_eq!(test::call_service(&app, register("carol", "pw")).await.status(), 400);
    assert_eq!(test::call_service(&app, register("carol", "pw1")).await.status(), 201);
    assert_eq!(test::call_service(&app, register("carol", "other")).await.status(), 409);

    let stored = repo.find_user_by_name("carol").await.unwrap();
    assert!(stored.password_hash.starts_with("$argon2"));
}

#[actix_web::test]
async fn bad_credentials_are_unauthorized() {
    let repo = InMemRepo::new();
    let app = test::init_service(App::new().app_data(web::Data::new(common::state(&repo))).configure(config)).await;
    register_and_login!(&app, "dave", "right");

    for (name, password) in [("dave", "wrong"), ("nobody", "right")] {
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"name": name, "password": password}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }
}

#[actix_web::test]
async fn invalid_sessions_resolve_to_anonymous() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;

    let garbage = Cookie::new(SESSION_COOKIE, "not-a-jwt");
    let req = test::TestRequest::get().uri("/api/auth/me").cookie(garbage.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // optional-session routes keep working with a broken cookie
    let req = test::TestRequest::get().uri("/api/posts").cookie(garbage).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    // a token for a deleted account is no session at all
    let ghost = common::user(&repo, "ghost").await;
    let cookie = common::session_cookie(&state, &ghost);
    repo.delete_user(ghost.id).await.unwrap();
    let req = test::TestRequest::get().uri("/api/auth/me").cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn bootstrap_moderators_are_promoted_on_login() {
    let repo = InMemRepo::new();
    let state: AppState = common::state(&repo).with_bootstrap_moderators(vec!["erin".into()]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let cookie = register_and_login!(&app, "erin", "pw-erin");
    let req = test::TestRequest::get().uri("/api/posts/moderation").cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert!(repo.find_user_by_name("erin").await.unwrap().is_moderator);
}

#[actix_web::test]
async fn deleting_account_clears_session() {
    let repo = InMemRepo::new();
    let state = common::state(&repo);
    let app = test::init_service(App::new().app_data(web::Data::new(state.clone())).configure(config)).await;
    let frank = common::user(&repo, "frank").await;
    let cookie = common::session_cookie(&state, &frank);

    let req = test::TestRequest::delete().uri("/api/users/me").cookie(cookie.clone()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
    let req = test::TestRequest::get().uri("/api/users/me").cookie(cookie).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}
