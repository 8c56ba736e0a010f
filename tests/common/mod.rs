#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use actix_web::cookie::Cookie;
use eco_leveling::auth::{SessionSigner, SESSION_COOKIE};
use eco_leveling::media::{MediaStore, MediaStoreError};
use eco_leveling::models::{NewUser, User};
use eco_leveling::repo::inmem::InMemRepo;
use eco_leveling::repo::UserRepo;
use eco_leveling::AppState;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

#[derive(Default)]
pub struct MockMediaStore {
    inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

#[async_trait::async_trait]
impl MediaStore for MockMediaStore {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        let mut m = self.inner.lock().unwrap();
        if m.contains_key(hash) {
            return Err(MediaStoreError::Duplicate);
        }
        m.insert(hash.to_string(), (bytes.to_vec(), mime.to_string()));
        Ok(())
    }
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        self.inner.lock().unwrap().get(hash).cloned().ok_or(MediaStoreError::NotFound)
    }
}

pub fn signer() -> SessionSigner {
    SessionSigner::new(SECRET, chrono::Duration::hours(1))
}

/// App state over a fresh in-memory repo, no rate limiting.
pub fn state(repo: &InMemRepo) -> AppState {
    AppState::new(Arc::new(repo.clone()), Arc::new(MockMediaStore::default()), signer())
}

/// Insert a user directly, bypassing registration. The password hash is
/// not valid, so these users cannot log in with a password.
pub async fn user(repo: &InMemRepo, name: &str) -> User {
    repo.create_user(NewUser { name: name.into(), password_hash: "-".into(), profile_pic_url: None })
        .await
        .unwrap()
}

pub async fn moderator(repo: &InMemRepo, name: &str) -> User {
    let u = user(repo, name).await;
    repo.set_moderator(u.id, true).await.unwrap()
}

pub fn session_cookie(state: &AppState, user: &User) -> Cookie<'static> {
    Cookie::new(SESSION_COOKIE, state.session.issue(user.id).unwrap())
}
