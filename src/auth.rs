use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Id, User};
use crate::repo::RepoError;
use crate::routes::AppState;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "auth";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Issues and verifies session tokens (HS256).
#[derive(Clone)]
pub struct SessionSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
    secure_cookie: bool,
}

impl SessionSigner {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            secure_cookie: false,
        }
    }

    pub fn with_secure_cookie(mut self, secure: bool) -> Self {
        self.secure_cookie = secure;
        self
    }

    pub fn issue(&self, user_id: Id) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + self.ttl).timestamp().max(0) as usize;
        let claims = Claims { sub: user_id.to_string(), exp };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Validate a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .max_age(CookieDuration::seconds(self.ttl.num_seconds()))
            .finish()
    }

    pub fn expired_cookie(&self) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .max_age(CookieDuration::ZERO)
            .finish()
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Checks a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else { return false };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Cookie first, then `Authorization: Bearer`.
fn session_token(req: &HttpRequest, pl: &mut Payload) -> Option<String> {
    if let Some(c) = req.cookie(SESSION_COOKIE) {
        if !c.value().is_empty() {
            return Some(c.value().to_string());
        }
    }
    BearerAuth::from_request(req, pl)
        .into_inner()
        .ok()
        .map(|bearer| bearer.token().to_string())
}

/// The requesting user, if any. Never rejects: a missing, malformed or
/// expired token, or one naming a deleted account, resolves to `None`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

impl CurrentUser {
    pub fn user(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let token = session_token(req, pl);
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let Some(state) = state else {
                log::error!("AppState missing from app data");
                return Err(ApiError::Internal);
            };
            let Some(token) = token else { return Ok(CurrentUser(None)) };
            let Ok(claims) = state.session.verify(&token) else { return Ok(CurrentUser(None)) };
            let Ok(user_id) = claims.sub.parse::<Id>() else { return Ok(CurrentUser(None)) };
            match state.repo.get_user(user_id).await {
                Ok(user) => Ok(CurrentUser(Some(user))),
                Err(RepoError::NotFound) => Ok(CurrentUser(None)),
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Extractor for routes that need a signed-in user; rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let current = CurrentUser::from_request(req, pl);
        Box::pin(async move { current.await?.0.map(AuthUser).ok_or(ApiError::Unauthorized) })
    }
}

/// Resolve the acting moderator or bail out of the handler.
#[macro_export]
macro_rules! require_moderator {
    ($user:expr) => {
        match $user {
            Some(u) if u.is_moderator => u,
            _ => return Err($crate::error::ApiError::Forbidden),
        }
    };
}
