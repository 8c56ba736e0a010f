use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use actix_web::Error;
use futures_util::future::{ready, LocalBoxFuture, Ready};

/// Posts carry user photos and clips, so `img-src` and `media-src` also
/// admit `data:` and `blob:` previews produced by the upload form.
const CSP: &str = "default-src 'self'; img-src 'self' data: blob:; media-src 'self' data: blob:; \
                   object-src 'none'; base-uri 'none'; frame-ancestors 'none'; form-action 'self'";

const BASELINE: [(HeaderName, &str); 6] = [
    (header::CONTENT_SECURITY_POLICY, CSP),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "0"),
    (header::PERMISSIONS_POLICY, "camera=(self), microphone=(), geolocation=()"),
];

const HSTS: &str = "max-age=63072000; includeSubDomains; preload";

/// Response hardening middleware. Headers a handler already set are left alone.
#[derive(Clone, Default)]
pub struct SecurityHeaders {
    pub enable_hsts: bool,
}

impl SecurityHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// HSTS only makes sense behind TLS, so it stays off unless asked for.
    pub fn with_hsts(mut self, enable: bool) -> Self {
        self.enable_hsts = enable;
        self
    }

    fn apply(&self, headers: &mut HeaderMap) {
        let hsts = self.enable_hsts.then_some((header::STRICT_TRANSPORT_SECURITY, HSTS));
        for (name, value) in BASELINE.into_iter().chain(hsts) {
            if !headers.contains_key(&name) {
                headers.insert(name, HeaderValue::from_static(value));
            }
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityHeadersMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersMiddleware { service: Rc::new(service), headers: self.clone() }))
    }
}

pub struct SecurityHeadersMiddleware<S> {
    service: Rc<S>,
    headers: SecurityHeaders,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let headers = self.headers.clone();
        Box::pin(async move {
            let mut res = svc.call(req).await?;
            headers.apply(res.response_mut().headers_mut());
            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_missing_headers_only() {
        let mut map = HeaderMap::new();
        map.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        SecurityHeaders::new().apply(&mut map);
        assert_eq!(map.get(header::X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
        assert_eq!(map.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert!(map.get(header::STRICT_TRANSPORT_SECURITY).is_none());

        SecurityHeaders::new().with_hsts(true).apply(&mut map);
        assert_eq!(map.get(header::STRICT_TRANSPORT_SECURITY).unwrap(), HSTS);
    }
}
