//! Pre-shared API key check for the protected gateway routes.
//!
//! The key may arrive as `X-API-Key`, `Authorization: Bearer <key>`, or an
//! `api_key` query parameter, checked in that order. With no key configured
//! the protected routes refuse every request.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::Query,
    http::{Request, Response},
    response::IntoResponse,
};
use subtle::ConstantTimeEq;
use tower::{Layer, Service};

use crate::error::ApiError;

// ---------------------------------------------------------------------------
// AuthLayer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AuthLayer {
    api_key: Option<Arc<String>>,
}

impl AuthLayer {
    /// `None` or an empty key leaves the protected routes failing closed.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::new),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            api_key: self.api_key.clone(),
        }
    }
}

/// Key presented by the caller, if any. Empty values at one source do not
/// hide a key at the next.
fn presented_key(req: &Request<Body>) -> Option<String> {
    let headers = req.headers();
    let non_empty = |k: &String| !k.is_empty();
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(non_empty)
        .or_else(|| {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string())
                .filter(non_empty)
        })
        .or_else(|| {
            Query::<HashMap<String, String>>::try_from_uri(req.uri())
                .ok()
                .and_then(|Query(mut q)| q.remove("api_key"))
                .filter(non_empty)
        })
}

fn check(expected: Option<&str>, provided: Option<&str>) -> Result<(), ApiError> {
    let expected = expected.ok_or(ApiError::ApiKeyNotConfigured)?;
    let provided = provided.ok_or(ApiError::MissingApiKey)?;
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiError::InvalidApiKey)
    }
}

// ---------------------------------------------------------------------------
// AuthMiddleware
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    api_key: Option<Arc<String>>,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let api_key = self.api_key.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let provided = presented_key(&req);
            match check(api_key.as_deref().map(String::as_str), provided.as_deref()) {
                Ok(()) => inner.call(req).await,
                Err(e) => {
                    tracing::warn!(
                        path = %req.uri().path(),
                        code = e.code(),
                        "request rejected"
                    );
                    Ok(e.into_response())
                }
            }
        })
    }
}
