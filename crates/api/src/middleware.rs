use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

/// Shared admin bearer token.
#[derive(Clone)]
pub struct AdminAuth {
    token: Arc<str>,
}

impl AdminAuth {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Constant-time comparison against the configured token.
    fn accepts(&self, presented: &str) -> bool {
        constant_time_eq::constant_time_eq(presented.as_bytes(), self.token.as_bytes())
    }
}

pub async fn admin_middleware(
    State(state): State<AdminAuth>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer(req.headers())?;

    if !state.accepts(token) {
        tracing::debug!("admin token rejected");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn bearer_token_is_extracted_and_trimmed() {
        assert_eq!(extract_bearer(&headers("Bearer abc ")), Ok("abc"));
    }

    #[test]
    fn malformed_authorization_is_unauthorized() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_bearer(&headers("Basic abc")), Err(StatusCode::UNAUTHORIZED));
        assert_eq!(extract_bearer(&headers("Bearer   ")), Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn only_the_exact_token_is_accepted() {
        let auth = AdminAuth::new("s3cret-token");

        assert!(auth.accepts("s3cret-token"));
        assert!(!auth.accepts("s3cret-tokeN"));
        assert!(!auth.accepts("s3cret"));
        assert!(!auth.accepts("s3cret-token-and-more"));
        assert!(!auth.accepts(""));
    }
}
