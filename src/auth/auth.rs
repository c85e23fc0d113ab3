use std::fmt;

use actix_web::{FromRequest, HttpRequest, dev::Payload};
use derive_more::Display;
use futures::future::{Ready, ready};

use crate::error::AppError;

/// Number of trailing token characters used to tell sessions apart in caches.
pub const FINGERPRINT_LEN: usize = 20;

/// Cache discriminator derived from a credential. Not a security boundary:
/// the ERP is the one that accepts or rejects the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct TokenFingerprint(String);

impl TokenFingerprint {
    pub fn of(token: &str) -> Self {
        let skip = token.chars().count().saturating_sub(FINGERPRINT_LEN);
        Self(token.chars().skip(skip).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Opaque ERP session token taken from `Authorization: Bearer <token>`.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> TokenFingerprint {
        TokenFingerprint::of(&self.0)
    }
}

// Never print the credential itself.
impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(..{})", self.fingerprint())
    }
}

/// Extracts the token from a header value, accepting any casing of `Bearer`.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, rest) = header.trim().split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequest for BearerToken {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_bearer);

        match token {
            Some(t) => ready(Ok(BearerToken(t.to_string()))),
            None => ready(Err(AppError::BadRequest(
                "Missing Authorization header with Bearer token".to_string(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn fingerprint_keeps_last_twenty_chars() {
        let fp = TokenFingerprint::of("0123456789abcdefghijKLMNOPQRSTUVWXYZ");
        assert_eq!(fp.as_str(), "ghijKLMNOPQRSTUVWXYZ");
        assert_eq!(TokenFingerprint::of("short").as_str(), "short");
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer   abc "), Some("abc"));
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("abc"), None);
    }

    #[test]
    fn debug_output_hides_the_token() {
        let token = BearerToken::new("super-secret-session-token-value");
        let shown = format!("{token:?}");
        assert!(!shown.contains("super-secret"));
    }

    #[actix_web::test]
    async fn extractor_rejects_missing_header() {
        let req = TestRequest::default().to_http_request();
        let err = BearerToken::extract(&req).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer tok-123"))
            .to_http_request();
        assert_eq!(BearerToken::extract(&req).await.unwrap().as_str(), "tok-123");
    }
}
