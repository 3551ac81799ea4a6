use serde_json::Value;
use uuid::Uuid;

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Fallback for callers that cannot set headers: a `token` string field in
/// the JSON body.
pub fn body_token(body: Option<&Value>) -> Option<&str> {
    body?
        .get("token")?
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Header first, then body.
pub fn extract<'a>(header: Option<&'a str>, body: Option<&'a Value>) -> Option<&'a str> {
    bearer_token(header).or_else(|| body_token(body))
}

/// A fresh opaque device credential (64 hex chars).
pub fn generate() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bearer_header_is_parsed() {
        assert_eq!(bearer_token(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(bearer_token(Some("bearer  abc123 ")), Some("abc123"));
    }

    #[test]
    fn non_bearer_or_empty_header_is_ignored() {
        assert_eq!(bearer_token(None), None);
        assert_eq!(bearer_token(Some("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("abc123")), None);
    }

    #[test]
    fn body_token_fallback() {
        let body = json!({ "token": "abc", "temperature": 20.0 });
        assert_eq!(body_token(Some(&body)), Some("abc"));
        assert_eq!(body_token(Some(&json!({ "token": 5 }))), None);
        assert_eq!(body_token(Some(&json!({ "token": "" }))), None);
        assert_eq!(body_token(None), None);
    }

    #[test]
    fn header_wins_over_body() {
        let body = json!({ "token": "from-body" });
        assert_eq!(extract(Some("Bearer from-header"), Some(&body)), Some("from-header"));
        assert_eq!(extract(Some("Basic x"), Some(&body)), Some("from-body"));
        assert_eq!(extract(None, None), None);
    }

    #[test]
    fn generated_credentials_are_unique_hex() {
        let a = generate();
        let b = generate();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
