//! Input validation for `/analyze` bodies.  Runs before any engine resource
//! is acquired and has no side effects.

use serde_json::{Map, Value};

use crate::options::is_truthy;

/// Caller errors.  The display strings are the stable `error` field of the
/// 400 response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInput {
    #[error("URL is required")]
    MissingUrl,
    #[error("Invalid URL format")]
    MalformedUrl,
}

/// A request that passed validation.  `url` is the caller's string,
/// unmodified; `options` is the raw options object.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub url: String,
    pub options: Map<String, Value>,
}

pub fn validate(body: &Value) -> Result<ValidatedRequest, InvalidInput> {
    let url = match body.get("url") {
        Some(v) if is_truthy(v) => v,
        _ => return Err(InvalidInput::MissingUrl),
    };
    // Truthy non-strings, arrays included, are never coerced to a string.
    let url = url.as_str().ok_or(InvalidInput::MalformedUrl)?;
    if !has_host(url) {
        return Err(InvalidInput::MalformedUrl);
    }

    // Anything other than an object carries no usable options.
    let options = match body.get("options") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };

    Ok(ValidatedRequest {
        url: url.to_string(),
        options,
    })
}

fn has_host(raw: &str) -> bool {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| !h.is_empty()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_or_falsy_url_is_required() {
        for body in [
            json!({}),
            json!({"url": null}),
            json!({"url": ""}),
            json!({"url": false}),
            json!({"url": 0}),
            json!([]),
        ] {
            assert_eq!(validate(&body), Err(InvalidInput::MissingUrl), "{}", body);
        }
    }

    #[test]
    fn malformed_urls_are_rejected() {
        for body in [
            json!({"url": "not-a-url"}),
            json!({"url": "example.com"}),
            json!({"url": "mailto:someone@example.com"}),
            json!({"url": "file:///etc/passwd"}),
            json!({"url": "http://"}),
            json!({"url": 42}),
            json!({"url": {"href": "https://example.com"}}),
            json!({"url": ["https://example.com"]}),
        ] {
            assert_eq!(validate(&body), Err(InvalidInput::MalformedUrl), "{}", body);
        }
    }

    #[test]
    fn valid_url_is_forwarded_verbatim() {
        let req = validate(&json!({"url": "HTTPS://Example.com"})).unwrap();
        assert_eq!(req.url, "HTTPS://Example.com");
        assert!(req.options.is_empty());
    }

    #[test]
    fn options_object_is_kept_and_others_dropped() {
        let req = validate(&json!({"url": "https://example.com", "options": {"delay": 1}})).unwrap();
        assert_eq!(req.options.get("delay"), Some(&json!(1)));

        let req = validate(&json!({"url": "https://example.com", "options": "fast"})).unwrap();
        assert!(req.options.is_empty());
        let req = validate(&json!({"url": "https://example.com", "options": null})).unwrap();
        assert!(req.options.is_empty());
    }

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(InvalidInput::MissingUrl.to_string(), "URL is required");
        assert_eq!(InvalidInput::MalformedUrl.to_string(), "Invalid URL format");
    }
}
