use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Sign-in failed: {0}")]
    SignInFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error envelope returned by both the document store and the auth service.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
        let detail = envelope
            .as_ref()
            .map(|e| Self::truncate_body(&e.error.message))
            .unwrap_or_else(|| Self::truncate_body(body));

        // The store's canonical status wins over the HTTP code when present
        if let Some(code) = envelope.as_ref().and_then(|e| e.error.status.as_deref()) {
            match code {
                "PERMISSION_DENIED" => return ApiError::PermissionDenied(detail),
                "UNAUTHENTICATED" => return ApiError::Unauthorized,
                "INVALID_ARGUMENT" | "FAILED_PRECONDITION" => return ApiError::InvalidArgument(detail),
                "NOT_FOUND" => return ApiError::NotFound(detail),
                "ALREADY_EXISTS" => return ApiError::AlreadyExists(detail),
                "RESOURCE_EXHAUSTED" => return ApiError::RateLimited,
                "UNAVAILABLE" | "DEADLINE_EXCEEDED" => return ApiError::Unavailable(detail),
                _ => {}
            }
        }

        match status.as_u16() {
            400 => ApiError::InvalidArgument(detail),
            401 => ApiError::Unauthorized,
            403 => ApiError::PermissionDenied(detail),
            404 => ApiError::NotFound(detail),
            409 => ApiError::AlreadyExists(detail),
            429 => ApiError::RateLimited,
            503 => ApiError::Unavailable(detail),
            500..=599 => ApiError::ServerError(detail),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, detail)),
        }
    }

    /// Map an auth-service failure. Credential problems arrive as 400 with a
    /// message code such as `INVALID_PASSWORD` rather than as a 401.
    pub fn from_auth_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status.as_u16() == 400 {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
                let code = envelope.error.message;
                let code_name = code.split(' ').next().unwrap_or_default().to_string();
                match code_name.as_str() {
                    "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS"
                    | "USER_DISABLED" | "INVALID_EMAIL" | "WEAK_PASSWORD" => {
                        return ApiError::SignInFailed(code)
                    }
                    "EMAIL_EXISTS" => return ApiError::AlreadyExists(code),
                    "TOO_MANY_ATTEMPTS_TRY_LATER" => return ApiError::RateLimited,
                    "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN" => {
                        return ApiError::Unauthorized
                    }
                    _ => {}
                }
            }
        }
        Self::from_status(status, body)
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited | ApiError::Unavailable(_) | ApiError::NetworkError(_)
        )
    }

    /// Short Bengali message for the status bar.
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::PermissionDenied(_) => "এই কাজের অনুমতি আপনার নেই",
            ApiError::Unauthorized => "সেশনের মেয়াদ শেষ, আবার লগইন করুন",
            ApiError::SignInFailed(_) => "ইমেইল বা পাসওয়ার্ড ভুল",
            ApiError::NotFound(_) => "তথ্য পাওয়া যায়নি",
            ApiError::AlreadyExists(_) => "এই তথ্য ইতিমধ্যে আছে",
            ApiError::InvalidArgument(_) => "প্রদত্ত তথ্য সঠিক নয়",
            ApiError::RateLimited => "অনেক বেশি অনুরোধ, কিছুক্ষণ পর আবার চেষ্টা করুন",
            ApiError::Unavailable(_) | ApiError::NetworkError(_) => {
                "সার্ভার এই মুহূর্তে পাওয়া যাচ্ছে না, পরে আবার চেষ্টা করুন"
            }
            ApiError::ServerError(_) | ApiError::InvalidResponse(_) => {
                "একটি ত্রুটি ঘটেছে, আবার চেষ্টা করুন"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_prefers_store_status() {
        let body = r#"{"error":{"code":400,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#;
        match ApiError::from_status(StatusCode::BAD_REQUEST, body) {
            ApiError::PermissionDenied(msg) => assert_eq!(msg, "Missing or insufficient permissions."),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_status_http_fallback() {
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "down"), ApiError::Unavailable(_)));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, "oops"), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::IM_A_TEAPOT, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_from_auth_status() {
        let body = r#"{"error":{"code":400,"message":"INVALID_LOGIN_CREDENTIALS","errors":[]}}"#;
        assert!(matches!(
            ApiError::from_auth_status(StatusCode::BAD_REQUEST, body),
            ApiError::SignInFailed(_)
        ));
        let body = r#"{"error":{"code":400,"message":"TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"}}"#;
        assert!(matches!(ApiError::from_auth_status(StatusCode::BAD_REQUEST, body), ApiError::RateLimited));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "ত".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_user_messages_are_bengali() {
        assert_eq!(ApiError::RateLimited.user_message(), "অনেক বেশি অনুরোধ, কিছুক্ষণ পর আবার চেষ্টা করুন");
        assert!(ApiError::RateLimited.is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
    }
}
