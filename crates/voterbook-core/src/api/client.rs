//! REST client for the hosted document store and its auth service.
//!
//! `StoreClient` signs in through the identity endpoints and then talks to
//! the store's v1 documents API with the returned bearer token. It
//! implements `DocumentStore`, so the repositories never see HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::codec::{self, RawDocument, RunQueryItem};
use super::ApiError;
use crate::auth::SessionData;
use crate::store::{Document, DocumentStore, FieldFilter, Write};

// ============================================================================
// Constants
// ============================================================================

/// Base URL for the document store REST API
const STORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Base URL for password sign-in and sign-up
const AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Base URL for exchanging refresh tokens
const TOKEN_BASE_URL: &str = "https://securetoken.googleapis.com/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Token lifetime assumed when the auth service omits `expiresIn`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

fn parse_lifetime(expires_in: Option<&str>) -> i64 {
    expires_in
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
}

type ErrorMapper = fn(StatusCode, &str) -> ApiError;

/// Client for one store project.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct StoreClient {
    client: Client,
    project_id: String,
    api_key: String,
    token: Option<String>,
}

impl StoreClient {
    pub fn new(project_id: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            project_id: project_id.into(),
            api_key: api_key.into(),
            token: None,
        })
    }

    /// Set the bearer token for store requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// A copy of this client carrying `token`, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            project_id: self.project_id.clone(),
            api_key: self.api_key.clone(),
            token: Some(token),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The underlying HTTP client, for fetching seed files.
    pub fn http(&self) -> &Client {
        &self.client
    }

    // ===== Auth =====

    /// Sign in with email and password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<SessionData, ApiError> {
        let url = format!("{}/accounts:signInWithPassword?key={}", AUTH_BASE_URL, self.api_key);
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let response = self
            .send(|| self.client.post(&url).json(&body), ApiError::from_auth_status)
            .await?;
        let auth: SignInResponse = Self::parse(response, "sign-in").await?;
        debug!(uid = %auth.local_id, "Signed in");
        Ok(Self::session_from_sign_in(auth, email))
    }

    /// Create a new account. The matching user document is written
    /// separately and starts unapproved.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SessionData, ApiError> {
        let url = format!("{}/accounts:signUp?key={}", AUTH_BASE_URL, self.api_key);
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let response = self
            .send(|| self.client.post(&url).json(&body), ApiError::from_auth_status)
            .await?;
        let auth: SignInResponse = Self::parse(response, "sign-up").await?;
        debug!(uid = %auth.local_id, "Account created");
        Ok(Self::session_from_sign_in(auth, email))
    }

    /// Exchange the session's refresh token for a fresh id token.
    pub async fn refresh_session(&self, session: &SessionData) -> Result<SessionData, ApiError> {
        let url = format!("{}/token?key={}", TOKEN_BASE_URL, self.api_key);
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", session.refresh_token.as_str()),
        ];
        let response = self
            .send(|| self.client.post(&url).form(&form), ApiError::from_auth_status)
            .await?;
        let refreshed: RefreshResponse = Self::parse(response, "token refresh").await?;
        debug!(uid = %refreshed.user_id, "Session refreshed");
        Ok(SessionData {
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            uid: refreshed.user_id,
            email: session.email.clone(),
            expires_in_secs: parse_lifetime(refreshed.expires_in.as_deref()),
            created_at: Utc::now(),
        })
    }

    fn session_from_sign_in(auth: SignInResponse, email: &str) -> SessionData {
        SessionData {
            expires_in_secs: parse_lifetime(auth.expires_in.as_deref()),
            id_token: auth.id_token,
            refresh_token: auth.refresh_token,
            uid: auth.local_id,
            email: if auth.email.is_empty() { email.to_string() } else { auth.email },
            created_at: Utc::now(),
        }
    }

    // ===== Request plumbing =====

    fn documents_root(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}/{}", STORE_BASE_URL, self.documents_root(), collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}/{}", STORE_BASE_URL, self.documents_root(), collection, id)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response, map_err: ErrorMapper) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(map_err(status, &body))
        }
    }

    /// Send a request, retrying with exponential backoff while rate limited.
    async fn send<F>(&self, build: F, map_err: ErrorMapper) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.authorized(build()).send().await?;

            match Self::check_response_for_retry(response, map_err).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(format!("{}: {}", what, e)))
    }
}

#[async_trait]
impl DocumentStore for StoreClient {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ApiError> {
        let url = self.document_url(collection, id);
        match self.send(|| self.client.get(&url), ApiError::from_status).await {
            Ok(response) => {
                let raw: RawDocument = Self::parse(response, "document").await?;
                raw.into_document().map(Some)
            }
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn query(&self, collection: &str, filters: &[FieldFilter]) -> Result<Vec<Document>, ApiError> {
        let url = format!("{}/{}:runQuery", STORE_BASE_URL, self.documents_root());
        let body = codec::run_query_body(collection, filters);
        let response = self
            .send(|| self.client.post(&url).json(&body), ApiError::from_status)
            .await?;
        let items: Vec<RunQueryItem> = Self::parse(response, "query").await?;
        let docs = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(RawDocument::into_document)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(collection, filters = filters.len(), count = docs.len(), "Query complete");
        Ok(docs)
    }

    async fn create(&self, collection: &str, id: Option<&str>, fields: Map<String, Value>) -> Result<String, ApiError> {
        let url = self.collection_url(collection);
        let body = json!({ "fields": codec::encode_fields(&fields) });
        let response = self
            .send(
                || {
                    let req = self.client.post(&url).json(&body);
                    match id {
                        Some(id) => req.query(&[("documentId", id)]),
                        None => req,
                    }
                },
                ApiError::from_status,
            )
            .await?;
        let raw: RawDocument = Self::parse(response, "created document").await?;
        Ok(raw.id().to_string())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        mask: &[String],
    ) -> Result<(), ApiError> {
        let url = self.document_url(collection, id);
        let body = json!({ "fields": codec::encode_fields(&fields) });
        let mut params: Vec<(&str, &str)> = mask.iter().map(|f| ("updateMask.fieldPaths", f.as_str())).collect();
        params.push(("currentDocument.exists", "true"));
        self.send(|| self.client.patch(&url).query(&params).json(&body), ApiError::from_status)
            .await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), ApiError> {
        let url = self.document_url(collection, id);
        self.send(|| self.client.delete(&url), ApiError::from_status).await?;
        Ok(())
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<(), ApiError> {
        let url = format!("{}/{}:commit", STORE_BASE_URL, self.documents_root());
        let body = codec::commit_body(&self.documents_root(), &writes);
        self.send(|| self.client.post(&url).json(&body), ApiError::from_status)
            .await?;
        debug!(writes = writes.len(), "Commit applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_urls() {
        let client = StoreClient::new("voterbook-demo", "key").unwrap();
        assert_eq!(
            client.document_url("voters", "abc"),
            "https://firestore.googleapis.com/v1/projects/voterbook-demo/databases/(default)/documents/voters/abc"
        );
        assert!(client.collection_url("users").ends_with("/documents/users"));
    }

    #[test]
    fn test_with_token_keeps_project() {
        let client = StoreClient::new("p1", "key").unwrap();
        let authed = client.with_token("tok".to_string());
        assert_eq!(authed.project_id(), "p1");
        assert_eq!(authed.token.as_deref(), Some("tok"));
        assert!(client.token.is_none());
    }

    #[test]
    fn test_sign_in_response_to_session() {
        let raw = r#"{"idToken":"id","refreshToken":"rt","localId":"u1","email":"","expiresIn":"3600"}"#;
        let auth: SignInResponse = serde_json::from_str(raw).unwrap();
        let session = StoreClient::session_from_sign_in(auth, "a@example.com");
        assert_eq!(session.uid, "u1");
        assert_eq!(session.email, "a@example.com");
        assert_eq!(session.expires_in_secs, 3600);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_parse_lifetime_default() {
        assert_eq!(parse_lifetime(None), DEFAULT_TOKEN_LIFETIME_SECS);
        assert_eq!(parse_lifetime(Some("1800")), 1800);
        assert_eq!(parse_lifetime(Some("soon")), DEFAULT_TOKEN_LIFETIME_SECS);
    }
}
