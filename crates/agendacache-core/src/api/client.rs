//! REST client for the hosted backend.
//!
//! Tables are served PostgREST-style under `/rest/v1`, sessions come from
//! the token endpoint under `/auth/v1`, and avatars live in object storage
//! under `/storage/v1`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::backend::Backend;
use super::query::{Query, Table};
use super::ApiError;
use crate::auth::{SessionContext, SessionData};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout for the reachability probe.
const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl AuthResponse {
    fn into_session(self, fallback_email: &str) -> SessionData {
        SessionData {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            user_id: self.user.id,
            email: self.user.email.unwrap_or_else(|| fallback_email.to_string()),
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
        }
    }
}

/// REST backend client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    anon_key: String,
    session: SessionContext,
}

impl RestClient {
    /// Requests carry the signed-in user's token from `session`, or the
    /// anonymous key when nobody is signed in.
    pub fn new(base_url: &str, anon_key: &str, session: SessionContext) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session,
        })
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn headers(&self) -> Result<header::HeaderMap, ApiError> {
        let bearer = self
            .session
            .access_token()
            .unwrap_or_else(|| self.anon_key.clone());

        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", Self::header_value(&self.anon_key)?);
        headers.insert(
            header::AUTHORIZATION,
            Self::header_value(&format!("Bearer {}", bearer))?,
        );
        Ok(headers)
    }

    fn header_value(value: &str) -> Result<header::HeaderValue, ApiError> {
        header::HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid header value: {}", e)))
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(response: Response) -> Result<Option<Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, retrying rate-limited attempts with exponential backoff.
    async fn send<F>(&self, what: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> Result<RequestBuilder, ApiError>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(request = what, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// Read a JSON body that may be empty.
    async fn json_body(response: Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed JSON: {}", e)))
    }

    async fn rows(response: Response) -> Result<Vec<Value>, ApiError> {
        match Self::json_body(response).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    async fn auth_request(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        let url = self.auth_url(path);
        let response = self
            .send(path, || {
                Ok(self
                    .client
                    .post(&url)
                    .header("apikey", &self.anon_key)
                    .json(&body))
            })
            .await?;
        Self::json_body(response).await
    }

    fn parse_session(value: Value, fallback_email: &str) -> Result<SessionData, ApiError> {
        let auth: AuthResponse = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Unexpected auth response: {}", e)))?;
        Ok(auth.into_session(fallback_email))
    }
}

#[async_trait]
impl Backend for RestClient {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, ApiError> {
        let url = self.rest_url(table);
        let params = query.to_params();
        let response = self
            .send(table.name(), || {
                Ok(self.client.get(&url).headers(self.headers()?).query(&params))
            })
            .await?;
        let rows = Self::rows(response).await?;
        debug!(table = %table, count = rows.len(), "Rows fetched");
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Value) -> Result<Vec<Value>, ApiError> {
        let url = self.rest_url(table);
        let response = self
            .send(table.name(), || {
                Ok(self
                    .client
                    .post(&url)
                    .headers(self.headers()?)
                    .header("Prefer", "return=representation")
                    .json(&rows))
            })
            .await?;
        Self::rows(response).await
    }

    async fn update(&self, table: Table, query: &Query, patch: Value) -> Result<Vec<Value>, ApiError> {
        let url = self.rest_url(table);
        let params = query.to_params();
        let response = self
            .send(table.name(), || {
                Ok(self
                    .client
                    .patch(&url)
                    .headers(self.headers()?)
                    .header("Prefer", "return=representation")
                    .query(&params)
                    .json(&patch))
            })
            .await?;
        Self::rows(response).await
    }

    async fn delete(&self, table: Table, query: &Query) -> Result<(), ApiError> {
        let url = self.rest_url(table);
        let params = query.to_params();
        self.send(table.name(), || {
            Ok(self
                .client
                .delete(&url)
                .headers(self.headers()?)
                .header("Prefer", "return=minimal")
                .query(&params))
        })
        .await?;
        Ok(())
    }

    async fn upsert(&self, table: Table, rows: Value) -> Result<Vec<Value>, ApiError> {
        let url = self.rest_url(table);
        let on_conflict = [("on_conflict", table.conflict_columns())];
        let response = self
            .send(table.name(), || {
                Ok(self
                    .client
                    .post(&url)
                    .headers(self.headers()?)
                    .header("Prefer", "resolution=merge-duplicates,return=representation")
                    .query(&on_conflict)
                    .json(&rows))
            })
            .await?;
        Self::rows(response).await
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, ApiError> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let response = self
            .send(function, || {
                Ok(self.client.post(&url).headers(self.headers()?).json(&args))
            })
            .await?;
        Self::json_body(response).await
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        self.send("upload", || {
            Ok(self
                .client
                .post(&url)
                .headers(self.headers()?)
                .header(header::CONTENT_TYPE, content_type)
                .header("x-upsert", "true")
                .body(bytes.clone()))
        })
        .await?;
        debug!(bucket, path, "Object uploaded");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionData, ApiError> {
        let body = json!({ "email": email, "password": password });
        let value = self.auth_request("token?grant_type=password", body).await?;
        Self::parse_session(value, email)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<Option<SessionData>, ApiError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "username": username },
        });
        let value = self.auth_request("signup", body).await?;

        // Without auto-confirm the endpoint returns only the user record
        if value.get("access_token").is_none() {
            debug!(email, "Sign-up requires confirmation");
            return Ok(None);
        }
        Self::parse_session(value, email).map(Some)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionData, ApiError> {
        let body = json!({ "refresh_token": refresh_token });
        let value = self.auth_request("token?grant_type=refresh_token", body).await?;
        Self::parse_session(value, "")
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        let url = self.auth_url("logout");
        self.send("logout", || Ok(self.client.post(&url).headers(self.headers()?)))
            .await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), ApiError> {
        let url = self.auth_url("health");
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }
}
