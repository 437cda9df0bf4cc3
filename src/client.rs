use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{
    gate::{AdmissionGate, RequestSlot},
    request::join_url,
    retry::{AttemptOutcome, RetryEngine},
    wire::error_detail,
    ApiError, ApiRequest, ClientOptions, Result,
};

#[derive(Clone)]
/// REST client that governs concurrency and retries for every request.
///
/// Clones share one admission gate.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    options: ClientOptions,
    gate: Arc<AdmissionGate>,
    retry: RetryEngine,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("options", &self.options)
            .field("gate", &self.gate)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client from a bearer token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn new(base_url: impl Into<String>, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        Self::new_raw_auth(base_url, authorization)
    }

    /// Creates a client with a full raw authorization value.
    ///
    /// Example: `"Bearer <token>"` or any custom scheme.
    pub fn new_raw_auth(base_url: impl Into<String>, authorization: impl Into<String>) -> Self {
        let options = ClientOptions::default();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: authorization.into(),
            gate: Arc::new(AdmissionGate::new(options.concurrency.max_concurrent)),
            retry: RetryEngine::new(options.retry.clone()),
            options,
        }
    }

    /// Applies retry, concurrency and timeout options.
    ///
    /// Builds a fresh admission gate; clones made earlier keep the old one.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.gate = Arc::new(AdmissionGate::new(opts.concurrency.max_concurrent));
        self.retry = RetryEngine::new(opts.retry.clone());
        self.options = opts;
        self
    }

    /// Uses a preconfigured `reqwest::Client` (proxies, TLS, default headers).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Admission gate shared by this client and its clones.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Sends a request and returns the decoded JSON payload.
    ///
    /// `204 No Content` and empty bodies yield an empty JSON object.
    pub async fn send(&self, request: ApiRequest) -> Result<JsonValue> {
        let _slot = self.acquire_slot().await?;
        let url = join_url(&self.base_url, &request.path);
        self.retry
            .run(|attempt| self.attempt(&request, &url, attempt))
            .await
    }

    /// Sends a request and deserializes the payload into `T`.
    pub async fn send_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let payload = self.send(request).await?;
        serde_json::from_value(payload)
            .map_err(|err| ApiError::Decode(format!("unexpected response shape: {err}")))
    }

    pub async fn get(&self, path: &str) -> Result<JsonValue> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: JsonValue) -> Result<JsonValue> {
        self.send(ApiRequest::post(path).body(body)).await
    }

    pub async fn put(&self, path: &str, body: JsonValue) -> Result<JsonValue> {
        self.send(ApiRequest::put(path).body(body)).await
    }

    pub async fn patch(&self, path: &str, body: JsonValue) -> Result<JsonValue> {
        self.send(ApiRequest::patch(path).body(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<JsonValue> {
        self.send(ApiRequest::delete(path)).await
    }

    async fn acquire_slot(&self) -> Result<RequestSlot<'_>> {
        match self.options.concurrency.acquire_timeout_ms {
            Some(waited_ms) => self
                .gate
                .acquire_timeout(Duration::from_millis(waited_ms))
                .await
                .map_err(|_| ApiError::SlotTimeout { waited_ms }),
            None => Ok(self.gate.acquire().await),
        }
    }

    async fn attempt(
        &self,
        request: &ApiRequest,
        url: &str,
        attempt: usize,
    ) -> AttemptOutcome<JsonValue> {
        #[cfg(feature = "tracing")]
        tracing::debug!(method = %request.method, url, attempt, "sending request");
        #[cfg(not(feature = "tracing"))]
        let _ = attempt;

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(header::AUTHORIZATION, &self.token)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if let Some(timeout_ms) = self.options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return classify_transport(err),
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        match response.text().await {
            Ok(body) => classify_response(status, retry_after, &body),
            Err(err) => classify_transport(err),
        }
    }
}

/// Maps one HTTP response onto an attempt outcome.
fn classify_response(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> AttemptOutcome<JsonValue> {
    if status.is_success() {
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return AttemptOutcome::Success(JsonValue::Object(Default::default()));
        }
        return match serde_json::from_str(body) {
            Ok(payload) => AttemptOutcome::Success(payload),
            Err(err) => AttemptOutcome::Terminal(ApiError::Decode(format!(
                "invalid response JSON: {err}; body: {body}"
            ))),
        };
    }

    let status = status.as_u16();
    let error = ApiError::Http {
        status,
        detail: error_detail(status, body),
        body: body.to_owned(),
    };
    if crate::error::is_retryable_status(status) {
        AttemptOutcome::Retryable { error, retry_after }
    } else {
        AttemptOutcome::Terminal(error)
    }
}

fn classify_transport(err: reqwest::Error) -> AttemptOutcome<JsonValue> {
    if should_retry_transport(&err) {
        AttemptOutcome::Retryable {
            error: ApiError::Transport(err),
            retry_after: None,
        }
    } else {
        AttemptOutcome::Terminal(ApiError::Transport(err))
    }
}

fn should_retry_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// Reads `Retry-After` as an integer count of seconds.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
