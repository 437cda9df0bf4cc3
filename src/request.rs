use reqwest::Method;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{ApiError, Result};

/// One logical request: method, path, query and optional JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the client's base URL, or an absolute URL.
    pub path: String,
    /// Query string pairs, sent in order.
    pub query: Vec<(String, String)>,
    /// JSON request body.
    pub body: Option<JsonValue>,
}

impl ApiRequest {
    /// Creates a request without query or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends one query pair.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Appends query pairs, skipping `None` values.
    pub fn query_opt<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: ToString,
    {
        self.query.extend(
            pairs
                .into_iter()
                .filter_map(|(name, value)| value.map(|value| (name.into(), value.to_string()))),
        );
        self
    }

    /// Sets a prebuilt JSON body.
    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let body = serde_json::to_value(body).map_err(|err| {
            ApiError::Encode(format!("request body cannot be serialized as JSON: {err}"))
        })?;
        Ok(self.body(body))
    }
}

/// Joins `path` onto `base_url` with exactly one `/`.
///
/// Absolute `http://` or `https://` paths are returned unchanged.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{path}")
    }
}
