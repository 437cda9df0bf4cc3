//! `governed-http` is an async REST client whose every request passes
//! through an outbound request governor:
//! - an [`AdmissionGate`] bounding requests in flight, serving waiters FIFO;
//! - a [`RetryEngine`] retrying 429/502/503/504 and network failures with
//!   exponential backoff, ±20% jitter and `Retry-After` support.
//!
//! Endpoint code goes through [`ApiClient::send`]:
//!
//! ```no_run
//! use governed_http::{ApiClient, ApiRequest};
//!
//! # async fn run() -> governed_http::Result<()> {
//! let client = ApiClient::new("https://api.example.com", "my-token");
//! let users = client
//!     .send(ApiRequest::get("/users").query("limit", 25))
//!     .await?;
//! println!("{users}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod gate;
mod options;
mod request;
mod retry;
mod wire;

pub use client::ApiClient;
pub use error::ApiError;
pub use gate::{AdmissionGate, GateError, RequestSlot};
pub use options::{ClientOptions, ConcurrencyPolicy, RetryPolicy};
pub use request::ApiRequest;
pub use retry::{AttemptOutcome, RetryEngine};

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, ApiError>;
