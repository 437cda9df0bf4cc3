/// Configures retry, concurrency and timeout behavior.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds. `None` leaves attempts unbounded.
    pub timeout_ms: Option<u64>,
    /// Backoff and retry budget.
    pub retry: RetryPolicy,
    /// Admission gate settings.
    pub concurrency: ConcurrencyPolicy,
}

/// Retry budget and backoff curve for one logical request.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound of the computed (pre-jitter) delay, in milliseconds.
    ///
    /// Server `Retry-After` hints are not capped by this value.
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt. Values below `1.0` act as `1.0`.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 32_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Bounds on requests in flight.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConcurrencyPolicy {
    /// Maximum logical requests in flight. Zero acts as one.
    pub max_concurrent: usize,
    /// Longest time a caller waits for a slot. `None` waits indefinitely.
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            acquire_timeout_ms: None,
        }
    }
}
