use std::collections::BTreeSet;
use std::time::Duration;

use rand::Rng;

use crate::error::{ApiError, Error, TransportErrorKind};

const RATE_LIMIT_REASONS: [&str; 2] = ["rateLimitExceeded", "userRateLimitExceeded"];

/// Pure retry decision plus backoff schedule. Attempt bookkeeping lives in
/// the executor; this type only answers "is this failure transient".
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    base_backoff: Duration,
    max_backoff: Duration,
    jitter_ratio: f64,
    retryable_status_codes: BTreeSet<u16>,
    retryable_transport_error_kinds: BTreeSet<TransportErrorKind>,
}

impl RetryPolicy {
    pub fn standard() -> Self {
        Self {
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            jitter_ratio: 0.2,
            retryable_status_codes: default_retryable_status_codes(),
            retryable_transport_error_kinds: default_retryable_transport_error_kinds(),
        }
    }

    pub fn base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff.max(Duration::from_millis(1));
        if self.max_backoff < self.base_backoff {
            self.max_backoff = self.base_backoff;
        }
        self
    }

    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff.max(self.base_backoff);
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn retryable_transport_error_kinds(
        mut self,
        kinds: impl IntoIterator<Item = TransportErrorKind>,
    ) -> Self {
        self.retryable_transport_error_kinds = kinds.into_iter().collect();
        self
    }

    /// Whether the normalized failure warrants another attempt. Rate-limit
    /// and transient server statuses retry, as do rate-limit sub-error
    /// reasons; connection-level faults retry for the configured kinds.
    pub fn should_retry(&self, error: Option<&Error>) -> bool {
        match error {
            Some(Error::Api(api_error)) => self.should_retry_api(api_error),
            Some(Error::Transport { kind, .. }) => {
                self.retryable_transport_error_kinds.contains(kind)
            }
            _ => false,
        }
    }

    fn should_retry_api(&self, api_error: &ApiError) -> bool {
        if self.retryable_status_codes.contains(&api_error.code) {
            return true;
        }
        api_error.errors.iter().any(|sub_error| {
            sub_error
                .reason
                .as_deref()
                .is_some_and(|reason| RATE_LIMIT_REASONS.contains(&reason))
        })
    }

    /// Delay before retry `retry_index` (1-based): the base doubled once per
    /// prior retry, clamped to the configured maximum, with bounded jitter
    /// applied when a jitter ratio is set.
    pub fn backoff_for_retry(&self, retry_index: usize) -> Duration {
        let base = self.base_backoff.max(Duration::from_millis(1));
        let doublings = retry_index.saturating_sub(1).min(31) as u32;
        let nominal = base.saturating_mul(1_u32 << doublings);
        self.apply_jitter(nominal.min(self.max_backoff.max(base)))
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON || backoff.is_zero() {
            return backoff;
        }

        let nominal_secs = backoff.as_secs_f64();
        let span_secs = nominal_secs * self.jitter_ratio;
        let low = (nominal_secs - span_secs).max(0.0);
        let high = nominal_secs + span_secs;
        let sampled = rand::rng().random_range(low..=high);
        Duration::from_secs_f64(sampled).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

fn default_retryable_status_codes() -> BTreeSet<u16> {
    [429_u16, 500, 502, 503].into_iter().collect()
}

fn default_retryable_transport_error_kinds() -> BTreeSet<TransportErrorKind> {
    [
        TransportErrorKind::Dns,
        TransportErrorKind::Connect,
        TransportErrorKind::Read,
    ]
    .into_iter()
    .collect()
}
