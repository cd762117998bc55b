use std::sync::Arc;

use crate::auth::Authorizer;
use crate::retry::RetryPolicy;

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Shared, immutable per-client configuration. Constructed once at client
/// setup and read concurrently by every in-flight request; request-local
/// overrides are copied at call time, never written back.
pub struct ClientConfig {
    authorizer: Arc<dyn Authorizer>,
    auto_retry: bool,
    max_retries: usize,
    custom_endpoint: bool,
    retry_policy: RetryPolicy,
    max_response_body_bytes: usize,
}

impl ClientConfig {
    pub fn builder(authorizer: Arc<dyn Authorizer>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(authorizer)
    }

    pub(crate) fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    pub fn custom_endpoint(&self) -> bool {
        self.custom_endpoint
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Retries on top of the first attempt. Zero when automatic retry is
    /// disabled: exactly one attempt.
    pub(crate) fn retry_budget(&self) -> usize {
        if self.auto_retry {
            self.max_retries
        } else {
            0
        }
    }

    pub(crate) fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }
}

pub struct ClientConfigBuilder {
    authorizer: Arc<dyn Authorizer>,
    auto_retry: bool,
    max_retries: usize,
    custom_endpoint: bool,
    retry_policy: RetryPolicy,
    max_response_body_bytes: usize,
}

impl ClientConfigBuilder {
    fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            authorizer,
            auto_retry: true,
            max_retries: DEFAULT_MAX_RETRIES,
            custom_endpoint: false,
            retry_policy: RetryPolicy::standard(),
            max_response_body_bytes: DEFAULT_MAX_RESPONSE_BODY_BYTES,
        }
    }

    pub fn auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn custom_endpoint(mut self, custom_endpoint: bool) -> Self {
        self.custom_endpoint = custom_endpoint;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn max_response_body_bytes(mut self, max_response_body_bytes: usize) -> Self {
        self.max_response_body_bytes = max_response_body_bytes.max(1);
        self
    }

    pub fn build(self) -> ClientConfig {
        ClientConfig {
            authorizer: self.authorizer,
            auto_retry: self.auto_retry,
            max_retries: self.max_retries,
            custom_endpoint: self.custom_endpoint,
            retry_policy: self.retry_policy,
            max_response_body_bytes: self.max_response_body_bytes,
        }
    }
}
