#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use nimbus::{
    AuthError, Authorizer, Client, ClientConfig, Credentials, RequestOptions, RetryPolicy,
    Transport, TransportErrorKind, TransportFault, TransportRequest, TransportResponse,
};

pub const TEST_TOKEN: &str = "test-token-1";

#[derive(Clone, Copy)]
pub enum AuthMode {
    Grant,
    MissingCredentials,
    Fail,
}

pub struct MockAuthorizer {
    mode: AuthMode,
    calls: AtomicUsize,
}

impl MockAuthorizer {
    pub fn new(mode: AuthMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for MockAuthorizer {
    async fn authorize(&self, options: &mut RequestOptions) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            AuthMode::Grant => {
                let value = HeaderValue::from_str(&format!("Bearer {TEST_TOKEN}"))
                    .map_err(|_| AuthError::failed("invalid token"))?;
                options.headers.insert(AUTHORIZATION, value);
                Ok(())
            }
            AuthMode::MissingCredentials => Err(AuthError::credentials_unavailable(
                "no credentials found in the environment",
            )),
            AuthMode::Fail => Err(AuthError::failed("token endpoint unreachable")),
        }
    }

    async fn credentials(&self) -> Result<Credentials, AuthError> {
        match self.mode {
            AuthMode::Grant => Ok(Credentials {
                access_token: Some(TEST_TOKEN.to_owned()),
                token_type: Some("Bearer".to_owned()),
                expires_at: None,
            }),
            _ => Err(AuthError::credentials_unavailable(
                "no credentials found in the environment",
            )),
        }
    }
}

/// One request as the transport saw it, with the wire body fully drained.
#[derive(Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct MockTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportFault>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new(
        script: impl IntoIterator<Item = Result<TransportResponse, TransportFault>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        lock_unpoisoned(&self.requests).clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFault> {
        let body = match request.body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(source) => {
                return Err(TransportFault::Connection {
                    kind: TransportErrorKind::Read,
                    source,
                });
            }
        };
        lock_unpoisoned(&self.requests).push(RecordedRequest {
            method: request.method,
            uri: request.uri.to_string(),
            headers: request.headers,
            body,
        });
        lock_unpoisoned(&self.script).pop_front().unwrap_or_else(|| {
            Err(TransportFault::Connection {
                kind: TransportErrorKind::Other,
                source: "mock transport script exhausted".into(),
            })
        })
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn json_response(status: u16, body: serde_json::Value) -> Result<TransportResponse, TransportFault> {
    text_response(status, &body.to_string())
}

pub fn text_response(status: u16, body: &str) -> Result<TransportResponse, TransportFault> {
    Ok(TransportResponse {
        status: StatusCode::from_u16(status).expect("valid status"),
        headers: HeaderMap::new(),
        body: Bytes::from(body.to_owned()),
    })
}

pub fn empty_response(status: u16) -> Result<TransportResponse, TransportFault> {
    text_response(status, "")
}

pub fn connection_fault(kind: TransportErrorKind) -> Result<TransportResponse, TransportFault> {
    Err(TransportFault::Connection {
        kind,
        source: "mock connection fault".into(),
    })
}

pub fn grant_config() -> ClientConfig {
    ClientConfig::builder(MockAuthorizer::new(AuthMode::Grant))
        .retry_policy(RetryPolicy::standard().jitter_ratio(0.0))
        .build()
}

pub fn client_with(transport: Arc<MockTransport>, config: ClientConfig) -> Client {
    Client::builder(config)
        .endpoint("https://api.test/v1")
        .transport(transport)
        .build()
        .expect("client should build")
}
