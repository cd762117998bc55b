use std::collections::BTreeMap;

use bytes::Bytes;
use futures_core::stream::BoxStream;
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Method};

use crate::error::BoxError;

/// Query/body keys that drive client-side pagination. They are control
/// metadata for the pipeline, never part of the wire request.
const PAGINATION_CONTROL_KEYS: [&str; 2] = ["autoPaginate", "autoPaginateVal"];

/// Boxed chunk stream used for live (non-replayable) multipart parts.
pub type PartStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// One part of a multipart request body.
pub struct Part {
    pub content_type: String,
    pub body: PartBody,
}

pub enum PartBody {
    Buffered(Bytes),
    Stream(PartStream),
}

pub enum RequestPayload {
    Json(serde_json::Value),
    Multipart(Vec<Part>),
}

/// Options for one outbound request. Mutable until dispatched; the
/// authorizer step decorates them (fixed user agent, pagination keys
/// stripped) before they reach the transport.
pub struct RequestOptions {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: BTreeMap<String, String>,
    pub body: Option<RequestPayload>,
}

impl RequestOptions {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn json(mut self, payload: serde_json::Value) -> Self {
        self.body = Some(RequestPayload::Json(payload));
        self
    }

    pub fn multipart(mut self, parts: Vec<Part>) -> Self {
        self.body = Some(RequestPayload::Multipart(parts));
        self
    }

    /// Whether the body can be rebuilt for another attempt. A multipart
    /// payload with a live content stream gets exactly one attempt.
    pub(crate) fn body_replayable(&self) -> bool {
        match &self.body {
            None | Some(RequestPayload::Json(_)) => true,
            Some(RequestPayload::Multipart(parts)) => parts
                .iter()
                .all(|part| matches!(part.body, PartBody::Buffered(_))),
        }
    }
}

/// Decorates options about to be dispatched: strips pagination-control keys
/// from query and JSON body, then sets the fixed user agent last so a
/// caller-supplied header never survives.
pub(crate) fn decorate_request(options: &mut RequestOptions) {
    for key in PAGINATION_CONTROL_KEYS {
        options.query.remove(key);
    }

    if let Some(RequestPayload::Json(serde_json::Value::Object(body))) = &mut options.body {
        for key in PAGINATION_CONTROL_KEYS {
            body.remove(key);
        }
    }

    options.headers.insert(
        USER_AGENT,
        HeaderValue::from_static(crate::USER_AGENT_VALUE),
    );
}
