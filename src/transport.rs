use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::error::{BoxError, Error, TransportErrorKind};

const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 8 * 1024 * 1024;

pub type ReqBody = UnsyncBoxBody<Bytes, BoxError>;

/// Wire-level request handed to the transport: resolved URI, merged headers,
/// and an opaque (possibly streaming) body.
pub struct TransportRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: ReqBody,
}

/// Buffered transport outcome. The pipeline normalizes this into a
/// [`NormalizedResponse`](crate::normalize::NormalizedResponse).
#[derive(Clone, Debug)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum TransportFault {
    #[error("{kind}: {source}")]
    Connection {
        kind: TransportErrorKind,
        #[source]
        source: BoxError,
    },
    #[error("response body too large ({actual_bytes} bytes > {limit_bytes} bytes)")]
    TooLarge {
        limit_bytes: usize,
        actual_bytes: usize,
    },
}

impl TransportFault {
    pub(crate) fn into_error(self, method: &Method, uri: &str) -> Error {
        match self {
            Self::Connection { kind, source } => Error::Transport {
                kind,
                method: method.clone(),
                uri: uri.to_owned(),
                source,
            },
            Self::TooLarge {
                limit_bytes,
                actual_bytes,
            } => Error::ResponseBodyTooLarge {
                limit_bytes,
                actual_bytes,
            },
        }
    }
}

/// HTTP request capability the executor dispatches through. Implementations
/// must tolerate unbounded concurrent in-flight requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFault>;
}

fn map_infallible_to_box_error(never: std::convert::Infallible) -> BoxError {
    match never {}
}

pub(crate) fn empty_req_body() -> ReqBody {
    Full::new(Bytes::new())
        .map_err(map_infallible_to_box_error)
        .boxed_unsync()
}

pub(crate) fn buffered_req_body(body: Bytes) -> ReqBody {
    Full::new(body)
        .map_err(map_infallible_to_box_error)
        .boxed_unsync()
}

pub(crate) fn stream_req_body<S>(stream: S) -> ReqBody
where
    S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
{
    BodyExt::boxed_unsync(StreamBody::new(stream.map(|item| item.map(Frame::data))))
}

pub(crate) fn build_http_request(
    method: Method,
    uri: Uri,
    headers: &HeaderMap,
    body: ReqBody,
) -> Result<Request<ReqBody>, Error> {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request_builder = request_builder.header(name, value);
    }
    request_builder
        .body(body)
        .map_err(|source| Error::RequestBuild { source })
}

fn classify_transport_error(error: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    if error.is_connect() {
        let text = error.to_string().to_ascii_lowercase();
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    let text = error.to_string().to_ascii_lowercase();
    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

async fn read_all_body_limited(mut body: Incoming, max_bytes: usize) -> Result<Bytes, TransportFault> {
    let mut collected = Vec::new();
    let mut total_len = 0_usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|source| TransportFault::Connection {
            kind: TransportErrorKind::Read,
            source: Box::new(source),
        })?;
        if let Some(data) = frame.data_ref() {
            total_len = total_len.saturating_add(data.len());
            if total_len > max_bytes {
                return Err(TransportFault::TooLarge {
                    limit_bytes: max_bytes,
                    actual_bytes: total_len,
                });
            }
            collected.extend_from_slice(data);
        }
    }

    Ok(Bytes::from(collected))
}

type HyperClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, ReqBody>;

/// Default transport: hyper over rustls (ring provider, webpki roots),
/// HTTP/1.1 and HTTP/2, connection pool left uncapped so any number of
/// requests may be in flight at once.
pub struct HyperTransport {
    client: HyperClient,
    max_response_body_bytes: usize,
}

impl HyperTransport {
    pub fn new() -> Result<Self, Error> {
        Self::with_max_response_body_bytes(DEFAULT_MAX_RESPONSE_BODY_BYTES)
    }

    pub fn with_max_response_body_bytes(max_response_body_bytes: usize) -> Result<Self, Error> {
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| Error::TlsInit {
                message: source.to_string(),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(usize::MAX)
            .build(https);
        Ok(Self {
            client,
            max_response_body_bytes: max_response_body_bytes.max(1),
        })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFault> {
        let http_request = build_http_request(
            request.method,
            request.uri,
            &request.headers,
            request.body,
        )
        .map_err(|error| TransportFault::Connection {
            kind: TransportErrorKind::Other,
            source: Box::new(error),
        })?;

        let response =
            self.client
                .request(http_request)
                .await
                .map_err(|source| TransportFault::Connection {
                    kind: classify_transport_error(&source),
                    source: Box::new(source),
                })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = read_all_body_limited(response.into_body(), self.max_response_body_bytes).await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
