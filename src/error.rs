use http::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_API_ERROR_MESSAGE: &str = "Error during request.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dns => write!(formatter, "dns"),
            Self::Connect => write!(formatter, "connect"),
            Self::Tls => write!(formatter, "tls"),
            Self::Read => write!(formatter, "read"),
            Self::Other => write!(formatter, "other"),
        }
    }
}

/// Status line and headers of the transport response an error originated
/// from. The body is carried separately by [`NormalizedResponse`].
///
/// [`NormalizedResponse`]: crate::normalize::NormalizedResponse
#[derive(Clone, Debug)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseSnapshot {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }
}

/// One entry of the `error.errors` list a JSON API error payload carries.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubError {
    pub reason: Option<String>,
    pub domain: Option<String>,
    pub message: Option<String>,
}

/// Structured failure derived from a non-2xx status or an embedded error
/// payload. A 2xx response whose body carries an `error` field still surfaces
/// as an `ApiError`.
#[derive(Clone, Debug)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    pub errors: Vec<SubError>,
    pub response: Option<ResponseSnapshot>,
}

impl ApiError {
    /// Error for a transport status outside [200, 299]. Sub-errors are empty;
    /// the message is the canonical status text.
    pub(crate) fn from_status(status: StatusCode, response: ResponseSnapshot) -> Self {
        Self {
            code: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or(DEFAULT_API_ERROR_MESSAGE)
                .to_owned(),
            errors: Vec::new(),
            response: Some(response),
        }
    }

    /// Error built from the `error` field of a decoded response payload.
    pub(crate) fn from_payload(
        payload: &serde_json::Value,
        response: Option<ResponseSnapshot>,
    ) -> Self {
        let code = payload
            .get("code")
            .and_then(serde_json::Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or_default();
        let message = payload
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(DEFAULT_API_ERROR_MESSAGE)
            .to_owned();
        let errors = payload
            .get("errors")
            .cloned()
            .map(|errors| serde_json::from_value(errors).unwrap_or_default())
            .unwrap_or_default();
        Self {
            code,
            message,
            errors,
            response,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "api error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri: {uri}")]
    InvalidUri { uri: String },
    #[error("failed to serialize request json: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: BoxError,
    },
    #[error("response body too large ({actual_bytes} bytes > {limit_bytes} bytes)")]
    ResponseBodyTooLarge {
        limit_bytes: usize,
        actual_bytes: usize,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("authorization failed: {message}")]
    Authorization { message: String },
    #[error("{message}")]
    Validation { message: &'static str },
    #[error("request aborted")]
    Aborted,
    #[error("upload stream writable side is already bound")]
    StreamAlreadyBound,
    #[error("failed to initialize tls transport: {message}")]
    TlsInit { message: String },
}

impl Error {
    /// The structured API error, when this is one.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(api_error) => Some(api_error),
            _ => None,
        }
    }
}
