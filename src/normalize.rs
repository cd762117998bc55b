use bytes::Bytes;

use crate::error::{ApiError, Error, ResponseSnapshot};

/// Response body after normalization. Textual bodies are decoded as JSON on a
/// best-effort basis; a body that fails to decode is kept verbatim, as text
/// when it is valid UTF-8 and as raw bytes otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedBody {
    Json(serde_json::Value),
    Text(String),
    Binary(Bytes),
    Empty,
}

impl NormalizedBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    fn embedded_error(&self) -> Option<&serde_json::Value> {
        self.as_json().and_then(|value| value.get("error"))
    }
}

/// Uniform shape of a raw transport outcome: a possible structured error, the
/// parsed body, and the originating response.
#[derive(Debug)]
pub struct NormalizedResponse {
    pub error: Option<Error>,
    pub body: NormalizedBody,
    pub response: Option<ResponseSnapshot>,
}

impl NormalizedResponse {
    pub fn into_result(self) -> Result<(NormalizedBody, Option<ResponseSnapshot>), Error> {
        match self.error {
            Some(error) => Err(error),
            None => Ok((self.body, self.response)),
        }
    }
}

/// Converts a raw transport outcome into one uniform result.
///
/// A transport error is preserved unless overridden: a status outside
/// [200, 299] replaces it with an [`ApiError`] built from the status line, and
/// an `error` field inside the decoded body replaces it again with an
/// [`ApiError`] built from that payload. A 2xx response whose body reports an
/// error therefore still surfaces a failure. Never fails.
pub fn parse_api_response(
    transport_error: Option<Error>,
    response: Option<ResponseSnapshot>,
    raw_body: &Bytes,
) -> NormalizedResponse {
    let mut error = transport_error;

    if let Some(response) = &response {
        if !response.status.is_success() {
            error = Some(Error::Api(ApiError::from_status(
                response.status,
                response.clone(),
            )));
        }
    }

    let body = decode_body(raw_body);

    if let Some(embedded) = body.embedded_error() {
        error = Some(Error::Api(ApiError::from_payload(
            embedded,
            response.clone(),
        )));
    }

    NormalizedResponse {
        error,
        body,
        response,
    }
}

fn decode_body(raw_body: &Bytes) -> NormalizedBody {
    if raw_body.is_empty() {
        return NormalizedBody::Empty;
    }

    let Ok(text) = std::str::from_utf8(raw_body) else {
        return NormalizedBody::Binary(raw_body.clone());
    };

    match serde_json::from_str(text) {
        Ok(value) => NormalizedBody::Json(value),
        Err(_) => NormalizedBody::Text(text.to_owned()),
    }
}
