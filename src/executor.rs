use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::auth::authorize_request;
use crate::config::ClientConfig;
use crate::error::{Error, ResponseSnapshot};
use crate::normalize::{parse_api_response, NormalizedBody};
use crate::request::{RequestOptions, RequestPayload};
use crate::stream::StreamHandle;
use crate::transport::{
    buffered_req_body, empty_req_body, ReqBody, Transport, TransportRequest,
};
use crate::upload::{encode_multipart, MultipartBody};
use crate::util::{resolve_uri, truncate_body};

/// Terminal success of one pipeline run: the normalized body plus the
/// response it came from.
#[derive(Debug)]
pub struct ApiSuccess {
    pub body: NormalizedBody,
    pub response: Option<ResponseSnapshot>,
}

enum PreparedBody {
    Empty,
    Buffered(Bytes),
    Streaming(Option<ReqBody>),
}

impl PreparedBody {
    fn replayable(&self) -> bool {
        !matches!(self, Self::Streaming(_))
    }

    fn next_attempt_body(&mut self) -> Option<ReqBody> {
        match self {
            Self::Empty => Some(empty_req_body()),
            Self::Buffered(bytes) => Some(buffered_req_body(bytes.clone())),
            Self::Streaming(slot) => slot.take(),
        }
    }
}

fn prepare_body(
    body: Option<RequestPayload>,
) -> Result<(Option<HeaderValue>, PreparedBody), Error> {
    match body {
        None => Ok((None, PreparedBody::Empty)),
        Some(RequestPayload::Json(value)) => {
            let encoded =
                serde_json::to_vec(&value).map_err(|source| Error::Serialize { source })?;
            Ok((
                Some(HeaderValue::from_static("application/json")),
                PreparedBody::Buffered(Bytes::from(encoded)),
            ))
        }
        Some(RequestPayload::Multipart(parts)) => {
            let (content_type, multipart_body) = encode_multipart(parts)?;
            let prepared = match multipart_body {
                MultipartBody::Buffered(bytes) => PreparedBody::Buffered(bytes),
                MultipartBody::Streaming(stream) => PreparedBody::Streaming(Some(stream)),
            };
            Ok((Some(content_type), prepared))
        }
    }
}

/// Drives one request through the full pipeline: authorization, decoration,
/// dispatch, normalization, and bounded retry of transient failures.
pub(crate) struct RequestExecutor {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    endpoint: String,
}

impl RequestExecutor {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: Arc<ClientConfig>,
        endpoint: String,
    ) -> Self {
        Self {
            transport,
            config,
            endpoint,
        }
    }

    pub(crate) fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    /// Buffered mode: exactly one terminal outcome, success or error.
    pub(crate) async fn execute(&self, options: RequestOptions) -> Result<ApiSuccess, Error> {
        self.run(options, None).await
    }

    /// Streaming mode: the terminal outcome is delivered through the stream
    /// handle instead of being returned. The handle's guard keeps terminal
    /// delivery at most once even when abort races the final attempt.
    pub(crate) async fn execute_stream(&self, options: RequestOptions, handle: StreamHandle) {
        match self.run(options, Some(handle.cancel_token().clone())).await {
            Ok(success) => {
                if let Some(snapshot) = &success.response {
                    handle.emit_response(snapshot.clone());
                }
                handle.complete(success.body);
            }
            Err(error) => {
                if let Some(snapshot) = error
                    .as_api_error()
                    .and_then(|api_error| api_error.response.clone())
                {
                    handle.emit_response(snapshot);
                }
                handle.fail(error);
            }
        }
    }

    async fn run(
        &self,
        mut options: RequestOptions,
        cancel: Option<CancellationToken>,
    ) -> Result<ApiSuccess, Error> {
        authorize_request(&self.config, &mut options).await?;

        let RequestOptions {
            method,
            path,
            mut headers,
            query,
            body,
        } = options;
        let uri = resolve_uri(&self.endpoint, &path, &query)?;
        let uri_text = uri.to_string();

        let (content_type, mut prepared) = prepare_body(body)?;
        if let Some(content_type) = content_type {
            headers.entry(CONTENT_TYPE).or_insert(content_type);
        }

        // A body that cannot be rebuilt gets exactly one attempt.
        let retry_budget = if prepared.replayable() {
            self.config.retry_budget()
        } else {
            0
        };

        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            if let Some(cancel) = &cancel {
                if cancel.is_cancelled() {
                    return Err(Error::Aborted);
                }
            }

            // Streaming bodies never reach a second attempt.
            let Some(wire_body) = prepared.next_attempt_body() else {
                return Err(Error::Aborted);
            };

            let span = info_span!("api_request", %method, uri = %uri_text, attempt);
            let outcome = async {
                let send = self.transport.send(TransportRequest {
                    method: method.clone(),
                    uri: uri.clone(),
                    headers: headers.clone(),
                    body: wire_body,
                });
                match &cancel {
                    Some(token) => tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        outcome = send => Some(outcome),
                    },
                    None => Some(send.await),
                }
            }
            .instrument(span)
            .await;

            let Some(outcome) = outcome else {
                return Err(Error::Aborted);
            };

            let (transport_error, snapshot, raw_body) = match outcome {
                Ok(response) => (
                    None,
                    Some(ResponseSnapshot::new(response.status, response.headers)),
                    response.body,
                ),
                Err(fault) => (Some(fault.into_error(&method, &uri_text)), None, Bytes::new()),
            };

            if let Some(snapshot) = &snapshot {
                let preview = String::from_utf8_lossy(&raw_body);
                debug!(
                    status = snapshot.status.as_u16(),
                    attempt,
                    body = %truncate_body(&preview, 256),
                    "response received"
                );
            }

            let normalized = parse_api_response(transport_error, snapshot, &raw_body);
            let error = match normalized.error {
                None => {
                    return Ok(ApiSuccess {
                        body: normalized.body,
                        response: normalized.response,
                    });
                }
                Some(error) => error,
            };

            let retries_used = attempt - 1;
            if retries_used >= retry_budget
                || !self.config.retry_policy().should_retry(Some(&error))
            {
                return Err(error);
            }

            let delay = self.config.retry_policy().backoff_for_retry(attempt);
            warn!(
                %method,
                uri = %uri_text,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            match &cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::Aborted),
                    _ = tokio::time::sleep(delay) => {}
                },
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}
