use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::StreamExt;
use http::HeaderValue;
use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Error;
use crate::executor::RequestExecutor;
use crate::request::{Part, PartBody, PartStream, RequestOptions, RequestPayload};
use crate::stream::StreamHandle;
use crate::transport::{stream_req_body, ReqBody};

const BOUNDARY_LENGTH: usize = 24;
const DEFAULT_CONTENT_PART_TYPE: &str = "application/octet-stream";

/// Options for a multipart streaming upload. The request supplies the
/// method (typically POST), the target path, and any extra headers or query
/// pairs; `uploadType=multipart` is added only when the caller has not set
/// an upload type of their own.
pub struct UploadOptions {
    pub request: RequestOptions,
    /// Resource metadata, sent as the first multipart part. Its
    /// `contentType` field, when present, becomes the content part's type.
    pub metadata: serde_json::Value,
}

pub(crate) enum MultipartBody {
    Buffered(Bytes),
    Streaming(ReqBody),
}

fn random_boundary() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LENGTH)
        .map(char::from)
        .collect()
}

fn part_header(boundary: &str, content_type: &str) -> Bytes {
    Bytes::from(format!(
        "--{boundary}\r\nContent-Type: {content_type}\r\n\r\n"
    ))
}

fn closing_delimiter(boundary: &str) -> Bytes {
    Bytes::from(format!("--{boundary}--\r\n"))
}

/// Frames parts as a `multipart/related` body. Stays buffered when every
/// part is buffered, so the executor can replay it across retries; one live
/// part stream makes the whole body single-use.
pub(crate) fn encode_multipart(parts: Vec<Part>) -> Result<(HeaderValue, MultipartBody), Error> {
    let boundary = random_boundary();
    encode_multipart_with_boundary(parts, &boundary)
}

pub(crate) fn encode_multipart_with_boundary(
    parts: Vec<Part>,
    boundary: &str,
) -> Result<(HeaderValue, MultipartBody), Error> {
    let content_type = HeaderValue::from_str(&format!("multipart/related; boundary={boundary}"))
        .map_err(|_| Error::Validation {
            message: "multipart boundary produced an invalid content type",
        })?;

    let all_buffered = parts
        .iter()
        .all(|part| matches!(part.body, PartBody::Buffered(_)));

    if all_buffered {
        let mut framed = BytesMut::new();
        for part in parts {
            framed.put(part_header(boundary, &part.content_type));
            if let PartBody::Buffered(bytes) = part.body {
                framed.put(bytes);
            }
            framed.put(&b"\r\n"[..]);
        }
        framed.put(closing_delimiter(boundary));
        return Ok((content_type, MultipartBody::Buffered(framed.freeze())));
    }

    let mut segments: Vec<PartStream> = Vec::with_capacity(parts.len() * 3 + 1);
    for part in parts {
        let header = part_header(boundary, &part.content_type);
        segments.push(futures_util::stream::once(async move { Ok(header) }).boxed());
        match part.body {
            PartBody::Buffered(bytes) => {
                segments.push(futures_util::stream::once(async move { Ok(bytes) }).boxed());
            }
            PartBody::Stream(stream) => segments.push(stream),
        }
        segments.push(
            futures_util::stream::once(async { Ok(Bytes::from_static(b"\r\n")) }).boxed(),
        );
    }
    let closing = closing_delimiter(boundary);
    segments.push(futures_util::stream::once(async move { Ok(closing) }).boxed());

    let framed = futures_util::stream::iter(segments).flatten();
    Ok((content_type, MultipartBody::Streaming(stream_req_body(framed))))
}

/// Bridges a bound content channel into a multipart upload request and
/// drives it to its terminal event. Authorization runs before the content
/// channel is ever polled, so an auth failure consumes zero content bytes.
pub(crate) async fn run_upload(
    executor: Arc<RequestExecutor>,
    options: UploadOptions,
    content: mpsc::Receiver<Bytes>,
    handle: StreamHandle,
) {
    let UploadOptions {
        mut request,
        metadata,
    } = options;

    let metadata_bytes = match serde_json::to_vec(&metadata) {
        Ok(encoded) => Bytes::from(encoded),
        Err(source) => {
            handle.fail(Error::Serialize { source });
            return;
        }
    };
    let content_part_type = metadata
        .get("contentType")
        .and_then(serde_json::Value::as_str)
        .unwrap_or(DEFAULT_CONTENT_PART_TYPE)
        .to_owned();

    request
        .query
        .entry("uploadType".to_owned())
        .or_insert_with(|| "multipart".to_owned());
    request.body = Some(RequestPayload::Multipart(vec![
        Part {
            content_type: "application/json".to_owned(),
            body: PartBody::Buffered(metadata_bytes),
        },
        Part {
            content_type: content_part_type,
            body: PartBody::Stream(ReceiverStream::new(content).map(Ok).boxed()),
        },
    ]));

    executor.execute_stream(request, handle).await;
}
