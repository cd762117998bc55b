mod common;

use std::sync::Arc;
use std::time::Duration;

use http::header::CONTENT_TYPE;
use nimbus::{
    ClientConfig, Error, NormalizedBody, RequestOptions, RequestStream, StreamEvent,
    UploadOptions,
};
use serde_json::json;

use common::{client_with, grant_config, json_response, AuthMode, MockAuthorizer, MockTransport};

fn upload_options() -> UploadOptions {
    UploadOptions {
        request: RequestOptions::post("/upload/storage/v1/b/demo/o"),
        metadata: json!({ "name": "report.txt", "contentType": "text/plain" }),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn upload_frames_metadata_and_content_into_one_related_body() {
    let transport = MockTransport::new([json_response(200, json!({ "name": "report.txt" }))]);
    let client = client_with(Arc::clone(&transport), grant_config());

    let (mut stream, sink) = client.upload(upload_options());
    sink.write("hello ").await.expect("first chunk");
    sink.write("world").await.expect("second chunk");
    drop(sink);

    let first = stream.next_event().await.expect("response event");
    assert!(matches!(first, StreamEvent::Response(_)));
    let second = stream.next_event().await.expect("terminal event");
    let StreamEvent::Complete(body) = second else {
        panic!("terminal complete expected");
    };
    assert_eq!(body, NormalizedBody::Json(json!({ "name": "report.txt" })));

    let recorded = transport.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, http::Method::POST);
    assert!(recorded[0].uri.contains("uploadType=multipart"));

    let content_type = recorded[0]
        .headers
        .get(CONTENT_TYPE)
        .expect("content type")
        .to_str()
        .expect("ascii");
    assert!(content_type.starts_with("multipart/related; boundary="));

    let wire_body = String::from_utf8(recorded[0].body.to_vec()).expect("utf8 body");
    assert!(wire_body.contains("Content-Type: application/json"));
    assert!(wire_body.contains(r#""name":"report.txt""#));
    assert!(wire_body.contains("Content-Type: text/plain"));
    assert!(wire_body.contains("hello world"));
    let boundary = content_type.trim_start_matches("multipart/related; boundary=");
    assert!(wire_body.ends_with(&format!("--{boundary}--\r\n")));
}

#[tokio::test(flavor = "current_thread")]
async fn caller_supplied_method_and_upload_type_override_the_defaults() {
    let transport = MockTransport::new([json_response(200, json!({}))]);
    let client = client_with(Arc::clone(&transport), grant_config());

    let options = UploadOptions {
        request: RequestOptions::new(http::Method::PUT, "/upload/storage/v1/b/demo/o")
            .query_pair("uploadType", "resumable"),
        metadata: json!({ "name": "report.txt" }),
    };
    let (mut stream, sink) = client.upload(options);
    sink.write("chunk").await.expect("chunk");
    drop(sink);

    while let Some(event) = stream.next_event().await {
        if event.is_terminal() {
            break;
        }
    }

    let recorded = transport.recorded();
    assert_eq!(recorded[0].method, http::Method::PUT);
    assert!(recorded[0].uri.contains("uploadType=resumable"));
    assert!(!recorded[0].uri.contains("uploadType=multipart"));
}

#[tokio::test(flavor = "current_thread")]
async fn auth_failure_fails_the_upload_before_any_content_byte_moves() {
    let transport = MockTransport::new([json_response(200, json!({}))]);
    let config = ClientConfig::builder(MockAuthorizer::new(AuthMode::Fail)).build();
    let client = client_with(Arc::clone(&transport), config);

    let (mut stream, sink) = client.upload(upload_options());
    // Queued before the failure lands; it must never reach the wire.
    let _ = sink.write("never sent").await;

    let terminal = stream.next_event().await.expect("terminal event");
    let StreamEvent::Failed(error) = terminal else {
        panic!("terminal failure expected");
    };
    assert!(matches!(error, Error::Authorization { .. }));
    assert_eq!(transport.calls(), 0, "zero bytes may reach the transport");
}

#[tokio::test(flavor = "current_thread")]
async fn upload_surfaces_api_errors_as_the_single_terminal_event() {
    let transport = MockTransport::new([json_response(
        400,
        json!({ "error": { "code": 400, "message": "Invalid object name" } }),
    )]);
    let client = client_with(Arc::clone(&transport), grant_config());

    let (mut stream, sink) = client.upload(upload_options());
    drop(sink);

    let mut terminals = 0;
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), stream.next_event()).await
    {
        if let StreamEvent::Failed(error) = &event {
            assert_eq!(error.as_api_error().expect("api error").code, 400);
        }
        if event.is_terminal() {
            terminals += 1;
        }
    }
    assert_eq!(terminals, 1);
}

#[tokio::test(flavor = "current_thread")]
async fn a_stream_can_only_be_bound_to_one_upload() {
    let transport = MockTransport::new([json_response(200, json!({}))]);
    let client = client_with(Arc::clone(&transport), grant_config());

    let (mut stream, _sink) = RequestStream::new();
    client
        .upload_with_stream(upload_options(), &mut stream)
        .expect("first bind succeeds");

    let error = client
        .upload_with_stream(upload_options(), &mut stream)
        .expect_err("second bind must fail");
    assert!(matches!(error, Error::StreamAlreadyBound));
}

#[tokio::test(flavor = "current_thread")]
async fn aborted_upload_emits_no_terminal_event() {
    let transport = MockTransport::new([]);
    let client = client_with(Arc::clone(&transport), grant_config());

    let (stream, sink) = client.upload(upload_options());
    stream.abort();

    let mut stream = stream;
    let silence = tokio::time::timeout(Duration::from_millis(50), stream.next_event()).await;
    assert!(silence.is_err(), "no event may follow an abort");
    drop(sink);
}

#[tokio::test(flavor = "current_thread")]
async fn metadata_without_content_type_defaults_the_content_part() {
    let transport = MockTransport::new([json_response(200, json!({}))]);
    let client = client_with(Arc::clone(&transport), grant_config());

    let options = UploadOptions {
        request: RequestOptions::post("/upload/storage/v1/b/demo/o"),
        metadata: json!({ "name": "blob.bin" }),
    };
    let (mut stream, sink) = client.upload(options);
    sink.write("\u{0}\u{1}").await.expect("binary chunk");
    drop(sink);

    while let Some(event) = stream.next_event().await {
        if event.is_terminal() {
            break;
        }
    }

    let wire_body = String::from_utf8(transport.recorded()[0].body.to_vec()).expect("utf8 body");
    assert!(wire_body.contains("Content-Type: application/octet-stream"));
}
