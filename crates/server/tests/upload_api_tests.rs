//! Chunk upload and status endpoint tests.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_upload_then_status_lists_chunks() {
    let server = TestServer::new().await;

    let response = server.upload("sess-1", "video.mp4", 2, b"second").await;
    assert_eq!(response["sessionID"], "sess-1");
    assert_eq!(response["filename"], "video.mp4");
    assert_eq!(response["chunkIndex"], 2);
    assert_eq!(response["size"], 6);
    server.upload("sess-1", "video.mp4", 0, b"first").await;
    server.upload("sess-1", "video.mp4", 10, b"tenth").await;

    let (status, json) = server
        .send_json(query_request(
            "/status",
            &[("sessionID", "sess-1"), ("filename", "video.mp4")],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["uploaded"], json!([0, 2, 10]));
    assert!(json.get("missing").is_none());
}

#[tokio::test]
async fn test_status_reports_missing_with_expected_total() {
    let server = TestServer::new().await;
    for index in [0u64, 2, 4] {
        server.upload("s", "f.bin", index, b"x").await;
    }

    let (status, json) = server
        .send_json(form_request(
            "/status",
            &[("sessionID", "s"), ("filename", "f.bin"), ("expectedTotal", "5")],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["missing"], json!([1, 3]));
    assert_eq!(json["expectedTotal"], 5);

    // Legacy path and field names.
    let (status, json) = server
        .send_json(query_request(
            "/upload-status",
            &[("upload_id", "s"), ("filename", "f.bin"), ("total_parts", "3")],
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["missing"], json!([1]));
}

#[tokio::test]
async fn test_upload_accepts_legacy_fields_with_file_part_first() {
    let server = TestServer::new().await;

    let request = MultipartBody::new()
        .file("chunk", "archive.tar", b"payload")
        .text("upload_id", "legacy")
        .text("part_number", "1")
        .text("total_parts", "4")
        .into_request("/upload");
    let (status, json) = server.send_json(request).await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["filename"], "archive.tar");
    assert_eq!(json["chunkIndex"], 1);
    assert_eq!(json["message"], "Part 1 of 4 uploaded successfully");

    let (_, json) = server
        .send_json(query_request(
            "/status",
            &[("sessionID", "legacy"), ("filename", "archive.tar")],
        ))
        .await;
    assert_eq!(json["uploaded"], json!([1]));
}

#[tokio::test]
async fn test_upload_rejects_bad_fields() {
    let server = TestServer::new().await;

    let cases = [
        (
            MultipartBody::new()
                .text("sessionID", "s")
                .text("filename", "f")
                .file("file", "f", b"x"),
            "chunkIndex",
        ),
        (
            MultipartBody::new()
                .text("sessionID", "s")
                .text("filename", "f")
                .text("chunkIndex", "-1")
                .file("file", "f", b"x"),
            "chunkIndex",
        ),
        (
            MultipartBody::new()
                .text("filename", "f")
                .text("chunkIndex", "0")
                .file("file", "f", b"x"),
            "sessionID",
        ),
        (
            MultipartBody::new()
                .text("sessionID", "s")
                .text("filename", "f")
                .text("chunkIndex", "0"),
            "file",
        ),
    ];

    for (body, field) in cases {
        let (status, json) = server.send_json(body.into_request("/upload")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
        assert_eq!(json["code"], "invalid_input");
        assert!(
            json["message"].as_str().unwrap().contains(field),
            "{field} not named in {json}"
        );
    }

    let (_, json) = server
        .send_json(query_request("/status", &[("sessionID", "s"), ("filename", "f")]))
        .await;
    assert_eq!(json["uploaded"], json!([]));
}

#[tokio::test]
async fn test_upload_rejects_second_file_part() {
    let server = TestServer::new().await;
    let request = MultipartBody::new()
        .text("sessionID", "s")
        .text("filename", "f")
        .text("chunkIndex", "0")
        .file("file", "f", b"one")
        .file("file", "f", b"two")
        .into_request("/upload");

    let (status, json) = server.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn test_reupload_replaces_chunk() {
    let server = TestServer::new().await;
    server.upload("s", "f", 0, b"old contents").await;
    server.upload("s", "f", 0, b"new").await;

    let (status, json) = server
        .send_json(form_request("/merge", &[("sessionID", "s"), ("filename", "f")]))
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["size"], 3);
}

#[tokio::test]
async fn test_upload_rejects_filename_too_long_to_store() {
    let server = TestServer::new().await;
    let filename = "文".repeat(30);
    let request = MultipartBody::new()
        .text("sessionID", "s")
        .text("filename", &filename)
        .text("chunkIndex", "0")
        .file("file", "x.bin", b"x")
        .into_request("/upload");

    let (status, json) = server.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
    assert_eq!(json["code"], "invalid_input");
    assert!(json["message"].as_str().unwrap().contains("filename"));
}

#[tokio::test]
async fn test_upload_requires_multipart_body() {
    let server = TestServer::new().await;
    let (status, json) = server
        .send_json(form_request(
            "/upload",
            &[("sessionID", "s"), ("filename", "f"), ("chunkIndex", "0")],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let server = TestServer::with_config(|config| config.server.max_body_bytes = 1024).await;

    let request = MultipartBody::new()
        .file("file", "big.bin", &vec![7u8; 8192])
        .text("sessionID", "s")
        .text("filename", "big.bin")
        .text("chunkIndex", "0")
        .into_request("/upload");
    let (status, _) = server.send(request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (_, json) = server
        .send_json(query_request("/status", &[("sessionID", "s"), ("filename", "big.bin")]))
        .await;
    assert_eq!(json["uploaded"], json!([]));
}

#[tokio::test]
async fn test_status_requires_session_fields() {
    let server = TestServer::new().await;
    let (status, json) = server
        .send_json(query_request("/status", &[("filename", "f")]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_input");

    let (status, _) = server
        .send_json(query_request(
            "/status",
            &[("sessionID", "s"), ("filename", "f"), ("expectedTotal", "1.5")],
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
