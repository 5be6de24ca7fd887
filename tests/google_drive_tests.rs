//! Google Drive uploader tests against a mock API server

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drive_recorder::application::ports::{AuthError, StorageUploader, UploadError};
use drive_recorder::application::UploadRecordingUseCase;
use drive_recorder::domain::capture::FinishedRecording;
use drive_recorder::domain::recording::{AudioData, AudioMimeType};
use drive_recorder::infrastructure::{GoogleDriveUploader, TokenAuthProvider};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

fn audio() -> AudioData {
    AudioData::new(b"OggS fake opus".to_vec(), AudioMimeType::OggOpus)
}

fn signed_in() -> Arc<TokenAuthProvider> {
    Arc::new(TokenAuthProvider::new(Some("test-token".to_string())))
}

async fn mount_folder_listing(server: &MockServer, files: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("fields", "files(id,name)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": files })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_upload(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/upload/drive/v2/files"))
        .and(query_param("uploadType", "multipart"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn uploads_into_existing_folder() {
    let server = MockServer::start().await;
    mount_folder_listing(
        &server,
        json!([{ "id": "folder-1", "name": "AUDIO RECORDING" }]),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v2/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains("\"title\":\"AUDIO-"))
        .and(body_string_contains("\"parents\":[{\"id\":\"folder-1\"}]"))
        .and(body_string_contains("Content-Transfer-Encoding: base64"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = GoogleDriveUploader::with_base_url(signed_in(), server.uri());
    let receipt = uploader.upload(&audio(), "AUDIO RECORDING").await.unwrap();

    assert_eq!(receipt.file_id, "file-42");
    assert_eq!(receipt.folder_id, "folder-1");
}

#[tokio::test]
async fn creates_missing_folder() {
    let server = MockServer::start().await;
    mount_folder_listing(&server, json!([])).await;

    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_json(json!({ "name": "Voice memos", "mimeType": FOLDER_MIME_TYPE })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "folder-new" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_upload(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "id": "file-7" })),
    )
    .await;

    let uploader = GoogleDriveUploader::with_base_url(signed_in(), server.uri());
    let receipt = uploader.upload(&audio(), "Voice memos").await.unwrap();

    assert_eq!(receipt.folder_id, "folder-new");
    assert_eq!(receipt.file_id, "file-7");
}

#[tokio::test]
async fn listing_with_other_names_still_creates_folder() {
    let server = MockServer::start().await;
    mount_folder_listing(&server, json!([{ "id": "other", "name": "Voice memos 2" }])).await;

    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "folder-new" })))
        .expect(1)
        .mount(&server)
        .await;

    let uploader = GoogleDriveUploader::with_base_url(signed_in(), server.uri());
    let folder_id = uploader.find_or_create_folder("Voice memos").await.unwrap();
    assert_eq!(folder_id, "folder-new");
}

#[tokio::test]
async fn unauthorized_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let uploader = GoogleDriveUploader::with_base_url(signed_in(), server.uri());
    let err = uploader.upload(&audio(), "AUDIO RECORDING").await.unwrap_err();
    assert!(matches!(err, UploadError::Unauthorized));
}

#[tokio::test]
async fn rate_limit_is_reported() {
    let server = MockServer::start().await;
    mount_folder_listing(&server, json!([{ "id": "folder-1", "name": "AUDIO RECORDING" }])).await;
    mount_upload(&server, ResponseTemplate::new(429)).await;

    let uploader = GoogleDriveUploader::with_base_url(signed_in(), server.uri());
    let err = uploader.upload(&audio(), "AUDIO RECORDING").await.unwrap_err();
    assert!(matches!(err, UploadError::RateLimited));
}

#[tokio::test]
async fn server_error_carries_status_and_body() {
    let server = MockServer::start().await;
    mount_folder_listing(&server, json!([{ "id": "folder-1", "name": "AUDIO RECORDING" }])).await;
    mount_upload(
        &server,
        ResponseTemplate::new(500).set_body_string("backend exploded"),
    )
    .await;

    let uploader = GoogleDriveUploader::with_base_url(signed_in(), server.uri());
    let err = uploader.upload(&audio(), "AUDIO RECORDING").await.unwrap_err();

    match err {
        UploadError::ApiError(message) => {
            assert!(message.contains("500"));
            assert!(message.contains("backend exploded"));
        }
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn signed_out_uploader_sends_nothing() {
    let server = MockServer::start().await;
    let uploader =
        GoogleDriveUploader::with_base_url(Arc::new(TokenAuthProvider::signed_out()), server.uri());

    let err = uploader.upload(&audio(), "AUDIO RECORDING").await.unwrap_err();
    assert!(matches!(err, UploadError::Auth(AuthError::SignedOut)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn use_case_skips_upload_when_signed_out() {
    let server = MockServer::start().await;
    let auth = Arc::new(TokenAuthProvider::signed_out());
    let uploader = GoogleDriveUploader::with_base_url(auth.clone(), server.uri());
    let use_case = UploadRecordingUseCase::new(uploader, auth, "AUDIO RECORDING");

    let err = use_case
        .execute(&FinishedRecording::new(audio()))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::NotSignedIn));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn use_case_uploads_after_sign_in() {
    let server = MockServer::start().await;
    mount_folder_listing(&server, json!([{ "id": "folder-1", "name": "AUDIO RECORDING" }])).await;
    mount_upload(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "id": "file-9" })),
    )
    .await;

    let auth = Arc::new(TokenAuthProvider::signed_out());
    let uploader = GoogleDriveUploader::with_base_url(auth.clone(), server.uri());
    let use_case = UploadRecordingUseCase::new(uploader, auth.clone(), "AUDIO RECORDING");
    assert!(!use_case.is_signed_in());

    auth.sign_in("test-token");
    let receipt = use_case
        .execute(&FinishedRecording::new(audio()))
        .await
        .unwrap();
    assert_eq!(receipt.file_id, "file-9");
}
