//! ═══════════════════════════════════════════════════════════════════
//! 스트리밍 다운로드 통합 테스트
//! ═══════════════════════════════════════════════════════════════════
//!
//! 로컬 HTTP 서버를 상대로 `download_file`의 진행률 보고, 디렉터리 목록 거부,
//! 실패 상태 코드, 파일명 결정 규칙을 확인합니다.

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use reqwest::header::HeaderMap;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

use ares_updater::download::{download_file, DownloadRequest, DEFAULT_FILE_NAME};
use ares_updater::UpdaterError;

// ═══════════════════════════════════════════════════════
// 테스트 서버
// ═══════════════════════════════════════════════════════

/// Content-Length 없이 청크로 흘려보내는 본문
fn chunked_body() -> Body {
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from_static(b"PK-first-")),
        Ok(Bytes::from_static(b"second-")),
        Ok(Bytes::from_static(b"third")),
    ];
    Body::from_stream(futures_util::stream::iter(chunks))
}

async fn serve() -> String {
    let app = Router::new()
        .route(
            "/chunked",
            get(|| async {
                (
                    [(header::CONTENT_DISPOSITION, "attachment; filename=\"x.zip\"")],
                    chunked_body(),
                )
            }),
        )
        .route("/plain", get(|| async { "0123456789" }))
        .route(
            "/sized",
            get(|| async {
                (
                    [(header::CONTENT_DISPOSITION, "attachment; filename*=UTF-8''ares%20ui.zip")],
                    vec![7u8; 4096],
                )
            }),
        )
        .route("/dir/", get(|| async { Html("<html><body>Index of /dir/</body></html>") }))
        .route("/busy", get(|| async { StatusCode::SERVICE_UNAVAILABLE.into_response() }))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND.into_response() }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn fetch(
    url: &str,
    destination: &Path,
    seen: &Mutex<Vec<f64>>,
) -> Result<std::path::PathBuf, UpdaterError> {
    let sink = |p: f64| seen.lock().unwrap().push(p);
    download_file(
        &reqwest::Client::new(),
        DownloadRequest {
            url,
            destination,
            headers: HeaderMap::new(),
            progress: Some(&sink),
        },
    )
    .await
}

// ═══════════════════════════════════════════════════════
// 진행률 + 파일명
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn unknown_length_reports_nan_then_completes() {
    let base = serve().await;
    let dir = TempDir::new().unwrap();
    let seen = Mutex::new(Vec::new());

    let saved = fetch(&format!("{}/chunked", base), dir.path(), &seen).await.unwrap();

    assert_eq!(saved, dir.path().join("x.zip"));
    assert_eq!(std::fs::read(&saved).unwrap(), b"PK-first-second-third");

    let seen = seen.into_inner().unwrap();
    assert!(seen.len() >= 2, "{:?}", seen);
    let (last, during) = seen.split_last().unwrap();
    assert_eq!(*last, 1.0);
    assert!(during.iter().all(|p| p.is_nan()), "{:?}", during);
}

#[tokio::test]
async fn known_length_progress_is_monotonic() {
    let base = serve().await;
    let dir = TempDir::new().unwrap();
    let seen = Mutex::new(Vec::new());

    let saved = fetch(&format!("{}/sized", base), dir.path(), &seen).await.unwrap();

    // filename* 가 우선
    assert_eq!(saved, dir.path().join("ares ui.zip"));
    assert_eq!(std::fs::metadata(&saved).unwrap().len(), 4096);

    let seen = seen.into_inner().unwrap();
    assert!(seen.iter().all(|p| !p.is_nan() && (0.0..=1.0).contains(p)), "{:?}", seen);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[tokio::test]
async fn missing_disposition_uses_default_name() {
    let base = serve().await;
    let dir = TempDir::new().unwrap();
    let seen = Mutex::new(Vec::new());

    let saved = fetch(&format!("{}/plain", base), dir.path(), &seen).await.unwrap();
    assert_eq!(saved, dir.path().join(DEFAULT_FILE_NAME));
    assert_eq!(std::fs::read_to_string(&saved).unwrap(), "0123456789");
}

#[tokio::test]
async fn explicit_file_destination_is_kept() {
    let base = serve().await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("nested").join("chosen.bin");
    let seen = Mutex::new(Vec::new());

    let saved = fetch(&format!("{}/chunked", base), &target, &seen).await.unwrap();
    assert_eq!(saved, target);
    assert!(!dir.path().join("nested").join("x.zip").exists());
}

// ═══════════════════════════════════════════════════════
// 실패
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn html_directory_listing_is_rejected() {
    let base = serve().await;
    let dir = TempDir::new().unwrap();
    let seen = Mutex::new(Vec::new());

    let err = fetch(&format!("{}/dir/", base), dir.path(), &seen).await.unwrap_err();
    assert!(matches!(&err, UpdaterError::NotAFile { url } if url.ends_with("/dir/")), "{:?}", err);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0, "nothing written");
    assert!(seen.into_inner().unwrap().is_empty());
}

#[tokio::test]
async fn failure_status_carries_reason_phrase() {
    let base = serve().await;
    let dir = TempDir::new().unwrap();
    let seen = Mutex::new(Vec::new());

    let err = fetch(&format!("{}/busy", base), dir.path(), &seen).await.unwrap_err();
    match &err {
        UpdaterError::DownloadFailed { status_code, reason, .. } => {
            assert_eq!(*status_code, 503);
            assert_eq!(reason, "Service Unavailable");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_recoverable());

    let err = fetch(&format!("{}/missing", base), dir.path(), &seen).await.unwrap_err();
    assert!(matches!(
        &err,
        UpdaterError::DownloadFailed { status_code: 404, reason, .. } if reason == "Not Found"
    ));
    assert!(!err.is_recoverable());
}
