//! 스트리밍 HTTP 다운로드
//!
//! 응답 본문을 청크 단위로 파일에 쓰면서 진행률을 보고한다.
//! 목적지는 디렉터리(파일명은 Content-Disposition에서 결정) 또는 파일 경로일 수 있다.

use crate::{ProgressSink, UpdaterError};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Content-Disposition에 파일명이 없을 때 쓰는 이름
pub const DEFAULT_FILE_NAME: &str = "new_download";

/// 바이트 수 → 진행률 변환기
///
/// 길이를 알면 `min(1, read/total)`, 모르면 `NaN`. 완료 시에는 항상 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    total: Option<u64>,
    read: u64,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            read: 0,
        }
    }

    /// `bytes`만큼 읽었음을 기록하고 현재 진행률 반환
    pub fn advance(&mut self, bytes: u64) -> f64 {
        self.read += bytes;
        match self.total {
            Some(total) => (self.read as f64 / total as f64).min(1.0),
            None => f64::NAN,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// 전송 완료 시 보고할 값
    pub fn finish(&self) -> f64 {
        1.0
    }
}

/// 다운로드 요청 하나
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub destination: &'a Path,
    /// 추가 헤더 (인증, Accept 등)
    pub headers: HeaderMap,
    pub progress: Option<ProgressSink<'a>>,
}

/// `request.url`을 받아 파일로 저장하고 저장된 절대 경로를 돌려준다.
pub async fn download_file(
    http: &reqwest::Client,
    request: DownloadRequest<'_>,
) -> Result<PathBuf, UpdaterError> {
    let response = http
        .get(request.url)
        .headers(request.headers)
        .send()
        .await
        .map_err(|e| UpdaterError::from_reqwest(&e, "download"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(UpdaterError::DownloadFailed {
            url: request.url.to_string(),
            status_code: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("Unknown Error :)")
                .to_string(),
        });
    }

    if is_directory_listing(response.headers(), response.url().as_str()) {
        return Err(UpdaterError::NotAFile {
            url: response.url().to_string(),
        });
    }

    let target = resolve_destination(request.destination, response.headers()).await?;
    tracing::info!("[Download] {} → {}", request.url, target.display());

    let mut file = tokio::fs::File::create(&target)
        .await
        .map_err(|e| UpdaterError::from_io(&e, "create file", &target))?;

    let mut tracker = ProgressTracker::new(response.content_length());
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpdaterError::from_reqwest(&e, "download body"))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "write", &target))?;
        let fraction = tracker.advance(chunk.len() as u64);
        if let Some(report) = request.progress {
            report(fraction);
        }
    }
    file.flush()
        .await
        .map_err(|e| UpdaterError::from_io(&e, "flush", &target))?;

    if let Some(report) = request.progress {
        report(tracker.finish());
    }

    tracing::info!("[Download] Complete: {} bytes", tracker.bytes_read());
    Ok(target)
}

/// text/html 이면서 최종 URL이 '/'로 끝나면 디렉터리 목록으로 본다
pub fn is_directory_listing(headers: &HeaderMap, final_url: &str) -> bool {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    content_type.contains("text/html") && final_url.ends_with('/')
}

/// 목적지를 디렉터리로 취급할지
///
/// 기존 파일이면 파일, 기존 디렉터리이거나 구분자로 끝나거나 파일명이 없으면 디렉터리.
pub fn treat_as_directory(path: &Path) -> bool {
    if path.is_file() {
        return false;
    }
    if path.is_dir() {
        return true;
    }
    let raw = path.as_os_str().to_string_lossy();
    if raw.ends_with('/') || raw.ends_with(std::path::MAIN_SEPARATOR) {
        return true;
    }
    path.file_name().is_none()
}

/// Content-Disposition 헤더에서 안전한 파일명 추출 (`filename*` 우선)
pub fn file_name_from_disposition(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;

    let mut plain = None;
    let mut extended = None;
    for part in value.split(';').map(str::trim) {
        let Some((key, val)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // RFC 5987: charset'lang'value
                let val = val.trim().trim_matches('"');
                let encoded = val.splitn(3, '\'').nth(2).unwrap_or(val);
                extended = Some(percent_decode(encoded));
            }
            "filename" => plain = Some(val.trim().trim_matches('"').to_string()),
            _ => {}
        }
    }

    let candidate = extended
        .filter(|s| !s.trim().is_empty())
        .or(plain)
        .filter(|s| !s.trim().is_empty())?;
    let trimmed = candidate.trim().trim_matches('"');
    // 경로 구성요소 제거 (../ 등)
    let safe = trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    if safe.is_empty() || safe == "." || safe == ".." {
        None
    } else {
        Some(safe.to_string())
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// 최종 저장 경로 결정 + 부모 디렉터리 생성 (실패 시 전송 시작 전에 에러)
async fn resolve_destination(
    destination: &Path,
    headers: &HeaderMap,
) -> Result<PathBuf, UpdaterError> {
    let mut target = destination.to_path_buf();
    if treat_as_directory(destination) {
        let name = file_name_from_disposition(headers).unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
        target = target.join(name);
    }
    let target = if target.is_absolute() {
        target
    } else {
        std::env::current_dir()
            .map_err(|e| UpdaterError::from_io(&e, "resolve destination", &target))?
            .join(target)
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| UpdaterError::InvalidPath {
            path: parent.display().to_string(),
            message: format!("Failed to ensure the destination directory exists. {}", e),
        })?;
    }
    Ok(target)
}
