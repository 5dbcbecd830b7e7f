//! 업데이터 에러 타입
//!
//! ## 지원하는 에러 상황
//! - 네트워크 끊김 / 타임아웃
//! - 포지(GitHub) API 응답 오류, 릴리즈/에셋 없음
//! - 다운로드 실패, 디렉토리 URL
//! - 파일 시스템 오류, 지원하지 않는 아카이브

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 업데이터 에러 타입
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum UpdaterError {
    /// 네트워크 연결 실패
    NetworkError {
        message: String,
    },
    /// HTTP 요청 타임아웃
    Timeout {
        operation: String,
    },
    /// API 응답 오류 (404는 호출부에서 "릴리즈 없음"으로 처리)
    ApiError {
        status_code: u16,
        message: String,
    },
    /// 요청한 버전의 릴리즈가 없음
    ReleaseNotFound {
        source: String,
        version: String,
    },
    /// 릴리즈에 해당 컴포넌트/OS용 에셋이 없음
    AssetNotFound {
        source: String,
        version: String,
        component: String,
    },
    /// HTTP 전송 실패 (비성공 상태 코드)
    DownloadFailed {
        url: String,
        status_code: u16,
        reason: String,
    },
    /// 파일이 아니라 디렉토리 목록을 가리키는 URL
    NotAFile {
        url: String,
    },
    /// 잘못된 경로 (목적지가 파일, 아카이브 없음 등)
    InvalidPath {
        path: String,
        message: String,
    },
    /// 파일 시스템 오류
    FileSystemError {
        operation: String,
        path: String,
        message: String,
    },
    /// zip 이외의 아카이브
    UnsupportedArchive {
        path: String,
    },
}

impl fmt::Display for UpdaterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdaterError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            UpdaterError::Timeout { operation } => {
                write!(f, "Timeout: {}", operation)
            }
            UpdaterError::ApiError { status_code, message } => {
                write!(f, "API error ({}): {}", status_code, message)
            }
            UpdaterError::ReleaseNotFound { source, version } => {
                write!(f, "No release {} found in {}", version, source)
            }
            UpdaterError::AssetNotFound { source, version, component } => {
                write!(
                    f,
                    "Release {} of {} has no {} asset for this platform",
                    version, source, component
                )
            }
            UpdaterError::DownloadFailed { url, status_code, reason } => {
                write!(f, "Download of {} failed ({}): {}", url, status_code, reason)
            }
            UpdaterError::NotAFile { url } => {
                write!(f, "The downloader only downloads files, not directories: {}", url)
            }
            UpdaterError::InvalidPath { path, message } => {
                write!(f, "Invalid path '{}': {}", path, message)
            }
            UpdaterError::FileSystemError { operation, path, message } => {
                write!(f, "File system error during {} on '{}': {}", operation, path, message)
            }
            UpdaterError::UnsupportedArchive { path } => {
                write!(f, "Unsupported archive type: {}", path)
            }
        }
    }
}

impl std::error::Error for UpdaterError {}

impl UpdaterError {
    /// 재시도로 해결될 수 있는 에러인지
    pub fn is_recoverable(&self) -> bool {
        match self {
            UpdaterError::NetworkError { .. } => true,
            UpdaterError::Timeout { .. } => true,
            // 5xx 에러는 재시도 가능, 4xx는 불가능
            UpdaterError::ApiError { status_code, .. } => *status_code >= 500,
            UpdaterError::DownloadFailed { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }

    /// reqwest 에러를 UpdaterError로 변환
    pub fn from_reqwest(err: &reqwest::Error, operation: &str) -> Self {
        if err.is_timeout() {
            UpdaterError::Timeout {
                operation: operation.to_string(),
            }
        } else if let Some(status) = err.status() {
            UpdaterError::ApiError {
                status_code: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            UpdaterError::NetworkError {
                message: format!("{}: {}", operation, err),
            }
        }
    }

    /// IO 에러를 UpdaterError로 변환
    pub fn from_io(err: &std::io::Error, operation: &str, path: &Path) -> Self {
        UpdaterError::FileSystemError {
            operation: operation.to_string(),
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
