//! 런처 최상위 에러 타입. 에러 종류를 구분하여 IPC 핸들러에서
//! 적절한 HTTP 상태 코드를 반환할 수 있게 합니다.

use crate::database::DatabaseError;
use crate::settings::SettingsError;
use crate::supervisor::SupervisorError;
use ares_updater::UpdaterError;
use axum::http::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum LauncherError {
    #[error(transparent)]
    Updater(#[from] UpdaterError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("An update is already in progress")]
    UpdateInProgress,

    #[error("No versions found for ARES")]
    NoVersionsFound,

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Updater(e) => match e {
                UpdaterError::ReleaseNotFound { .. } | UpdaterError::AssetNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                UpdaterError::NetworkError { .. }
                | UpdaterError::Timeout { .. }
                | UpdaterError::ApiError { .. }
                | UpdaterError::DownloadFailed { .. }
                | UpdaterError::NotAFile { .. } => StatusCode::BAD_GATEWAY,
                UpdaterError::UnsupportedArchive { .. } | UpdaterError::InvalidPath { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                UpdaterError::FileSystemError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Supervisor(e) => match e {
                SupervisorError::AlreadyOwned(_) => StatusCode::CONFLICT,
                SupervisorError::ExecutableNotFound { .. } => StatusCode::NOT_FOUND,
                SupervisorError::ProcessNotRunning(_) => StatusCode::GONE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Settings(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpdateInProgress => StatusCode::CONFLICT,
            Self::NoVersionsFound => StatusCode::NOT_FOUND,
            Self::InvalidVersion(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Updater(e) => match e {
                UpdaterError::NetworkError { .. } => "NETWORK_ERROR",
                UpdaterError::Timeout { .. } => "TIMEOUT",
                UpdaterError::ApiError { .. } => "FORGE_API_ERROR",
                UpdaterError::ReleaseNotFound { .. } => "RELEASE_NOT_FOUND",
                UpdaterError::AssetNotFound { .. } => "ASSET_NOT_FOUND",
                UpdaterError::DownloadFailed { .. } => "DOWNLOAD_FAILED",
                UpdaterError::NotAFile { .. } => "NOT_A_FILE",
                UpdaterError::InvalidPath { .. } => "INVALID_PATH",
                UpdaterError::FileSystemError { .. } => "FILESYSTEM_ERROR",
                UpdaterError::UnsupportedArchive { .. } => "UNSUPPORTED_ARCHIVE",
            },
            Self::Supervisor(e) => e.error_code(),
            Self::Database(e) => e.error_code(),
            Self::Settings(_) => "SETTINGS_ERROR",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::NoVersionsFound => "NO_VERSIONS_FOUND",
            Self::InvalidVersion(_) => "INVALID_VERSION",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

/// axum 핸들러에서 LauncherError를 직접 반환할 수 있도록 IntoResponse 구현
impl axum::response::IntoResponse for LauncherError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
