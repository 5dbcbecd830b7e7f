//! # ARES 업데이터 라이브러리
//!
//! ARES(UI + Service) 릴리즈를 포지(GitHub)에서 찾아 내려받고 설치 디렉터리에 풉니다.
//!
//! ## 구성
//! - **버전(version.rs)**: 시맨틱 버전, 릴리즈 태그 ↔ 버전 변환
//! - **GitHub(github.rs)**: 릴리즈 목록(VersionCatalog)과 에셋 선택/다운로드
//! - **다운로드(download.rs)**: 스트리밍 HTTP 다운로드 + 진행률
//! - **아카이브(archive.rs)**: zip 압축 해제
//! - **메타데이터(metadata.rs)**: 설치 디렉터리마다 남기는 `areslauncher.metadata.json`
//! - **에러(error.rs)**: 네트워크 끊김, 타임아웃 등 장애 분류
//!
//! 새 포지 지원은 [`ReleaseDownloader`] 구현체를 하나 더 추가하는 방식으로 합니다.

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod archive;
pub mod download;
pub mod error;
pub mod github;
pub mod metadata;
pub mod version;

pub use error::UpdaterError;
pub use github::{ForgeOptions, GitHubAsset, GitHubClient, GitHubRelease};
pub use metadata::{BinaryMetadata, METADATA_FILE_NAME};
pub use version::SemVer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

// ══════════════════════════════════════════════════════
// 소스 / 컴포넌트 정의
// ══════════════════════════════════════════════════════

/// 릴리즈 저장소 식별자
///
/// `bundle`이 true면 릴리즈 하나의 에셋에 UI와 Service가 함께 들어 있다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AresSource {
    #[serde(alias = "Owner")]
    pub owner: String,
    #[serde(alias = "Repo")]
    pub repo: String,
    #[serde(default = "default_bundle", alias = "Bundle")]
    pub bundle: bool,
}

fn default_bundle() -> bool {
    true
}

impl AresSource {
    pub fn new(owner: &str, repo: &str, bundle: bool) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            bundle,
        }
    }
}

impl Default for AresSource {
    fn default() -> Self {
        Self::new("AutonomousResearchSystems", "ARES_OS", true)
    }
}

impl fmt::Display for AresSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// 릴리즈 안에서 고를 에셋 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Ui,
    Service,
    Both,
}

impl Component {
    /// 에셋 이름에 모두 포함되어야 하는 키워드 (대소문자 무시)
    pub fn asset_keywords(&self, os: &str) -> Vec<String> {
        match self {
            Component::Ui => vec!["ui".to_string(), os.to_string()],
            Component::Service => vec!["service".to_string(), os.to_string()],
            Component::Both => vec![os.to_string()],
        }
    }

    /// 사용자 표시용 이름
    pub fn display_name(&self) -> &'static str {
        match self {
            Component::Ui => "UI",
            Component::Service => "Service",
            Component::Both => "Bundle",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 에셋 이름에 쓰이는 호스트 OS 이름
pub fn host_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "macos") {
        "macos"
    } else {
        "unknown"
    }
}

/// 진행률 콜백. 0.0..=1.0, 길이를 모르면 `NaN`
pub type ProgressSink<'a> = &'a (dyn Fn(f64) + Send + Sync);

// ══════════════════════════════════════════════════════
// 포지 추상화
// ══════════════════════════════════════════════════════

/// 릴리즈 포지 하나에 대한 버전 목록 조회 + 에셋 다운로드
pub trait ReleaseDownloader: Send + Sync {
    /// 저장소에 게시된 버전 목록. 태그를 해석할 수 없는 릴리즈는 건너뛴다.
    /// 저장소를 찾지 못하면(토큰 누락 등) 빈 목록을 돌려준다.
    fn available_versions(
        &self,
        source: &AresSource,
        auth_token: Option<&str>,
    ) -> impl Future<Output = Result<Vec<SemVer>, UpdaterError>> + Send;

    /// `version` 릴리즈에서 `component` 에셋을 `destination`(디렉터리 또는 파일 경로)으로 내려받고
    /// 실제 저장된 파일 경로를 돌려준다.
    fn download(
        &self,
        source: &AresSource,
        version: &SemVer,
        component: Component,
        destination: &Path,
        auth_token: Option<&str>,
        progress: Option<ProgressSink<'_>>,
    ) -> impl Future<Output = Result<PathBuf, UpdaterError>> + Send;
}
