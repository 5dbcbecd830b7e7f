//! 설치 디렉터리 메타데이터 사이드카
//!
//! 설치가 끝날 때마다 각 디렉터리에 어떤 소스의 어떤 버전인지 기록한다.
//! 최적화 용도일 뿐이라 읽기/쓰기 실패는 모두 삼키고, 없으면 파일 버전 탐지로 대체된다.

use crate::{AresSource, SemVer};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const METADATA_FILE_NAME: &str = "areslauncher.metadata.json";

/// 사이드카 내용 (`{"source": {...}, "version": "1.2.0"}`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMetadata {
    #[serde(default, alias = "Source")]
    pub source: Option<AresSource>,
    #[serde(default, alias = "Version")]
    pub version: Option<String>,
}

impl BinaryMetadata {
    /// 저장된 버전 문자열을 파싱
    pub fn semver(&self) -> Option<SemVer> {
        self.version.as_deref().and_then(SemVer::parse)
    }
}

/// `directory`에 사이드카 기록 (best-effort)
pub fn write_metadata(directory: &Path, source: &AresSource, version: &SemVer) {
    if directory.as_os_str().is_empty() {
        return;
    }
    let metadata = BinaryMetadata {
        source: Some(source.clone()),
        version: Some(version.to_normalized_string()),
    };
    let path = directory.join(METADATA_FILE_NAME);

    let result = serde_json::to_string_pretty(&metadata)
        .map_err(std::io::Error::from)
        .and_then(|json| {
            std::fs::create_dir_all(directory)?;
            std::fs::write(&path, json)
        });
    if let Err(e) = result {
        tracing::debug!("[Metadata] Could not write {}: {}", path.display(), e);
    }
}

/// `directory`의 사이드카 읽기. 없거나 깨졌으면 `None`
pub fn read_metadata(directory: &Path) -> Option<BinaryMetadata> {
    if directory.as_os_str().is_empty() {
        return None;
    }
    let path = directory.join(METADATA_FILE_NAME);
    let content = std::fs::read_to_string(&path).ok()?;
    if content.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&content) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::debug!("[Metadata] Ignoring unreadable {}: {}", path.display(), e);
            None
        }
    }
}
