//! 설치된 바이너리 인벤토리
//!
//! UI / Service 디렉터리의 메타데이터 사이드카를 읽어 현재 버전과 소스를 정하고,
//! 사이드카가 없으면 실행 파일에서 버전을 직접 탐지한다.
//! 게시된 버전 목록은 설정된 기본 저장소에서 가져온다.

use crate::config::LauncherConfig;
use crate::settings::{self, AppSettings};
use ares_updater::metadata::read_metadata;
use ares_updater::version::latest;
use ares_updater::{AresSource, Component, ReleaseDownloader, SemVer, UpdaterError};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// `refresh()` 시점의 인벤토리 스냅샷
#[derive(Debug, Clone, Default, Serialize)]
pub struct InventorySnapshot {
    /// `None`이면 설치된 것이 없음
    pub current_version: Option<SemVer>,
    pub current_source: Option<AresSource>,
    pub available_versions: Vec<SemVer>,
    pub ui_settings: Option<AppSettings>,
    pub service_settings: Option<AppSettings>,
}

impl InventorySnapshot {
    pub fn is_installed(&self) -> bool {
        self.current_version.is_some()
    }

    /// 게시된 버전이 있고, 설치본이 없거나 최신 게시 버전이 더 높으면 true
    pub fn update_available(&self) -> bool {
        let Some(newest) = latest(&self.available_versions) else {
            return false;
        };
        match &self.current_version {
            None => true,
            Some(current) => newest > current,
        }
    }

    pub fn latest_available(&self) -> Option<&SemVer> {
        latest(&self.available_versions)
    }
}

pub struct BinaryInventory<D> {
    config: Arc<LauncherConfig>,
    downloader: Arc<D>,
    snapshot: RwLock<InventorySnapshot>,
}

impl<D: ReleaseDownloader> BinaryInventory<D> {
    pub fn new(config: Arc<LauncherConfig>, downloader: Arc<D>) -> Self {
        Self {
            config,
            downloader,
            snapshot: RwLock::new(InventorySnapshot::default()),
        }
    }

    pub async fn snapshot(&self) -> InventorySnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn current_version(&self) -> Option<SemVer> {
        self.snapshot.read().await.current_version.clone()
    }

    pub async fn current_source(&self) -> Option<AresSource> {
        self.snapshot.read().await.current_source.clone()
    }

    pub async fn available_versions(&self) -> Vec<SemVer> {
        self.snapshot.read().await.available_versions.clone()
    }

    pub async fn update_available(&self) -> bool {
        self.snapshot.read().await.update_available()
    }

    /// 로컬 설치 상태와 게시된 버전 목록을 모두 갱신
    pub async fn refresh(&self) -> InventorySnapshot {
        self.refresh_local().await;
        self.refresh_available().await;
        self.snapshot().await
    }

    /// 디스크만 다시 읽는다 (네트워크 없음)
    pub async fn refresh_local(&self) {
        let local = scan_local(&self.config);
        let mut snap = self.snapshot.write().await;
        snap.current_version = local.current_version;
        snap.current_source = local.current_source;
        snap.ui_settings = local.ui_settings;
        snap.service_settings = local.service_settings;
    }

    /// 게시된 버전 목록만 다시 조회. 실패하면 빈 목록으로 둔다
    pub async fn refresh_available(&self) {
        let available = match self.query_available().await {
            Ok(versions) => versions,
            Err(e) => {
                tracing::error!("[Inventory] Failed to query available ARES versions: {}", e);
                Vec::new()
            }
        };
        self.snapshot.write().await.available_versions = available;
    }

    /// 에러를 그대로 돌려주는 조회 (`update_latest`용)
    pub async fn query_available(&self) -> Result<Vec<SemVer>, UpdaterError> {
        self.downloader
            .available_versions(&self.config.current_ares_repo, self.config.auth_token())
            .await
    }
}

/// 로컬 디렉터리 스캔 결과 (available_versions는 비어 있음)
fn scan_local(config: &LauncherConfig) -> InventorySnapshot {
    let ui_dir = config.data_dir(Component::Ui);
    let service_dir = config.data_dir(Component::Service);

    let ui_settings = load_settings(&config.settings_path(Component::Ui));
    let service_settings = load_settings(&config.settings_path(Component::Service));
    if ui_settings.is_none() {
        tracing::debug!("[Inventory] Ui settings not found in {}", ui_dir.display());
    }
    if service_settings.is_none() {
        tracing::debug!("[Inventory] Service settings not found in {}", service_dir.display());
    }

    let ui_meta = read_metadata(ui_dir);
    let service_meta = read_metadata(service_dir);
    if let (Some(ui), Some(service)) = (&ui_meta, &service_meta) {
        let versions_match = match (&ui.version, &service.version) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (a, b) => a == b,
        };
        if !versions_match || ui.source != service.source {
            tracing::warn!("[Inventory] Binary metadata mismatch between UI and Service directories.");
        }
    }
    // UI 쪽이 우선
    let metadata = ui_meta.or(service_meta);

    let from_metadata = metadata.as_ref().and_then(|m| m.semver());
    if from_metadata.is_none() {
        tracing::warn!("[Inventory] Unable to find the version metadata file. Probing executables.");
    }
    let current_version = from_metadata.or_else(|| probe_installed_version(config));

    let current_source = metadata
        .and_then(|m| m.source)
        .or_else(|| current_version.as_ref().map(|_| config.current_ares_repo.clone()));

    InventorySnapshot {
        current_version,
        current_source,
        available_versions: Vec::new(),
        ui_settings,
        service_settings,
    }
}

fn load_settings(path: &Path) -> Option<AppSettings> {
    if path.is_file() {
        Some(settings::read_settings(path))
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════
// 실행 파일 버전 탐지 (사이드카가 없을 때)
// ═══════════════════════════════════════════════════════════

/// UI → Service 순서로 실행 파일에서 버전을 찾는다
pub fn probe_installed_version(config: &LauncherConfig) -> Option<SemVer> {
    [Component::Ui, Component::Service].into_iter().find_map(|component| {
        let exe = config.executable_path(component);
        if !exe.is_file() {
            return None;
        }
        let found = assembly_version(&exe).or_else(|| file_version(&exe));
        if let Some(ref v) = found {
            tracing::info!("[Inventory] Detected {} version {} from {}", component, v, exe.display());
        }
        found
    })
}

/// 관리 어셈블리 버전: 실행 파일 옆 `<이름>.deps.json`의 project 라이브러리 항목
pub fn assembly_version(executable: &Path) -> Option<SemVer> {
    let stem = executable.file_stem()?.to_str()?;
    let manifest = executable.with_file_name(format!("{}.deps.json", stem));
    let content = std::fs::read_to_string(manifest).ok()?;
    let json: serde_json::Value = serde_json::from_str(&content).ok()?;
    let libraries = json.get("libraries")?.as_object()?;

    let projects: Vec<(&str, &str)> = libraries
        .iter()
        .filter(|(_, lib)| lib.get("type").and_then(|t| t.as_str()) == Some("project"))
        .filter_map(|(key, _)| key.split_once('/'))
        .collect();

    // 실행 파일과 이름이 같은 프로젝트 우선, 없으면 첫 번째 프로젝트
    let (_, version) = projects
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(stem))
        .or_else(|| projects.first())?;
    parse_file_version(version)
}

/// OS 파일 버전 정보 (Windows `VS_FIXEDFILEINFO`)
#[cfg(windows)]
pub fn file_version(executable: &Path) -> Option<SemVer> {
    use std::os::windows::ffi::OsStrExt;
    use winapi::ctypes::c_void;
    use winapi::um::winver::VS_FIXEDFILEINFO;
    use winapi::um::winver::{GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW};

    let wide: Vec<u16> = executable.as_os_str().encode_wide().chain(Some(0)).collect();
    let root: Vec<u16> = "\\".encode_utf16().chain(Some(0)).collect();

    unsafe {
        let mut handle = 0u32;
        let size = GetFileVersionInfoSizeW(wide.as_ptr(), &mut handle);
        if size == 0 {
            return None;
        }
        let mut buffer = vec![0u8; size as usize];
        if GetFileVersionInfoW(wide.as_ptr(), 0, size, buffer.as_mut_ptr() as *mut c_void) == 0 {
            return None;
        }
        let mut info: *mut c_void = std::ptr::null_mut();
        let mut len = 0u32;
        if VerQueryValueW(buffer.as_ptr() as *const c_void, root.as_ptr(), &mut info, &mut len) == 0
            || info.is_null()
            || (len as usize) < std::mem::size_of::<VS_FIXEDFILEINFO>()
        {
            return None;
        }
        let fixed = &*(info as *const VS_FIXEDFILEINFO);
        let version = format!(
            "{}.{}.{}",
            fixed.dwProductVersionMS >> 16,
            fixed.dwProductVersionMS & 0xffff,
            fixed.dwProductVersionLS >> 16,
        );
        parse_file_version(&version)
    }
}

#[cfg(not(windows))]
pub fn file_version(_executable: &Path) -> Option<SemVer> {
    None
}

/// 파일 버전 문자열 정리 후 파싱
///
/// 공백 뒤 꼬리(`1.4.0 (release)`)를 자르고, 4자리 어셈블리 버전(`1.4.0.0`)은 앞 3자리만 쓴다.
pub fn parse_file_version(raw: &str) -> Option<SemVer> {
    let trimmed = raw.trim();
    let head = trimmed.split_whitespace().next()?;
    if let Some(v) = SemVer::parse(head) {
        return Some(v);
    }
    let numbers: Vec<u64> = head
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match numbers.as_slice() {
        [major, minor, patch, _revision] => Some(SemVer::new(*major, *minor, *patch)),
        [major, minor] => Some(SemVer::new(*major, *minor, 0)),
        _ => None,
    }
}
