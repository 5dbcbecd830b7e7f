//! 런처 설정 (`config/launcher.toml`)
//!
//! 실행 파일 옆 `config/launcher.toml`을 읽는다. `ARES_LAUNCHER_CONFIG` 환경 변수로 경로를 바꿀 수 있다.
//! 파일이 없으면 기본값을 쓰고 그 기본값을 파일로 남긴다. 파싱에 실패하면 경고 후 기본값.

use ares_updater::{AresSource, Component, ForgeOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "ARES_LAUNCHER_CONFIG";
pub const SETTINGS_FILE_NAME: &str = "appsettings.json";

/// 실행 파일이 있는 디렉터리 (없으면 현재 디렉터리)
pub fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// 플랫폼 실행 파일 이름 (Windows는 .exe)
pub fn platform_executable(name: &str) -> String {
    if cfg!(target_os = "windows") && !name.to_ascii_lowercase().ends_with(".exe") {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// 런처 자체 릴리즈 저장소
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSource {
    pub owner: String,
    pub repo: String,
}

impl Default for LauncherSource {
    fn default() -> Self {
        Self {
            owner: "AutonomousResearchSystems".to_string(),
            repo: "ARES_Launcher".to_string(),
        }
    }
}

impl From<&LauncherSource> for AresSource {
    fn from(src: &LauncherSource) -> Self {
        AresSource::new(&src.owner, &src.repo, true)
    }
}

/// 컴포넌트 appsettings에 기록되는 DB 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum DatabaseProvider {
    #[default]
    None,
    Sqlite,
    SqlServer,
    Postgres,
}

impl DatabaseProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseProvider::None => "None",
            DatabaseProvider::Sqlite => "Sqlite",
            DatabaseProvider::SqlServer => "SqlServer",
            DatabaseProvider::Postgres => "Postgres",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub provider: DatabaseProvider,
    /// SQLite 파일 경로. 설정되면 `Sqlite` 연결 문자열로 기록된다
    pub sqlite_database_path: Option<String>,
    pub check_flag: String,
    pub migrate_flag: String,
    /// 프로바이더 이름 → 연결 문자열
    pub connection_strings: BTreeMap<String, String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            provider: DatabaseProvider::None,
            sqlite_database_path: None,
            check_flag: "--check-database".to_string(),
            migrate_flag: "--migrate".to_string(),
            connection_strings: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// PFX 경로 (기본: `<app>/certs/ares.pfx`)
    pub path: PathBuf,
    pub password: Option<String>,
    /// OS 신뢰 저장소에 등록할지
    pub install_to_trust_store: bool,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            path: app_dir().join("certs").join("ares.pfx"),
            password: None,
            install_to_trust_store: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Stop 요청 후 강제 종료까지 기다리는 시간
    pub stop_grace_period_ms: u64,
    /// 입양한(자식이 아닌) 프로세스 생존 확인 주기
    pub adoption_poll_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_grace_period_ms: 5_000,
            adoption_poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub ui_data_path: PathBuf,
    pub service_data_path: PathBuf,
    pub ui_executable_name: String,
    pub service_executable_name: String,
    /// 충돌 감지에 쓰는 OS 프로세스 이름
    pub ui_process_name: String,
    pub service_process_name: String,
    pub ui_endpoint: String,
    pub service_endpoint: String,
    pub git_token: Option<String>,
    pub ipc_listen: String,
    /// 다운로드 임시 디렉터리 (기본: OS temp)
    pub download_dir: Option<PathBuf>,
    // TOML은 값 필드가 테이블보다 먼저 와야 한다
    pub current_ares_repo: AresSource,
    pub available_ares_repos: Vec<AresSource>,
    pub launcher_source: LauncherSource,
    pub database: DatabaseConfig,
    pub certificate: CertificateConfig,
    pub forge: ForgeOptions,
    pub supervisor: SupervisorConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        let app = app_dir();
        Self {
            ui_data_path: app.join("Data").join("UI"),
            service_data_path: app.join("Data").join("Service"),
            ui_executable_name: "UI".to_string(),
            service_executable_name: "AresService".to_string(),
            ui_process_name: "UI".to_string(),
            service_process_name: "AresService".to_string(),
            ui_endpoint: "http://localhost:5000".to_string(),
            service_endpoint: "https://localhost:5001".to_string(),
            git_token: None,
            ipc_listen: "127.0.0.1:57575".to_string(),
            download_dir: None,
            current_ares_repo: AresSource::default(),
            available_ares_repos: vec![AresSource::default()],
            launcher_source: LauncherSource::default(),
            database: DatabaseConfig::default(),
            certificate: CertificateConfig::default(),
            forge: ForgeOptions::default(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

impl LauncherConfig {
    /// 기본 설정 파일 경로 (환경 변수 우선)
    pub fn default_path() -> PathBuf {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => app_dir().join("config").join("launcher.toml"),
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// `path`에서 읽기. 없으면 기본값을 기록, 깨졌으면 기본값
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let cfg = Self::default();
            if let Err(e) = cfg.save_to(path) {
                tracing::warn!("[Config] Could not write default config to {}: {}", path.display(), e);
            } else {
                tracing::info!("[Config] Created default config at {}", path.display());
            }
            return Ok(cfg);
        }

        let s = std::fs::read_to_string(path)?;
        match toml::from_str::<Self>(&s) {
            Ok(cfg) => Ok(cfg),
            Err(e) => {
                tracing::warn!("[Config] Failed to parse {}: {}. Using defaults.", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let s = toml::to_string_pretty(self)?;
        std::fs::write(path, s)?;
        Ok(())
    }

    /// 컴포넌트 설치 디렉터리 (Both는 UI 디렉터리 = 번들 공용 루트)
    pub fn data_dir(&self, component: Component) -> &Path {
        match component {
            Component::Service => &self.service_data_path,
            Component::Ui | Component::Both => &self.ui_data_path,
        }
    }

    /// 컴포넌트 실행 파일 전체 경로
    pub fn executable_path(&self, component: Component) -> PathBuf {
        match component {
            Component::Service => self
                .service_data_path
                .join(platform_executable(&self.service_executable_name)),
            Component::Ui | Component::Both => self
                .ui_data_path
                .join(platform_executable(&self.ui_executable_name)),
        }
    }

    pub fn process_name(&self, component: Component) -> &str {
        match component {
            Component::Service => &self.service_process_name,
            Component::Ui | Component::Both => &self.ui_process_name,
        }
    }

    pub fn settings_path(&self, component: Component) -> PathBuf {
        self.data_dir(component).join(SETTINGS_FILE_NAME)
    }

    /// 비어 있지 않은 토큰만
    pub fn auth_token(&self) -> Option<&str> {
        self.git_token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// 다운로드 임시 디렉터리
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ares-launcher-downloads"))
    }

    /// 모든 데이터 경로를 `root` 아래로 옮긴 설정 (테스트/포터블 설치용)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            ui_data_path: root.join("Data").join("UI"),
            service_data_path: root.join("Data").join("Service"),
            certificate: CertificateConfig {
                path: root.join("certs").join("ares.pfx"),
                ..CertificateConfig::default()
            },
            download_dir: Some(root.join("downloads")),
            ..Self::default()
        }
    }
}
