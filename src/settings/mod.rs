//! 컴포넌트 `appsettings.json` 동기화
//!
//! UI와 Service는 각자 설치 디렉터리의 `appsettings.json`을 읽고 뜬다.
//! 설치가 끝날 때마다 런처 설정(DB, 인증서, 엔드포인트)을 각 파일에 밀어 넣는다.
//! 알 수 없는 키는 그대로 보존한다.

use crate::config::{DatabaseProvider, LauncherConfig};
use ares_updater::Component;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Failed to write settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid endpoint URL '{0}'")]
    InvalidEndpoint(String),
}

// ══════════════════════════════════════════════════════
// appsettings.json 모델 (PascalCase)
// ══════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppSettings {
    #[serde(default)]
    pub database_provider: DatabaseProvider,
    #[serde(default)]
    pub connection_strings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kestrel: Option<KestrelOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_settings: Option<CertificateSettings>,
    /// UI 전용: Service 호출 대상
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_service_settings: Option<RemoteServiceSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KestrelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_defaults: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<EndpointsOptions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpEndpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<HttpsEndpoint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HttpEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HttpsEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertificateSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteServiceSettings {
    pub server_host: String,
    pub server_port: u16,
}

impl Default for RemoteServiceSettings {
    fn default() -> Self {
        Self {
            server_host: "localhost".to_string(),
            server_port: 5001,
        }
    }
}

// ─── 읽기 / 쓰기 ───────────────────────────────────────

/// 설정 파일 읽기. 없거나, 비었거나, 깨졌으면 기본값
pub fn read_settings(path: &Path) -> AppSettings {
    let Ok(content) = std::fs::read_to_string(path) else {
        return AppSettings::default();
    };
    if content.trim().is_empty() {
        return AppSettings::default();
    }
    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("[Settings] {} is not valid JSON ({}), starting fresh", path.display(), e);
            AppSettings::default()
        }
    }
}

/// 읽기 → 수정 → 쓰기
pub fn update_settings<F>(path: &Path, update: F) -> Result<AppSettings, SettingsError>
where
    F: FnOnce(&mut AppSettings),
{
    let mut settings = read_settings(path);
    update(&mut settings);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(&settings)?;
    std::fs::write(path, json).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(settings)
}

// ══════════════════════════════════════════════════════
// 동기화
// ══════════════════════════════════════════════════════

pub struct SettingsSync {
    config: Arc<LauncherConfig>,
}

impl SettingsSync {
    pub fn new(config: Arc<LauncherConfig>) -> Self {
        Self { config }
    }

    /// UI, Service 모두 동기화
    pub fn sync_all(&self) -> Result<(), SettingsError> {
        self.sync(Component::Ui)?;
        self.sync(Component::Service)?;
        Ok(())
    }

    /// 컴포넌트 하나 동기화. 설치 디렉터리가 없으면 건너뛴다
    pub fn sync(&self, component: Component) -> Result<(), SettingsError> {
        if component == Component::Both {
            return self.sync_all();
        }
        let dir = self.config.data_dir(component);
        if !dir.is_dir() {
            tracing::debug!("[Settings] {} is not installed, skipping", component);
            return Ok(());
        }

        let endpoint = match component {
            Component::Service => &self.config.service_endpoint,
            _ => &self.config.ui_endpoint,
        };
        let endpoint_url =
            Url::parse(endpoint).map_err(|_| SettingsError::InvalidEndpoint(endpoint.clone()))?;
        let remote = match component {
            Component::Ui => Some(remote_service_settings(&self.config.service_endpoint)?),
            _ => None,
        };

        let path = self.config.settings_path(component);
        let config = &self.config;
        update_settings(&path, |settings| {
            settings.database_provider = config.database.provider;
            for (name, value) in &config.database.connection_strings {
                settings.connection_strings.insert(name.clone(), value.clone());
            }
            if let Some(sqlite) = &config.database.sqlite_database_path {
                settings
                    .connection_strings
                    .insert(DatabaseProvider::Sqlite.as_str().to_string(), sqlite.clone());
            }

            let certificate = CertificateSettings {
                path: Some(config.certificate.path.display().to_string()),
                password: config.certificate.password.clone(),
            };
            settings.certificate_settings = Some(certificate.clone());

            let kestrel = settings.kestrel.get_or_insert_with(KestrelOptions::default);
            let endpoints = kestrel.endpoints.get_or_insert_with(EndpointsOptions::default);
            if endpoint_url.scheme() == "https" {
                endpoints.http = None;
                endpoints.https = Some(HttpsEndpoint {
                    url: Some(endpoint.clone()),
                    certificate: Some(certificate),
                });
            } else {
                endpoints.https = None;
                endpoints.http = Some(HttpEndpoint {
                    url: Some(endpoint.clone()),
                });
            }

            if remote.is_some() {
                settings.remote_service_settings = remote;
            }
        })?;

        tracing::info!("[Settings] Synchronized {}", path.display());
        Ok(())
    }
}

/// Service 엔드포인트 URL → UI가 호출할 호스트/포트
pub fn remote_service_settings(service_endpoint: &str) -> Result<RemoteServiceSettings, SettingsError> {
    let url = Url::parse(service_endpoint)
        .map_err(|_| SettingsError::InvalidEndpoint(service_endpoint.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| SettingsError::InvalidEndpoint(service_endpoint.to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| SettingsError::InvalidEndpoint(service_endpoint.to_string()))?;
    Ok(RemoteServiceSettings {
        server_host: host.to_string(),
        server_port: port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> LauncherConfig {
        let mut cfg = LauncherConfig::rooted_at(tmp.path());
        cfg.database.provider = DatabaseProvider::Sqlite;
        cfg.database.sqlite_database_path = Some("/data/ares.db".to_string());
        cfg.certificate.password = Some("hunter2".to_string());
        cfg.ui_endpoint = "http://localhost:5000".to_string();
        cfg.service_endpoint = "https://127.0.0.1:7001".to_string();
        cfg
    }

    #[test]
    fn sync_service_writes_https_endpoint_with_certificate() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);
        std::fs::create_dir_all(&cfg.service_data_path).unwrap();
        let sync = SettingsSync::new(Arc::new(cfg.clone()));

        sync.sync(Component::Service).unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(cfg.settings_path(Component::Service)).unwrap())
                .unwrap();
        assert_eq!(raw["DatabaseProvider"], "Sqlite");
        assert_eq!(raw["ConnectionStrings"]["Sqlite"], "/data/ares.db");
        assert_eq!(raw["Kestrel"]["Endpoints"]["Https"]["Url"], "https://127.0.0.1:7001");
        assert_eq!(raw["Kestrel"]["Endpoints"]["Https"]["Certificate"]["Password"], "hunter2");
        assert!(raw["Kestrel"]["Endpoints"].get("Http").is_none());
        assert!(raw.get("RemoteServiceSettings").is_none());
    }

    #[test]
    fn sync_ui_points_at_service() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);
        std::fs::create_dir_all(&cfg.ui_data_path).unwrap();
        let sync = SettingsSync::new(Arc::new(cfg.clone()));

        sync.sync(Component::Ui).unwrap();

        let settings = read_settings(&cfg.settings_path(Component::Ui));
        let remote = settings.remote_service_settings.unwrap();
        assert_eq!(remote.server_host, "127.0.0.1");
        assert_eq!(remote.server_port, 7001);
        let endpoints = settings.kestrel.unwrap().endpoints.unwrap();
        assert_eq!(endpoints.http.unwrap().url.as_deref(), Some("http://localhost:5000"));
        assert!(endpoints.https.is_none());
    }

    #[test]
    fn preserves_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);
        std::fs::create_dir_all(&cfg.service_data_path).unwrap();
        std::fs::write(
            cfg.settings_path(Component::Service),
            r#"{
                "AllowedHosts": "*",
                "Logging": { "LogLevel": { "Default": "Information" } },
                "Tokens": { "Issuer": "ares" },
                "Kestrel": { "Limits": { "MaxRequestBodySize": 10 } },
                "ConnectionStrings": { "Postgres": "Host=db" }
            }"#,
        )
        .unwrap();

        SettingsSync::new(Arc::new(cfg.clone())).sync_all().unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(cfg.settings_path(Component::Service)).unwrap())
                .unwrap();
        assert_eq!(raw["AllowedHosts"], "*");
        assert_eq!(raw["Tokens"]["Issuer"], "ares");
        assert_eq!(raw["Logging"]["LogLevel"]["Default"], "Information");
        assert_eq!(raw["Kestrel"]["Limits"]["MaxRequestBodySize"], 10);
        assert_eq!(raw["ConnectionStrings"]["Postgres"], "Host=db");
        assert_eq!(raw["ConnectionStrings"]["Sqlite"], "/data/ares.db");
    }

    #[test]
    fn skips_missing_install_dirs() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_in(&tmp);
        SettingsSync::new(Arc::new(cfg.clone())).sync_all().unwrap();
        assert!(!cfg.ui_data_path.exists());
        assert!(!cfg.service_data_path.exists());
    }

    #[test]
    fn corrupt_settings_start_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("appsettings.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert_eq!(read_settings(&path), AppSettings::default());
    }

    #[test]
    fn remote_settings_use_scheme_default_port() {
        let remote = remote_service_settings("https://ares.local").unwrap();
        assert_eq!(remote.server_port, 443);
        assert!(remote_service_settings("not a url").is_err());
    }
}
