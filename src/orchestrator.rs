//! 업데이트 오케스트레이터
//!
//! 정리 → 다운로드 → 압축 해제 → 메타데이터 → 설정 동기화 → 인증서 → DB 확인을
//! 순서대로 실행하고, 각 단계를 watch 채널로 알린다.
//! 한 번에 하나의 업데이트만 돈다 (두 번째 호출은 `UpdateInProgress`).

use crate::certificate::CertificateManager;
use crate::config::LauncherConfig;
use crate::database::{DatabaseProbe, DatabaseStatus};
use crate::error::{LauncherError, LauncherResult};
use crate::inventory::BinaryInventory;
use crate::settings::SettingsSync;
use ares_updater::metadata::write_metadata;
use ares_updater::version::{is_greatest, latest};
use ares_updater::{archive, AresSource, Component, ProgressSink, ReleaseDownloader, SemVer, UpdaterError};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum UpdateStep {
    #[default]
    Idle,
    Downloading,
    Other,
}

/// 현재 단계 + 사람이 읽는 설명
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateActivity {
    pub step: UpdateStep,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "version", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Installed(SemVer),
    /// 같은 소스의 같은 버전이 이미 설치되어 있어 아무것도 하지 않음
    AlreadyInstalled(SemVer),
    AlreadyLatest(SemVer),
}

pub struct UpdateOrchestrator<D, C> {
    config: Arc<LauncherConfig>,
    downloader: Arc<D>,
    inventory: Arc<BinaryInventory<D>>,
    settings: SettingsSync,
    certificates: Arc<C>,
    database: Arc<DatabaseProbe>,
    activity: watch::Sender<UpdateActivity>,
    progress: watch::Sender<f64>,
    in_flight: Mutex<()>,
}

impl<D, C> UpdateOrchestrator<D, C>
where
    D: ReleaseDownloader,
    C: CertificateManager,
{
    pub fn new(
        config: Arc<LauncherConfig>,
        downloader: Arc<D>,
        inventory: Arc<BinaryInventory<D>>,
        certificates: Arc<C>,
        database: Arc<DatabaseProbe>,
    ) -> Self {
        let (activity, _) = watch::channel(UpdateActivity::default());
        let (progress, _) = watch::channel(0.0);
        Self {
            settings: SettingsSync::new(config.clone()),
            config,
            downloader,
            inventory,
            certificates,
            database,
            activity,
            progress,
            in_flight: Mutex::new(()),
        }
    }

    pub fn subscribe_activity(&self) -> watch::Receiver<UpdateActivity> {
        self.activity.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub fn activity(&self) -> UpdateActivity {
        self.activity.borrow().clone()
    }

    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    pub fn is_updating(&self) -> bool {
        self.activity.borrow().step != UpdateStep::Idle
    }

    fn publish(&self, step: UpdateStep, description: &str) {
        self.activity.send_replace(UpdateActivity {
            step,
            description: description.to_string(),
        });
    }

    fn describe(&self, description: &str) {
        self.activity.send_modify(|a| a.description = description.to_string());
    }

    fn reset(&self) {
        self.publish(UpdateStep::Idle, "");
    }

    // ═══════════════════════════════════════════════════════
    // 공개 진입점
    // ═══════════════════════════════════════════════════════

    /// `version` 설치
    pub async fn update(&self, version: &SemVer) -> LauncherResult<UpdateOutcome> {
        let _guard = self.in_flight.try_lock().map_err(|_| LauncherError::UpdateInProgress)?;
        self.run_update(version).await
    }

    /// 게시된 최신 버전 설치. 이미 최신이면 아무것도 하지 않는다
    pub async fn update_latest(&self) -> LauncherResult<UpdateOutcome> {
        let _guard = self.in_flight.try_lock().map_err(|_| LauncherError::UpdateInProgress)?;

        self.publish(UpdateStep::Other, "Checking version");
        let versions = match self.inventory.query_available().await {
            Ok(v) => v,
            Err(e) => {
                self.reset();
                return Err(e.into());
            }
        };

        // 디스크가 바뀌었을 수 있으니 판단 직전에 다시 읽는다
        self.inventory.refresh_local().await;
        if let Some(current) = self.inventory.current_version().await {
            if is_greatest(&current, &versions) {
                tracing::info!("[Updater] Already on the latest version ({})", current);
                self.publish(UpdateStep::Idle, "Already on the latest version.");
                return Ok(UpdateOutcome::AlreadyLatest(current));
            }
        }

        let Some(target) = latest(&versions).cloned() else {
            self.reset();
            return Err(LauncherError::NoVersionsFound);
        };
        self.run_update(&target).await
    }

    async fn run_update(&self, version: &SemVer) -> LauncherResult<UpdateOutcome> {
        let source = self.config.current_ares_repo.clone();

        self.inventory.refresh_local().await;
        let installed = self.inventory.snapshot().await;
        if installed.current_version.as_ref() == Some(version)
            && installed.current_source.as_ref() == Some(&source)
        {
            tracing::info!("[Updater] {} from {} is already installed", version, source);
            return Ok(UpdateOutcome::AlreadyInstalled(version.clone()));
        }

        tracing::info!("[Updater] Installing ARES {} from {}", version, source);
        match self.install(&source, version).await {
            Ok(()) => {
                self.inventory.refresh_local().await;
                self.reset();
                tracing::info!("[Updater] ARES {} installed", version);
                Ok(UpdateOutcome::Installed(version.clone()))
            }
            Err(e) => {
                tracing::error!("[Updater] Update to {} failed: {}", version, e);
                self.reset();
                Err(e)
            }
        }
    }

    // ═══════════════════════════════════════════════════════
    // 단계
    // ═══════════════════════════════════════════════════════

    async fn install(&self, source: &AresSource, version: &SemVer) -> LauncherResult<()> {
        let ui_dir = self.config.data_dir(Component::Ui).to_path_buf();
        let service_dir = self.config.data_dir(Component::Service).to_path_buf();

        self.publish(UpdateStep::Other, "Cleaning up the previous version.");
        remove_dir_if_present(&ui_dir).await?;
        remove_dir_if_present(&service_dir).await?;

        let scratch = self.config.download_dir();
        tokio::fs::create_dir_all(&scratch)
            .await
            .map_err(|e| UpdaterError::from_io(&e, "create download directory", &scratch))?;

        self.progress.send_replace(0.0);
        self.publish(UpdateStep::Downloading, "");
        if source.bundle {
            self.acquire(source, version, Component::Both, &scratch, &ui_dir, 0.0, 1.0)
                .await
                .map_err(|e| {
                    tracing::error!("[Updater] Failed to acquire the combined bundle. {}", e);
                    e
                })?;
        } else {
            self.acquire(source, version, Component::Ui, &scratch, &ui_dir, 0.0, 0.5)
                .await
                .map_err(|e| {
                    tracing::error!("[Updater] Failed to acquire the UI. {}", e);
                    e
                })?;
            self.acquire(source, version, Component::Service, &scratch, &service_dir, 0.5, 0.5)
                .await
                .map_err(|e| {
                    tracing::error!("[Updater] Failed to acquire the Service. {}", e);
                    e
                })?;
        }

        self.publish(UpdateStep::Other, "Updating settings");
        self.settings.sync_all()?;

        self.describe("Updating certificates");
        self.certificates.refresh().await;

        self.describe("Ensuring database is up to date");
        let status = self.database.refresh().await?;
        if status != DatabaseStatus::UpToDate {
            self.database.run_migrations().await?;
        }
        Ok(())
    }

    /// 컴포넌트 하나를 받아 `target_dir`에 풀고 메타데이터를 남긴다.
    /// 진행률은 `offset + fraction * scale`로 보고된다.
    #[allow(clippy::too_many_arguments)]
    async fn acquire(
        &self,
        source: &AresSource,
        version: &SemVer,
        component: Component,
        scratch: &Path,
        target_dir: &Path,
        offset: f64,
        scale: f64,
    ) -> Result<(), UpdaterError> {
        let (fetching, unpacking) = match component {
            Component::Both => ("Downloading the bundle.", "Unpacking the bundle"),
            Component::Ui => ("Downloading the UI.", "Unpacking the UI"),
            Component::Service => ("Acquiring the Service.", "Unpacking the Service."),
        };

        self.describe(fetching);
        let progress = &self.progress;
        let sink: ProgressSink<'_> = &move |fraction: f64| {
            progress.send_replace(offset + fraction * scale);
        };
        let archive_path = self
            .downloader
            .download(source, version, component, scratch, self.config.auth_token(), Some(sink))
            .await?;

        self.describe(unpacking);
        let unpacked = archive::unpack(&archive_path, target_dir).await;
        discard_download(&archive_path).await;
        unpacked?;

        write_metadata(target_dir, source, version);
        Ok(())
    }
}

async fn remove_dir_if_present(dir: &Path) -> Result<(), UpdaterError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            tracing::debug!("[Updater] Removed {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdaterError::from_io(&e, "remove previous installation", dir)),
    }
}

async fn discard_download(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!("[Updater] Could not remove downloaded archive {}: {}", path.display(), e);
    }
}
