//! 런처 파사드: 구성 요소를 한 번 생성해 묶고, 표시 계층에 필요한 상태 스냅샷을 만든다.

use crate::certificate::{CertificateManager, SystemCertificateManager};
use crate::config::LauncherConfig;
use crate::conflict::ConflictResolver;
use crate::database::{DatabaseProbe, DatabaseStatus};
use crate::error::{LauncherError, LauncherResult};
use crate::inventory::BinaryInventory;
use crate::orchestrator::{UpdateActivity, UpdateOrchestrator, UpdateOutcome};
use crate::state::{self, AresState, StateInputs, StatePresentation};
use crate::supervisor::{ProcessSupervisor, StartReport};
use ares_updater::version::latest;
use ares_updater::{AresSource, GitHubClient, ReleaseDownloader, SemVer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// 표시 계층용 상태 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct LauncherStatus {
    pub state: AresState,
    pub presentation: StatePresentation,
    pub condition_checked: bool,
    /// 마지막으로 상태 확인을 마친 시각
    pub checked_at: Option<DateTime<Utc>>,
    pub ui_running: bool,
    pub service_running: bool,
    pub installed: bool,
    pub current_version: Option<SemVer>,
    pub current_source: Option<AresSource>,
    pub available_versions: Vec<SemVer>,
    pub update_available: bool,
    pub update_offered: bool,
    pub database: DatabaseStatus,
    pub activity: UpdateActivity,
    /// 길이를 모르는 다운로드 중에는 `null`
    pub progress: f64,
    pub last_error: Option<String>,
}

/// 런처 자체의 버전 확인 결과 (설치는 하지 않음)
#[derive(Debug, Clone, Serialize)]
pub struct LauncherVersions {
    pub current: String,
    pub latest: Option<SemVer>,
    pub update_available: bool,
}

pub struct Launcher<D = GitHubClient, C = SystemCertificateManager> {
    config: Arc<LauncherConfig>,
    downloader: Arc<D>,
    inventory: Arc<BinaryInventory<D>>,
    orchestrator: UpdateOrchestrator<D, C>,
    supervisor: Arc<ProcessSupervisor>,
    conflicts: ConflictResolver,
    database: Arc<DatabaseProbe>,
    condition_checked: AtomicBool,
    checked_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl Launcher {
    /// 기본 구성: GitHub 포지 + 시스템 인증서 관리자
    pub fn from_config(config: Arc<LauncherConfig>) -> LauncherResult<Self> {
        let downloader = Arc::new(GitHubClient::new(config.forge.clone())?);
        let certificates = Arc::new(SystemCertificateManager::new(config.clone()));
        Ok(Self::with_parts(config, downloader, certificates))
    }
}

impl<D, C> Launcher<D, C>
where
    D: ReleaseDownloader,
    C: CertificateManager,
{
    pub fn with_parts(config: Arc<LauncherConfig>, downloader: Arc<D>, certificates: Arc<C>) -> Self {
        let inventory = Arc::new(BinaryInventory::new(config.clone(), downloader.clone()));
        let database = Arc::new(DatabaseProbe::new(config.clone()));
        let orchestrator = UpdateOrchestrator::new(
            config.clone(),
            downloader.clone(),
            inventory.clone(),
            certificates,
            database.clone(),
        );
        let supervisor = ProcessSupervisor::new(config.clone());
        let conflicts = ConflictResolver::new(config.clone(), supervisor.clone());

        Self {
            config,
            downloader,
            inventory,
            orchestrator,
            supervisor,
            conflicts,
            database,
            condition_checked: AtomicBool::new(false),
            checked_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn inventory(&self) -> &BinaryInventory<D> {
        &self.inventory
    }

    pub fn orchestrator(&self) -> &UpdateOrchestrator<D, C> {
        &self.orchestrator
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn conflicts(&self) -> &ConflictResolver {
        &self.conflicts
    }

    pub fn database(&self) -> &DatabaseProbe {
        &self.database
    }

    async fn record<T>(&self, result: LauncherResult<T>) -> LauncherResult<T> {
        if let Err(ref e) = result {
            *self.last_error.lock().await = Some(e.to_string());
        }
        result
    }

    // ═══════════════════════════════════════════════════════
    // 상태 확인
    // ═══════════════════════════════════════════════════════

    /// 인벤토리 갱신 → 설치되어 있으면 DB 상태 확인
    pub async fn check_condition(&self) -> LauncherResult<LauncherStatus> {
        self.condition_checked.store(false, Ordering::SeqCst);

        let snapshot = self.inventory.refresh().await;
        if snapshot.is_installed() {
            let probed = self.database.refresh().await.map_err(LauncherError::from);
            self.record(probed).await?;
        }

        *self.checked_at.lock().await = Some(Utc::now());
        self.condition_checked.store(true, Ordering::SeqCst);
        Ok(self.status().await)
    }

    pub async fn status(&self) -> LauncherStatus {
        let snapshot = self.inventory.snapshot().await;
        let activity = self.orchestrator.activity();
        let running = self.supervisor.running_count();
        let database = self.database.status();

        let state = state::derive_state(StateInputs {
            running,
            installed: snapshot.is_installed(),
            database,
            update_step: activity.step,
        });
        let update_available = snapshot.update_available();

        LauncherStatus {
            state,
            presentation: state::present(state),
            condition_checked: self.condition_checked.load(Ordering::SeqCst),
            checked_at: *self.checked_at.lock().await,
            ui_running: self.supervisor.is_running(ares_updater::Component::Ui),
            service_running: self.supervisor.is_running(ares_updater::Component::Service),
            installed: snapshot.is_installed(),
            current_version: snapshot.current_version,
            current_source: snapshot.current_source,
            available_versions: snapshot.available_versions,
            update_available,
            update_offered: state::update_offered(update_available, running, activity.step),
            database,
            progress: self.orchestrator.progress(),
            activity,
            last_error: self.last_error.lock().await.clone(),
        }
    }

    // ═══════════════════════════════════════════════════════
    // 동작
    // ═══════════════════════════════════════════════════════

    /// 특정 버전 또는 최신 버전으로 업데이트. 성공/실패와 무관하게 끝나면 상태를 다시 확인한다
    pub async fn update(&self, version: Option<SemVer>) -> LauncherResult<UpdateOutcome> {
        *self.last_error.lock().await = None;
        let result = match version {
            Some(v) => self.orchestrator.update(&v).await,
            None => self.orchestrator.update_latest().await,
        };
        let result = self.record(result).await;

        if let Err(e) = self.check_condition().await {
            tracing::warn!("[Launcher] Condition check after update failed: {}", e);
        }
        result
    }

    pub async fn migrate_database(&self) -> LauncherResult<DatabaseStatus> {
        *self.last_error.lock().await = None;
        let result = self.database.run_migrations().await.map_err(LauncherError::from);
        let result = self.record(result).await;

        if let Err(e) = self.check_condition().await {
            tracing::warn!("[Launcher] Condition check after migration failed: {}", e);
        }
        result
    }

    pub async fn start(&self) -> StartReport {
        self.supervisor.start().await
    }

    pub async fn stop(&self) {
        self.supervisor.stop().await
    }

    pub async fn restart(&self) -> StartReport {
        self.supervisor.restart().await
    }

    /// 런처 자신의 저장소에서 더 새로운 버전이 있는지
    pub async fn launcher_versions(&self) -> LauncherResult<LauncherVersions> {
        let source = AresSource::from(&self.config.launcher_source);
        let versions = self
            .downloader
            .available_versions(&source, self.config.auth_token())
            .await?;
        let newest = latest(&versions).cloned();

        let current = env!("CARGO_PKG_VERSION");
        let update_available = match (SemVer::parse(current), &newest) {
            (Some(cur), Some(new)) => new.is_newer_than(&cur),
            _ => false,
        };
        Ok(LauncherVersions {
            current: current.to_string(),
            latest: newest,
            update_available,
        })
    }
}
