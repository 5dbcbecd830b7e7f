//! UI / Service 프로세스 감독
//!
//! 각 컴포넌트는 직접 띄운 자식 프로세스이거나, 외부에서 띄워진 것을 입양한 프로세스다.
//! 어느 쪽이든 같은 감시 태스크가 종료를 관찰하고, 의도하지 않은 종료는
//! "전체 중지"를 정확히 한 번 일으킨다.

pub mod error;
pub mod process;

pub use error::SupervisorError;

use crate::config::LauncherConfig;
use crate::process_monitor;
use crate::utils;
use ares_updater::Component;
use serde::Serialize;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// `start()` 결과. 한쪽만 뜨는 부분 시작도 허용된다
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StartReport {
    pub ui_running: bool,
    pub service_running: bool,
    pub failures: Vec<String>,
}

/// 감시 중인 프로세스 하나
struct Supervised {
    id: u64,
    pid: Option<u32>,
    adopted: bool,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Slot {
    running: watch::Sender<bool>,
    owned: Mutex<Option<Supervised>>,
}

impl Slot {
    fn new() -> Self {
        let (running, _) = watch::channel(false);
        Self {
            running,
            owned: Mutex::new(None),
        }
    }
}

/// 종료를 기다릴 수 있는 대상
enum Tracked {
    Child(Child),
    Adopted { pid: u32, poll: Duration },
}

impl Tracked {
    fn pid(&self) -> Option<u32> {
        match self {
            Tracked::Child(child) => child.id(),
            Tracked::Adopted { pid, .. } => Some(*pid),
        }
    }

    /// 종료될 때까지 대기, 종료 사유를 돌려준다
    async fn wait(&mut self) -> String {
        match self {
            Tracked::Child(child) => match child.wait().await {
                Ok(status) => status.to_string(),
                Err(e) => format!("wait failed: {}", e),
            },
            Tracked::Adopted { pid, poll } => {
                while process_monitor::is_running_async(*pid).await {
                    tokio::time::sleep(*poll).await;
                }
                "process disappeared".to_string()
            }
        }
    }
}

pub struct ProcessSupervisor {
    config: Arc<LauncherConfig>,
    ui: Slot,
    service: Slot,
    stop_initiated: AtomicBool,
    cascades: AtomicUsize,
    next_id: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(config: Arc<LauncherConfig>) -> Arc<Self> {
        Arc::new(Self {
            config,
            ui: Slot::new(),
            service: Slot::new(),
            stop_initiated: AtomicBool::new(false),
            cascades: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        })
    }

    fn slot(&self, component: Component) -> &Slot {
        match component {
            Component::Service => &self.service,
            Component::Ui | Component::Both => &self.ui,
        }
    }

    // ─── 관찰 ───────────────────────────────────────────

    pub fn subscribe(&self, component: Component) -> watch::Receiver<bool> {
        self.slot(component).running.subscribe()
    }

    pub fn is_running(&self, component: Component) -> bool {
        *self.slot(component).running.borrow()
    }

    /// 실행 중인 컴포넌트 수 (0..=2)
    pub fn running_count(&self) -> usize {
        [Component::Ui, Component::Service]
            .into_iter()
            .filter(|c| self.is_running(*c))
            .count()
    }

    /// 지금까지 일어난 "전체 중지" 연쇄 횟수
    pub fn cascade_count(&self) -> usize {
        self.cascades.load(Ordering::SeqCst)
    }

    /// 이 감독자가 소유한 PID (직접 띄운 것 + 입양한 것)
    pub async fn owned_pids(&self) -> Vec<u32> {
        let mut pids = Vec::new();
        for slot in [&self.ui, &self.service] {
            if let Some(pid) = slot.owned.lock().await.as_ref().and_then(|s| s.pid) {
                pids.push(pid);
            }
        }
        pids
    }

    pub async fn is_adopted(&self, component: Component) -> bool {
        self.slot(component)
            .owned
            .lock()
            .await
            .as_ref()
            .map(|s| s.adopted)
            .unwrap_or(false)
    }

    // ═══════════════════════════════════════════════════════
    // 시작 / 중지
    // ═══════════════════════════════════════════════════════

    /// 실행 중이 아닌 컴포넌트를 띄운다. 둘 다 실행 중이면 아무것도 하지 않는다
    pub async fn start(self: &Arc<Self>) -> StartReport {
        if self.is_running(Component::Ui) && self.is_running(Component::Service) {
            tracing::info!("[Supervisor] Both components are already running");
            return self.report(Vec::new());
        }
        self.stop_initiated.store(false, Ordering::SeqCst);

        let mut failures = Vec::new();
        for component in [Component::Ui, Component::Service] {
            if let Err(e) = self.start_component(component).await {
                tracing::error!("[Supervisor] {}", e);
                failures.push(e.to_string());
            }
        }
        self.report(failures)
    }

    fn report(&self, failures: Vec<String>) -> StartReport {
        StartReport {
            ui_running: self.is_running(Component::Ui),
            service_running: self.is_running(Component::Service),
            failures,
        }
    }

    async fn start_component(self: &Arc<Self>, component: Component) -> Result<(), SupervisorError> {
        let slot = self.slot(component);
        let mut owned = slot.owned.lock().await;
        if owned.is_some() {
            return Ok(());
        }

        let exe = self.config.executable_path(component);
        if !exe.is_file() {
            return Err(SupervisorError::ExecutableNotFound {
                component,
                path: exe.display().to_string(),
            });
        }

        let mut cmd = Command::new(&exe);
        cmd.current_dir(self.config.data_dir(component))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        utils::apply_creation_flags(&mut cmd);

        let child = cmd.spawn().map_err(|e| SupervisorError::SpawnFailed {
            component,
            reason: e.to_string(),
        })?;
        tracing::info!("[Supervisor] Started {} (pid {:?})", component, child.id());

        self.attach(&mut owned, component, Tracked::Child(child), false);
        Ok(())
    }

    /// 두 컴포넌트 모두 취소하고 감시 태스크가 끝날 때까지 기다린다
    pub async fn stop(&self) {
        self.stop_initiated.store(true, Ordering::SeqCst);

        let mut taken = Vec::new();
        for slot in [&self.ui, &self.service] {
            if let Some(supervised) = slot.owned.lock().await.take() {
                supervised.cancel.cancel();
                taken.push(supervised);
            }
        }
        for supervised in taken {
            if let Err(e) = supervised.task.await {
                tracing::debug!("[Supervisor] Watcher task ended abnormally: {}", e);
            }
        }
        self.clear_vacant_flags().await;
        tracing::info!("[Supervisor] All components stopped");
    }

    /// 빈 슬롯의 실행 플래그만 내린다. 중지 도중 `start()`가 새로 채운 슬롯은 건드리지 않는다
    async fn clear_vacant_flags(&self) {
        for slot in [&self.ui, &self.service] {
            let owned = slot.owned.lock().await;
            if owned.is_none() {
                slot.running.send_replace(false);
            }
        }
    }

    pub async fn restart(self: &Arc<Self>) -> StartReport {
        self.stop().await;
        self.start().await
    }

    // ═══════════════════════════════════════════════════════
    // 입양
    // ═══════════════════════════════════════════════════════

    pub async fn take_ownership_ui(self: &Arc<Self>, pid: u32) -> Result<(), SupervisorError> {
        self.take_ownership(Component::Ui, pid).await
    }

    pub async fn take_ownership_service(self: &Arc<Self>, pid: u32) -> Result<(), SupervisorError> {
        self.take_ownership(Component::Service, pid).await
    }

    /// 외부에서 띄워진 프로세스를 감시 대상으로 편입. 이미 소유 중이면 실패
    pub async fn take_ownership(self: &Arc<Self>, component: Component, pid: u32) -> Result<(), SupervisorError> {
        let slot = self.slot(component);
        let mut owned = slot.owned.lock().await;
        if owned.is_some() {
            return Err(SupervisorError::AlreadyOwned(component));
        }
        if !process_monitor::is_running_async(pid).await {
            return Err(SupervisorError::ProcessNotRunning(pid));
        }

        self.stop_initiated.store(false, Ordering::SeqCst);
        let poll = Duration::from_millis(self.config.supervisor.adoption_poll_interval_ms.max(10));
        tracing::info!("[Supervisor] Took ownership of {} (pid {})", component, pid);
        self.attach(&mut owned, component, Tracked::Adopted { pid, poll }, true);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════
    // 감시
    // ═══════════════════════════════════════════════════════

    /// 슬롯 락을 쥔 상태에서 호출해야 한다
    fn attach(self: &Arc<Self>, owned: &mut Option<Supervised>, component: Component, tracked: Tracked, adopted: bool) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let pid = tracked.pid();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().watch_exit(component, id, tracked, cancel.clone()));
        *owned = Some(Supervised {
            id,
            pid,
            adopted,
            cancel,
            task,
        });
        self.slot(component).running.send_replace(true);
    }

    async fn watch_exit(self: Arc<Self>, component: Component, id: u64, mut tracked: Tracked, cancel: CancellationToken) {
        let cancelled = tokio::select! {
            reason = tracked.wait() => {
                tracing::warn!("[Supervisor] {} exited: {}", component, reason);
                false
            }
            _ = cancel.cancelled() => {
                self.shut_down(component, &mut tracked).await;
                true
            }
        };

        {
            let slot = self.slot(component);
            let mut owned = slot.owned.lock().await;
            match owned.as_ref() {
                Some(s) if s.id == id => {
                    *owned = None;
                    slot.running.send_replace(false);
                }
                None => {
                    slot.running.send_replace(false);
                }
                // 이미 다른 프로세스가 자리를 차지함
                Some(_) => {}
            }
        }

        if !cancelled {
            self.trigger_stop_once(component);
        }
    }

    /// 정상 종료 요청 → 유예 시간 → 프로세스 트리 강제 종료
    async fn shut_down(&self, component: Component, tracked: &mut Tracked) {
        let Some(pid) = tracked.pid() else {
            return;
        };
        let tree = tokio::task::spawn_blocking(move || process::descendants(pid))
            .await
            .unwrap_or_default();

        if let Err(e) = process::terminate_pid(pid) {
            tracing::debug!("[Supervisor] {}", e);
        }
        let grace = Duration::from_millis(self.config.supervisor.stop_grace_period_ms);
        if tokio::time::timeout(grace, tracked.wait()).await.is_err() {
            tracing::warn!(
                "[Supervisor] {} (pid {}) did not exit within {:?}, killing process tree",
                component,
                pid,
                grace
            );
            if let Err(e) = tokio::task::spawn_blocking(move || process::kill_process_tree(pid)).await {
                tracing::debug!("[Supervisor] Tree kill task failed: {}", e);
            }
            if let Tracked::Child(child) = tracked {
                if let Err(e) = child.wait().await {
                    tracing::debug!("[Supervisor] Failed to reap {}: {}", component, e);
                }
            }
        }

        // 부모가 먼저 끝나 고아가 된 자손 정리
        for orphan in tree {
            if process_monitor::is_running_async(orphan).await {
                if let Err(e) = process::force_kill_pid(orphan) {
                    tracing::debug!("[Supervisor] {}", e);
                }
            }
        }
        tracing::info!("[Supervisor] {} stopped", component);
    }

    /// 의도하지 않은 종료 → 전체 중지. 동시에 여러 번 불려도 한 번만 실행된다
    fn trigger_stop_once(self: &Arc<Self>, component: Component) {
        if self.stop_initiated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cascades.fetch_add(1, Ordering::SeqCst);
        tracing::warn!("[Supervisor] {} stopped unexpectedly, stopping all components", component);

        let this = self.clone();
        tokio::spawn(async move { this.stop().await });
    }
}
