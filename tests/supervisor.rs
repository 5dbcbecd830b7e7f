//! ═══════════════════════════════════════════════════════════════════
//! 프로세스 감독 통합 테스트 (Unix)
//! ═══════════════════════════════════════════════════════════════════
//!
//! 셸 스크립트를 가짜 UI / Service 실행 파일로 써서
//! 시작, 중지, 연쇄 중지, 입양을 검증합니다.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use ares_launcher::config::LauncherConfig;
use ares_launcher::process_monitor;
use ares_launcher::supervisor::{ProcessSupervisor, SupervisorError};
use ares_updater::Component;

// ═══════════════════════════════════════════════════════
// 테스트 유틸리티
// ═══════════════════════════════════════════════════════

fn config(root: &Path) -> LauncherConfig {
    let mut cfg = LauncherConfig::rooted_at(root);
    cfg.supervisor.stop_grace_period_ms = 500;
    cfg.supervisor.adoption_poll_interval_ms = 50;
    cfg
}

fn install_script(cfg: &LauncherConfig, component: Component, body: &str) {
    let exe = cfg.executable_path(component);
    std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
    std::fs::write(&exe, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
}

async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

async fn wait_gone(pid: u32) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if !process_monitor::is_running_async(pid).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ═══════════════════════════════════════════════════════
// 시작 / 중지
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn start_then_stop_both_components() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    install_script(&cfg, Component::Ui, "exec sleep 30");
    install_script(&cfg, Component::Service, "exec sleep 30");
    let supervisor = ProcessSupervisor::new(Arc::new(cfg));

    let report = supervisor.start().await;
    assert!(report.ui_running && report.service_running, "{:?}", report);
    assert!(report.failures.is_empty());
    assert_eq!(supervisor.running_count(), 2);

    let pids = supervisor.owned_pids().await;
    assert_eq!(pids.len(), 2);

    // 둘 다 실행 중이면 아무것도 하지 않는다
    supervisor.start().await;
    assert_eq!(supervisor.owned_pids().await, pids);

    supervisor.stop().await;
    assert_eq!(supervisor.running_count(), 0);
    assert!(supervisor.owned_pids().await.is_empty());
    for pid in pids {
        assert!(wait_gone(pid).await, "pid {} survived stop", pid);
    }
    assert_eq!(supervisor.cascade_count(), 0);
}

#[tokio::test]
async fn partial_start_reports_missing_component() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    install_script(&cfg, Component::Ui, "exec sleep 30");
    let supervisor = ProcessSupervisor::new(Arc::new(cfg));

    let report = supervisor.start().await;
    assert!(report.ui_running);
    assert!(!report.service_running);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(supervisor.running_count(), 1);

    supervisor.stop().await;
    assert_eq!(supervisor.running_count(), 0);
}

#[tokio::test]
async fn stubborn_process_is_killed_after_grace_period() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    // SIGTERM 무시
    install_script(&cfg, Component::Ui, "trap '' TERM\nexec sleep 30");
    install_script(&cfg, Component::Service, "exec sleep 30");
    let supervisor = ProcessSupervisor::new(Arc::new(cfg));

    supervisor.start().await;
    let pids = supervisor.owned_pids().await;

    let stopped = tokio::time::timeout(Duration::from_secs(10), supervisor.stop()).await;
    assert!(stopped.is_ok(), "stop hung on a process ignoring SIGTERM");
    for pid in pids {
        assert!(wait_gone(pid).await);
    }
}

// ═══════════════════════════════════════════════════════
// 연쇄 중지
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn unexpected_exit_stops_everything_once() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    install_script(&cfg, Component::Ui, "exec sleep 30");
    install_script(&cfg, Component::Service, "sleep 0.3\nexit 3");
    let supervisor = ProcessSupervisor::new(Arc::new(cfg));

    supervisor.start().await;
    let ui_pid = supervisor.owned_pids().await[0];

    assert!(wait_until(Duration::from_secs(10), || supervisor.running_count() == 0).await);
    assert!(wait_gone(ui_pid).await);
    assert_eq!(supervisor.cascade_count(), 1);
}

#[tokio::test]
async fn simultaneous_exits_cascade_once() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path());
    install_script(&cfg, Component::Ui, "sleep 0.3\nexit 1");
    install_script(&cfg, Component::Service, "sleep 0.3\nexit 1");
    let supervisor = ProcessSupervisor::new(Arc::new(cfg));

    supervisor.start().await;
    assert!(wait_until(Duration::from_secs(10), || supervisor.running_count() == 0).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(supervisor.cascade_count(), 1);

    // 다시 시작하면 다음 연쇄를 위해 가드가 풀린다
    supervisor.start().await;
    assert!(wait_until(Duration::from_secs(10), || supervisor.running_count() == 0).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(supervisor.cascade_count(), 2);
}

// ═══════════════════════════════════════════════════════
// 입양
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn adopted_process_is_watched_and_stopped() {
    let dir = TempDir::new().unwrap();
    let supervisor = ProcessSupervisor::new(Arc::new(config(dir.path())));

    let mut external = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    let pid = external.id();

    supervisor.take_ownership_ui(pid).await.unwrap();
    assert!(supervisor.is_running(Component::Ui));
    assert!(supervisor.is_adopted(Component::Ui).await);
    assert_eq!(supervisor.owned_pids().await, vec![pid]);

    let again = supervisor.take_ownership_ui(pid).await.unwrap_err();
    assert!(matches!(again, SupervisorError::AlreadyOwned(Component::Ui)));

    supervisor.stop().await;
    assert!(!supervisor.is_running(Component::Ui));
    let status = external.wait().unwrap();
    assert!(!status.success());
}

#[tokio::test]
async fn adopted_exit_triggers_cascade() {
    let dir = TempDir::new().unwrap();
    let supervisor = ProcessSupervisor::new(Arc::new(config(dir.path())));

    let mut external = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    supervisor.take_ownership_service(external.id()).await.unwrap();
    assert!(supervisor.is_running(Component::Service));

    external.kill().unwrap();
    external.wait().unwrap();

    assert!(wait_until(Duration::from_secs(5), || !supervisor.is_running(Component::Service)).await);
    assert!(wait_until(Duration::from_secs(5), || supervisor.cascade_count() == 1).await);
}

#[tokio::test]
async fn cannot_adopt_dead_process() {
    let dir = TempDir::new().unwrap();
    let supervisor = ProcessSupervisor::new(Arc::new(config(dir.path())));

    let mut finished = std::process::Command::new("true").spawn().unwrap();
    let pid = finished.id();
    finished.wait().unwrap();

    let err = supervisor.take_ownership_service(pid).await.unwrap_err();
    assert!(matches!(err, SupervisorError::ProcessNotRunning(p) if p == pid));
    assert!(!supervisor.is_running(Component::Service));
}
