//! 외부에서 실행 중인 UI / Service 감지 및 정리
//!
//! 시작 전에 이 감독자가 띄우지 않은 같은 이름의 프로세스를 찾는다.
//! 해결 방법은 호출자가 고른다: 죽이거나(`kill`) 입양하거나(`take_over_*`).

use crate::config::LauncherConfig;
use crate::process_monitor::{self, RunningProcess};
use crate::supervisor::{process, ProcessSupervisor, SupervisorError};
use ares_updater::Component;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// 충돌 감지 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConflictReport {
    pub ui: Option<RunningProcess>,
    pub service: Option<RunningProcess>,
}

impl ConflictReport {
    pub fn has_conflict(&self) -> bool {
        self.ui.is_some() || self.service.is_some()
    }
}

pub struct ConflictResolver {
    config: Arc<LauncherConfig>,
    supervisor: Arc<ProcessSupervisor>,
}

impl ConflictResolver {
    pub fn new(config: Arc<LauncherConfig>, supervisor: Arc<ProcessSupervisor>) -> Self {
        Self { config, supervisor }
    }

    /// 설정된 이름과 일치하고 우리가 소유하지 않은 첫 번째 프로세스
    async fn foreign_process(&self, component: Component) -> Option<RunningProcess> {
        let name = self.config.process_name(component);
        let owned = self.supervisor.owned_pids().await;
        let own_pid = std::process::id();
        process_monitor::find_by_name_async(name)
            .await
            .into_iter()
            .find(|p| p.pid != own_pid && !owned.contains(&p.pid))
    }

    pub async fn find_potential_ui(&self) -> bool {
        self.foreign_process(Component::Ui).await.is_some()
    }

    pub async fn find_potential_service(&self) -> bool {
        self.foreign_process(Component::Service).await.is_some()
    }

    pub async fn detect(&self) -> ConflictReport {
        ConflictReport {
            ui: self.foreign_process(Component::Ui).await,
            service: self.foreign_process(Component::Service).await,
        }
    }

    /// 외부 UI → Service 순서로 강제 종료하고 사라질 때까지 기다린다. 없는 쪽은 건너뛴다
    pub async fn kill(&self) -> Result<(), SupervisorError> {
        for component in [Component::Ui, Component::Service] {
            let Some(found) = self.foreign_process(component).await else {
                continue;
            };
            tracing::info!("[Conflict] Killing foreign {} (pid {})", component, found.pid);
            match process::force_kill_pid(found.pid) {
                Ok(()) => {}
                // 그 사이에 스스로 끝났을 수 있다
                Err(_) if !process_monitor::is_running_async(found.pid).await => continue,
                Err(e) => return Err(e),
            }
            self.wait_for_exit(found.pid).await?;
        }
        Ok(())
    }

    async fn wait_for_exit(&self, pid: u32) -> Result<(), SupervisorError> {
        let grace = Duration::from_millis(self.config.supervisor.stop_grace_period_ms);
        let poll = Duration::from_millis(50);
        let waited = tokio::time::timeout(grace, async {
            while process_monitor::is_running_async(pid).await {
                tokio::time::sleep(poll).await;
            }
        })
        .await;
        waited.map_err(|_| SupervisorError::TerminationFailed {
            pid,
            reason: format!("still running after {:?}", grace),
        })
    }

    /// 외부 UI가 있으면 감독자에 넘긴다. 없으면 아무것도 하지 않고 `false`
    pub async fn take_over_ui(&self) -> Result<bool, SupervisorError> {
        self.take_over(Component::Ui).await
    }

    pub async fn take_over_service(&self) -> Result<bool, SupervisorError> {
        self.take_over(Component::Service).await
    }

    async fn take_over(&self, component: Component) -> Result<bool, SupervisorError> {
        let Some(found) = self.foreign_process(component).await else {
            return Ok(false);
        };
        self.supervisor.take_ownership(component, found.pid).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_flags_conflict() {
        let mut report = ConflictReport::default();
        assert!(!report.has_conflict());
        report.service = Some(RunningProcess {
            pid: 42,
            name: "AresService".into(),
            executable_path: None,
        });
        assert!(report.has_conflict());
    }

    #[tokio::test]
    async fn nothing_found_for_unknown_names() {
        let mut config = LauncherConfig::default();
        config.ui_process_name = "ares-ui-that-does-not-exist".into();
        config.service_process_name = "ares-service-that-does-not-exist".into();
        let config = Arc::new(config);
        let resolver = ConflictResolver::new(config.clone(), ProcessSupervisor::new(config));

        assert!(!resolver.find_potential_ui().await);
        assert!(!resolver.find_potential_service().await);
        assert!(!resolver.take_over_ui().await.unwrap());
        resolver.kill().await.unwrap();
    }

    /// 실제 외부 프로세스 상대로 감지, 종료, 입양까지
    #[cfg(unix)]
    mod foreign_process {
        use super::*;
        use std::path::{Path, PathBuf};
        use std::process::{Child, Command};
        use tempfile::TempDir;

        /// 다른 테스트의 `sleep`과 섞이지 않도록 고유한 이름으로 복사한 sleep 바이너리
        fn private_sleep(dir: &Path, tag: &str) -> PathBuf {
            let source = ["/bin/sleep", "/usr/bin/sleep"]
                .into_iter()
                .map(Path::new)
                .find(|p| p.is_file())
                .expect("sleep binary");
            // comm 은 15자로 잘린다
            let exe = dir.join(format!("arescf{}{}", tag, std::process::id() % 100_000));
            std::fs::copy(source, &exe).unwrap();
            exe
        }

        fn spawn(exe: &Path) -> Child {
            // 방금 쓴 실행 파일은 잠깐 ETXTBSY 가 날 수 있다
            for _ in 0..20 {
                match Command::new(exe).arg("30").spawn() {
                    Ok(child) => return child,
                    Err(e) if e.raw_os_error() == Some(26) => std::thread::sleep(Duration::from_millis(50)),
                    Err(e) => panic!("spawn {}: {}", exe.display(), e),
                }
            }
            panic!("{} stayed busy", exe.display());
        }

        fn resolver(dir: &TempDir, ui_name: &str) -> (ConflictResolver, Arc<ProcessSupervisor>) {
            let mut config = LauncherConfig::rooted_at(dir.path());
            config.ui_process_name = ui_name.to_string();
            config.service_process_name = "ares-service-none".into();
            config.supervisor.stop_grace_period_ms = 2000;
            config.supervisor.adoption_poll_interval_ms = 50;
            let config = Arc::new(config);
            let supervisor = ProcessSupervisor::new(config.clone());
            (ConflictResolver::new(config, supervisor.clone()), supervisor)
        }

        fn name_of(exe: &Path) -> String {
            exe.file_name().unwrap().to_string_lossy().into_owned()
        }

        #[tokio::test]
        async fn kill_removes_foreign_ui() {
            let dir = TempDir::new().unwrap();
            let exe = private_sleep(dir.path(), "k");
            let (resolver, _supervisor) = resolver(&dir, &name_of(&exe));

            let mut child = spawn(&exe);
            assert!(resolver.find_potential_ui().await);
            assert!(!resolver.find_potential_service().await);
            let report = resolver.detect().await;
            assert_eq!(report.ui.as_ref().map(|p| p.pid), Some(child.id()));
            assert!(report.service.is_none());

            resolver.kill().await.unwrap();
            let status = child.wait().unwrap();
            assert!(!status.success());
            assert!(!resolver.find_potential_ui().await);
        }

        #[tokio::test]
        async fn take_over_hands_foreign_ui_to_supervisor() {
            let dir = TempDir::new().unwrap();
            let exe = private_sleep(dir.path(), "t");
            let (resolver, supervisor) = resolver(&dir, &name_of(&exe));

            let mut child = spawn(&exe);
            assert!(resolver.take_over_ui().await.unwrap());
            assert!(supervisor.is_running(Component::Ui));
            assert!(supervisor.is_adopted(Component::Ui).await);
            assert_eq!(supervisor.owned_pids().await, vec![child.id()]);

            // 이제 우리 것이므로 더 이상 충돌이 아니다
            assert!(!resolver.find_potential_ui().await);
            assert!(!resolver.take_over_ui().await.unwrap());

            supervisor.stop().await;
            assert!(!supervisor.is_running(Component::Ui));
            assert!(!child.wait().unwrap().success());
        }
    }
}
