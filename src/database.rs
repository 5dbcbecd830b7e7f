//! 데이터베이스 상태 확인 / 마이그레이션
//!
//! Service 실행 파일을 확인 모드(`--check-database`)로 실행해 종료 코드만 본다.
//! 0 → 최신, 10 → 구버전, 11 → 없음. 그 밖의 코드는 빌드/패키징 버그이므로 치명적 에러.

use crate::config::LauncherConfig;
use crate::utils;
use ares_updater::Component;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DatabaseStatus {
    UpToDate,
    Outdated,
    #[default]
    NonExistent,
}

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to run the Service executable: {0}")]
    Launch(#[from] std::io::Error),

    #[error("Invalid exit code: {0}. Can't map that to a database status. Something might be broken")]
    UnexpectedExitCode(i32),

    #[error("The Service process was terminated before reporting a database status")]
    Terminated,

    #[error("Database migration failed (exit code {code:?}): {stderr}")]
    MigrationFailed { code: Option<i32>, stderr: String },
}

impl DatabaseError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Launch(_) => "DATABASE_PROBE_LAUNCH_FAILED",
            Self::UnexpectedExitCode(_) => "UNEXPECTED_EXIT_CODE",
            Self::Terminated => "DATABASE_PROBE_TERMINATED",
            Self::MigrationFailed { .. } => "MIGRATION_FAILED",
        }
    }
}

/// 확인 모드 종료 코드 → 상태
pub fn status_from_exit_code(code: i32) -> Result<DatabaseStatus, DatabaseError> {
    match code {
        0 => Ok(DatabaseStatus::UpToDate),
        10 => Ok(DatabaseStatus::Outdated),
        11 => Ok(DatabaseStatus::NonExistent),
        other => Err(DatabaseError::UnexpectedExitCode(other)),
    }
}

pub struct DatabaseProbe {
    config: Arc<LauncherConfig>,
    status: watch::Sender<DatabaseStatus>,
}

impl DatabaseProbe {
    pub fn new(config: Arc<LauncherConfig>) -> Self {
        let (status, _) = watch::channel(DatabaseStatus::default());
        Self { config, status }
    }

    pub fn status(&self) -> DatabaseStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DatabaseStatus> {
        self.status.subscribe()
    }

    /// 확인 모드로 실행해 상태 갱신. Service가 설치되어 있지 않으면 상태를 유지한다
    pub async fn refresh(&self) -> Result<DatabaseStatus, DatabaseError> {
        let exe = self.config.executable_path(Component::Service);
        if !exe.is_file() {
            tracing::warn!("[Database] Service executable not found at {}, skipping check", exe.display());
            return Ok(self.status());
        }

        let flag = &self.config.database.check_flag;
        let output = utils::run_tool(&exe, &[OsStr::new(flag)], utils::working_dir_of(&exe)).await?;
        let code = output.status.code().ok_or(DatabaseError::Terminated)?;
        let status = status_from_exit_code(code).map_err(|e| {
            tracing::error!("[Database] {}", e);
            e
        })?;

        tracing::info!("[Database] Status: {:?}", status);
        self.status.send_replace(status);
        Ok(status)
    }

    /// 마이그레이션 모드로 실행한 뒤 바로 상태를 다시 확인한다
    pub async fn run_migrations(&self) -> Result<DatabaseStatus, DatabaseError> {
        let exe = self.config.executable_path(Component::Service);
        if !exe.is_file() {
            tracing::warn!("[Database] Service executable not found at {}, skipping migration", exe.display());
            return Ok(self.status());
        }

        tracing::info!("[Database] Running migrations");
        let flag = &self.config.database.migrate_flag;
        let output = utils::run_tool(&exe, &[OsStr::new(flag)], utils::working_dir_of(&exe)).await?;
        if !output.success() {
            return Err(DatabaseError::MigrationFailed {
                code: output.status.code(),
                stderr: output.stderr,
            });
        }

        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_table() {
        assert_eq!(status_from_exit_code(0).unwrap(), DatabaseStatus::UpToDate);
        assert_eq!(status_from_exit_code(10).unwrap(), DatabaseStatus::Outdated);
        assert_eq!(status_from_exit_code(11).unwrap(), DatabaseStatus::NonExistent);
        for code in [1, 7, 12, -1, 255] {
            assert!(matches!(
                status_from_exit_code(code),
                Err(DatabaseError::UnexpectedExitCode(c)) if c == code
            ));
        }
    }

    #[test]
    fn initial_status_is_nonexistent() {
        let probe = DatabaseProbe::new(Arc::new(LauncherConfig::default()));
        assert_eq!(probe.status(), DatabaseStatus::NonExistent);
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// 플래그별 종료 코드를 흉내내는 Service 스크립트
        fn fake_service(tmp: &TempDir, script: &str) -> Arc<LauncherConfig> {
            let cfg = LauncherConfig::rooted_at(tmp.path());
            std::fs::create_dir_all(&cfg.service_data_path).unwrap();
            let exe = cfg.executable_path(Component::Service);
            std::fs::write(&exe, format!("#!/bin/sh\n{}\n", script)).unwrap();
            std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
            Arc::new(cfg)
        }

        #[tokio::test]
        async fn maps_check_exit_code() {
            let tmp = TempDir::new().unwrap();
            let probe = DatabaseProbe::new(fake_service(&tmp, "exit 10"));
            let mut rx = probe.subscribe();
            assert_eq!(probe.refresh().await.unwrap(), DatabaseStatus::Outdated);
            assert!(rx.has_changed().unwrap());
            assert_eq!(*rx.borrow_and_update(), DatabaseStatus::Outdated);
        }

        #[tokio::test]
        async fn unexpected_code_is_fatal() {
            let tmp = TempDir::new().unwrap();
            let probe = DatabaseProbe::new(fake_service(&tmp, "exit 7"));
            let err = probe.refresh().await.unwrap_err();
            assert!(matches!(err, DatabaseError::UnexpectedExitCode(7)));
        }

        #[tokio::test]
        async fn migrate_then_recheck() {
            let tmp = TempDir::new().unwrap();
            // --migrate 가 marker를 만들고, 이후 확인은 marker가 있으면 0
            let probe = DatabaseProbe::new(fake_service(
                &tmp,
                r#"if [ "$1" = "--migrate" ]; then touch migrated; exit 0; fi
if [ -f migrated ]; then exit 0; else exit 10; fi"#,
            ));
            assert_eq!(probe.refresh().await.unwrap(), DatabaseStatus::Outdated);
            assert_eq!(probe.run_migrations().await.unwrap(), DatabaseStatus::UpToDate);
            assert_eq!(probe.status(), DatabaseStatus::UpToDate);
        }

        #[tokio::test]
        async fn failed_migration_surfaces_error() {
            let tmp = TempDir::new().unwrap();
            let probe = DatabaseProbe::new(fake_service(
                &tmp,
                r#"if [ "$1" = "--migrate" ]; then echo "schema locked" >&2; exit 1; fi
exit 10"#,
            ));
            let err = probe.run_migrations().await.unwrap_err();
            match err {
                DatabaseError::MigrationFailed { code, stderr } => {
                    assert_eq!(code, Some(1));
                    assert_eq!(stderr, "schema locked");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn missing_service_keeps_status() {
            let tmp = TempDir::new().unwrap();
            let probe = DatabaseProbe::new(Arc::new(LauncherConfig::rooted_at(tmp.path())));
            assert_eq!(probe.refresh().await.unwrap(), DatabaseStatus::NonExistent);
            assert_eq!(probe.run_migrations().await.unwrap(), DatabaseStatus::NonExistent);
        }
    }
}
