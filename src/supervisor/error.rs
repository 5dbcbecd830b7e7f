//! Supervisor 전용 에러 타입

use ares_updater::Component;

/// 프로세스 감독 중 발생할 수 있는 에러 유형
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Executable for {component} not found at '{path}'")]
    ExecutableNotFound { component: Component, path: String },

    #[error("Failed to launch {component}: {reason}")]
    SpawnFailed { component: Component, reason: String },

    #[error("We already have a {0} process running, cannot take ownership of another one")]
    AlreadyOwned(Component),

    #[error("Process {0} is not running")]
    ProcessNotRunning(u32),

    #[error("Failed to terminate process {pid}: {reason}")]
    TerminationFailed { pid: u32, reason: String },
}

impl SupervisorError {
    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound { .. } => "EXECUTABLE_NOT_FOUND",
            Self::SpawnFailed { .. } => "SPAWN_FAILED",
            Self::AlreadyOwned(_) => "ALREADY_OWNED",
            Self::ProcessNotRunning(_) => "PROCESS_NOT_RUNNING",
            Self::TerminationFailed { .. } => "TERMINATION_FAILED",
        }
    }
}
