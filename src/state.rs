//! 런처 전체 상태 (파생값)
//!
//! 실행 중인 컴포넌트 수, 설치 여부, DB 상태, 업데이트 단계로부터 계산된다.
//! 우선순위: Updating > OneRunning/BothRunning > NeedsInstall > NeedsDbUpdate > Ready

use crate::database::DatabaseStatus;
use crate::orchestrator::UpdateStep;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AresState {
    #[default]
    Unknown,
    OneRunning,
    BothRunning,
    Ready,
    NeedsDbUpdate,
    NeedsInstall,
    Updating,
}

/// 상태 계산 입력
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateInputs {
    pub running: usize,
    pub installed: bool,
    pub database: DatabaseStatus,
    pub update_step: UpdateStep,
}

pub fn derive_state(inputs: StateInputs) -> AresState {
    if inputs.update_step != UpdateStep::Idle {
        return AresState::Updating;
    }
    match inputs.running {
        0 => {}
        1 => return AresState::OneRunning,
        _ => return AresState::BothRunning,
    }
    if !inputs.installed {
        return AresState::NeedsInstall;
    }
    if inputs.database != DatabaseStatus::UpToDate {
        return AresState::NeedsDbUpdate;
    }
    AresState::Ready
}

/// 표시 계층이 버튼에 붙일 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LauncherAction {
    None,
    Start,
    Stop,
    Install,
    MigrateDatabase,
    OpenBrowser,
}

/// 상태 → 주 버튼 문구/동작 + 보조 동작
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatePresentation {
    pub label: &'static str,
    pub description: &'static str,
    pub action: LauncherAction,
    pub enabled: bool,
    pub secondary: Option<LauncherAction>,
}

pub fn present(state: AresState) -> StatePresentation {
    let (label, action, enabled, secondary) = match state {
        AresState::Unknown => (":)", LauncherAction::None, false, None),
        AresState::Ready => ("Start", LauncherAction::Start, true, None),
        AresState::OneRunning => ("Start", LauncherAction::Start, true, Some(LauncherAction::Stop)),
        AresState::BothRunning => ("Stop", LauncherAction::Stop, true, Some(LauncherAction::OpenBrowser)),
        AresState::NeedsInstall => ("Install", LauncherAction::Install, true, None),
        AresState::NeedsDbUpdate => ("Update DB", LauncherAction::MigrateDatabase, true, None),
        AresState::Updating => ("Updating...", LauncherAction::None, false, None),
    };
    StatePresentation {
        label,
        description: describe(state),
        action,
        enabled,
        secondary,
    }
}

fn describe(state: AresState) -> &'static str {
    match state {
        AresState::Unknown => "Launcher in a weird state, not sure why",
        AresState::OneRunning => {
            "One component is currently running. You can either stop the current one, or start the other"
        }
        AresState::BothRunning => "ARES is running",
        AresState::Ready => "ARES is ready",
        AresState::NeedsDbUpdate => "Database out of date",
        AresState::NeedsInstall => "Ready to install",
        AresState::Updating => "Update in progress",
    }
}

/// 업데이트 버튼 노출 조건: 새 버전이 있고, 아무것도 실행 중이 아니며, 업데이트 중이 아닐 때
pub fn update_offered(update_available: bool, running: usize, step: UpdateStep) -> bool {
    update_available && running == 0 && step == UpdateStep::Idle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(running: usize, installed: bool, database: DatabaseStatus, step: UpdateStep) -> StateInputs {
        StateInputs {
            running,
            installed,
            database,
            update_step: step,
        }
    }

    #[test]
    fn precedence() {
        use DatabaseStatus::*;
        use UpdateStep::*;

        assert_eq!(derive_state(inputs(2, true, UpToDate, Downloading)), AresState::Updating);
        assert_eq!(derive_state(inputs(0, false, NonExistent, Other)), AresState::Updating);
        assert_eq!(derive_state(inputs(1, false, NonExistent, Idle)), AresState::OneRunning);
        assert_eq!(derive_state(inputs(2, true, Outdated, Idle)), AresState::BothRunning);
        assert_eq!(derive_state(inputs(0, false, Outdated, Idle)), AresState::NeedsInstall);
        assert_eq!(derive_state(inputs(0, true, Outdated, Idle)), AresState::NeedsDbUpdate);
        assert_eq!(derive_state(inputs(0, true, NonExistent, Idle)), AresState::NeedsDbUpdate);
        assert_eq!(derive_state(inputs(0, true, UpToDate, Idle)), AresState::Ready);
    }

    #[test]
    fn every_state_has_a_presentation() {
        let all = [
            AresState::Unknown,
            AresState::OneRunning,
            AresState::BothRunning,
            AresState::Ready,
            AresState::NeedsDbUpdate,
            AresState::NeedsInstall,
            AresState::Updating,
        ];
        for state in all {
            let p = present(state);
            assert!(!p.label.is_empty());
            assert_eq!(p.enabled, !matches!(state, AresState::Unknown | AresState::Updating));
        }
        assert_eq!(present(AresState::BothRunning).secondary, Some(LauncherAction::OpenBrowser));
        assert_eq!(present(AresState::NeedsDbUpdate).label, "Update DB");
        assert_eq!(present(AresState::Ready).description, "ARES is ready");
    }

    #[test]
    fn update_only_offered_when_idle_and_stopped() {
        assert!(update_offered(true, 0, UpdateStep::Idle));
        assert!(!update_offered(true, 1, UpdateStep::Idle));
        assert!(!update_offered(true, 0, UpdateStep::Downloading));
        assert!(!update_offered(false, 0, UpdateStep::Idle));
    }
}
