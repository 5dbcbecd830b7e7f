use super::SupervisorError;
use std::collections::HashMap;
use sysinfo::{Pid, System};

/// 정상 종료 요청 (Unix: SIGTERM). Windows에는 정상 종료 신호가 없으므로 강제 종료와 같다.
pub fn terminate_pid(pid: u32) -> Result<(), SupervisorError> {
    #[cfg(target_os = "windows")]
    {
        force_kill_pid(pid)
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid as NixPid;

        tracing::debug!("[Supervisor] Sending TERM to pid {}", pid);
        signal::kill(NixPid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
            SupervisorError::TerminationFailed {
                pid,
                reason: format!("Failed to send signal: {}", e),
            }
        })
    }
}

/// Force-kill a process by PID. Cross-platform helper.
pub fn force_kill_pid(pid: u32) -> Result<(), SupervisorError> {
    #[cfg(target_os = "windows")]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
        use winapi::um::winnt::PROCESS_TERMINATE;

        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                return Err(SupervisorError::TerminationFailed {
                    pid,
                    reason: format!("Failed to open process {}", pid),
                });
            }
            let result = TerminateProcess(handle, 1);
            CloseHandle(handle);
            if result == 0 {
                return Err(SupervisorError::TerminationFailed {
                    pid,
                    reason: "TerminateProcess failed".to_string(),
                });
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid as NixPid;

        signal::kill(NixPid::from_raw(pid as i32), Signal::SIGKILL).map_err(|e| {
            SupervisorError::TerminationFailed {
                pid,
                reason: format!("Failed to send signal: {}", e),
            }
        })
    }
}

/// `pid`의 모든 자손 PID (가까운 자식부터)
pub fn descendants(pid: u32) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (child, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*child);
        }
    }

    let mut out = Vec::new();
    let mut frontier = vec![Pid::from_u32(pid)];
    while let Some(next) = frontier.pop() {
        if let Some(kids) = children.get(&next) {
            for kid in kids {
                let raw = kid.as_u32();
                if raw != pid && !out.contains(&raw) {
                    out.push(raw);
                    frontier.push(*kid);
                }
            }
        }
    }
    out
}

/// 자손을 먼저, 마지막에 `pid` 자신을 강제 종료. 이미 끝난 프로세스는 무시한다
pub fn kill_process_tree(pid: u32) {
    let mut victims = descendants(pid);
    victims.reverse();
    victims.push(pid);
    for victim in victims {
        if let Err(e) = force_kill_pid(victim) {
            tracing::debug!("[Supervisor] {}", e);
        }
    }
}
