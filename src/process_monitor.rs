use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessStatus, System};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningProcess {
    pub pid: u32,
    pub name: String,
    pub executable_path: Option<String>,
}

/// 비교용 이름: 소문자, Windows `.exe` 제거
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// 크로스 플랫폼: 실행 중인 모든 프로세스 목록 가져오기 (좀비 제외)
pub fn get_running_processes() -> Vec<RunningProcess> {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut processes: Vec<RunningProcess> = sys
        .processes()
        .iter()
        .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
        .map(|(pid, process)| RunningProcess {
            pid: pid.as_u32(),
            name: process.name().to_string(),
            executable_path: process.exe().and_then(|p| p.to_str()).map(String::from),
        })
        .collect();
    // "첫 번째 일치"가 실행마다 달라지지 않도록
    processes.sort_by_key(|p| p.pid);

    tracing::debug!("Found {} running processes", processes.len());
    processes
}

/// 프로세스 이름이 정확히 같은 것만 (대소문자, `.exe` 무시)
pub fn find_by_name(name: &str) -> Vec<RunningProcess> {
    let wanted = normalize_process_name(name);
    if wanted.is_empty() {
        return Vec::new();
    }
    get_running_processes()
        .into_iter()
        .filter(|p| normalize_process_name(&p.name) == wanted)
        .collect()
}

/// 특정 PID가 실행 중인지 확인 (크로스 플랫폼). 좀비는 종료된 것으로 본다
pub fn is_running(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid))
        .map(|p| p.status() != ProcessStatus::Zombie)
        .unwrap_or(false)
}

// ── Async wrappers ─────────────────────────────────────────
// sysinfo는 OS 프로세스 테이블 전체를 동기적으로 스캔하므로 블로킹 스레드풀에서 돌린다.

pub async fn is_running_async(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || is_running(pid))
        .await
        .unwrap_or(false)
}

pub async fn find_by_name_async(name: &str) -> Vec<RunningProcess> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || find_by_name(&name))
        .await
        .unwrap_or_default()
}
