//! Shared helpers for launching short-lived external tools.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Apply platform-specific flags to hide the console window on Windows.
/// On non-Windows platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

/// Output of a finished tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Run `program args...` to completion with stdout discarded and stderr captured.
pub async fn run_tool(
    program: impl AsRef<std::ffi::OsStr>,
    args: &[&std::ffi::OsStr],
    working_dir: Option<&Path>,
) -> std::io::Result<ToolOutput> {
    run_tool_with_env(program, args, working_dir, &[]).await
}

/// Same as [`run_tool`], with extra environment variables for the child.
/// Secrets belong here, not in `args` (visible in the process list).
pub async fn run_tool_with_env(
    program: impl AsRef<std::ffi::OsStr>,
    args: &[&std::ffi::OsStr],
    working_dir: Option<&Path>,
    envs: &[(&str, &str)],
) -> std::io::Result<ToolOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    apply_creation_flags(&mut cmd);

    let output = cmd.output().await?;
    Ok(ToolOutput {
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Working directory for an executable: its parent directory.
pub fn working_dir_of(executable: &Path) -> Option<&Path> {
    executable.parent().filter(|p| !p.as_os_str().is_empty())
}
