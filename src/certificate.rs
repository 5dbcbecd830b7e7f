//! 로컬 HTTPS용 자체 서명 인증서
//!
//! PFX가 없으면 openssl로 생성하고, 매 갱신마다 OS 신뢰 저장소 등록을 시도한다.
//! 실패는 error 로그만 남기고 업데이트 흐름을 막지 않는다.

use crate::config::LauncherConfig;
use crate::utils::{self, ToolOutput};
use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SUBJECT_ALT_NAMES: &str = "subjectAltName=DNS:localhost,IP:127.0.0.1,IP:::1";
const VALID_DAYS: &str = "3650";
/// openssl이 PFX 암호를 읽는 환경 변수 (`-passout env:...`)
const PASSWORD_ENV: &str = "ARES_CERT_PASSWORD";

/// 업데이트 사이클마다 한 번 호출되는 인증서 협력자
pub trait CertificateManager: Send + Sync {
    fn refresh(&self) -> impl Future<Output = ()> + Send;
}

pub struct SystemCertificateManager {
    config: Arc<LauncherConfig>,
}

impl SystemCertificateManager {
    pub fn new(config: Arc<LauncherConfig>) -> Self {
        Self { config }
    }

    fn pfx_path(&self) -> &Path {
        &self.config.certificate.path
    }

    fn password(&self) -> &str {
        self.config.certificate.password.as_deref().unwrap_or("")
    }
}

impl CertificateManager for SystemCertificateManager {
    async fn refresh(&self) {
        let pfx = self.pfx_path().to_path_buf();
        let crt = public_cert_path(&pfx);

        if !pfx.is_file() || !crt.is_file() {
            if let Err(e) = generate(&pfx, &crt, self.password()).await {
                tracing::error!("[Certificate] Unable to generate a certificate to {}: {}", pfx.display(), e);
                return;
            }
            tracing::info!("[Certificate] Generated {}", pfx.display());
        }

        if !self.config.certificate.install_to_trust_store {
            return;
        }
        match install_to_trust_store(&crt).await {
            Ok(()) => tracing::info!("[Certificate] Trusted {}", crt.display()),
            Err(e) => tracing::error!("[Certificate] Failed to add certificate: {}", e),
        }
    }
}

/// PFX 옆에 두는 공개 인증서 (`ares.pfx` → `ares.crt`)
pub fn public_cert_path(pfx: &Path) -> PathBuf {
    pfx.with_extension("crt")
}

/// PFX 내보내기 인자. 암호는 명령줄이 아니라 환경 변수로 넘긴다
fn pkcs12_export_args(key: &Path, crt: &Path, pfx: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["pkcs12", "-export", "-inkey"].iter().map(OsString::from).collect();
    args.push(key.into());
    args.push("-in".into());
    args.push(crt.into());
    args.push("-out".into());
    args.push(pfx.into());
    args.push("-passout".into());
    args.push(format!("env:{}", PASSWORD_ENV).into());
    args
}

fn check(tool: &str, output: ToolOutput) -> anyhow::Result<()> {
    if output.success() {
        Ok(())
    } else {
        anyhow::bail!("{} exited with {}: {}", tool, output.status, output.stderr)
    }
}

async fn generate(pfx: &Path, crt: &Path, password: &str) -> anyhow::Result<()> {
    let dir = pfx
        .parent()
        .ok_or_else(|| anyhow::anyhow!("certificate path has no parent: {}", pfx.display()))?;
    tokio::fs::create_dir_all(dir).await?;

    let key = pfx.with_extension("key.pem");
    let out = utils::run_tool(
        "openssl",
        &[
            OsStr::new("req"),
            OsStr::new("-x509"),
            OsStr::new("-newkey"),
            OsStr::new("rsa:2048"),
            OsStr::new("-sha256"),
            OsStr::new("-nodes"),
            OsStr::new("-days"),
            OsStr::new(VALID_DAYS),
            OsStr::new("-subj"),
            OsStr::new("/CN=localhost"),
            OsStr::new("-addext"),
            OsStr::new(SUBJECT_ALT_NAMES),
            OsStr::new("-addext"),
            OsStr::new("extendedKeyUsage=serverAuth"),
            OsStr::new("-keyout"),
            key.as_os_str(),
            OsStr::new("-out"),
            crt.as_os_str(),
        ],
        None,
    )
    .await?;
    check("openssl req", out)?;

    let args = pkcs12_export_args(&key, crt, pfx);
    let args: Vec<&OsStr> = args.iter().map(|a| a.as_os_str()).collect();
    let out = utils::run_tool_with_env("openssl", &args, None, &[(PASSWORD_ENV, password)]).await;

    // 개인 키는 PFX 안에만 남긴다
    if let Err(e) = tokio::fs::remove_file(&key).await {
        tracing::debug!("[Certificate] Could not remove {}: {}", key.display(), e);
    }
    check("openssl pkcs12", out?)
}

#[cfg(target_os = "windows")]
async fn install_to_trust_store(crt: &Path) -> anyhow::Result<()> {
    let out = utils::run_tool(
        "certutil",
        &[OsStr::new("-user"), OsStr::new("-addstore"), OsStr::new("Root"), crt.as_os_str()],
        None,
    )
    .await?;
    check("certutil", out)
}

#[cfg(target_os = "macos")]
async fn install_to_trust_store(crt: &Path) -> anyhow::Result<()> {
    let home = std::env::var_os("HOME").ok_or_else(|| anyhow::anyhow!("HOME is not set"))?;
    let keychain = PathBuf::from(home).join("Library/Keychains/login.keychain-db");
    let out = utils::run_tool(
        "security",
        &[
            OsStr::new("add-trusted-cert"),
            OsStr::new("-d"),
            OsStr::new("-r"),
            OsStr::new("trustRoot"),
            OsStr::new("-k"),
            keychain.as_os_str(),
            crt.as_os_str(),
        ],
        None,
    )
    .await?;
    check("security", out)
}

#[cfg(all(unix, not(target_os = "macos")))]
async fn install_to_trust_store(crt: &Path) -> anyhow::Result<()> {
    const TRUSTED: &str = "/usr/local/share/ca-certificates/ares-launcher.crt";

    let ours = tokio::fs::read(crt).await?;
    if let Ok(existing) = tokio::fs::read(TRUSTED).await {
        if existing == ours {
            tracing::debug!("[Certificate] Already trusted");
            return Ok(());
        }
    }

    // 대화형 프롬프트 없이 (-n) 시도, 권한이 없으면 실패로 기록된다
    let out = utils::run_tool(
        "sudo",
        &[OsStr::new("-n"), OsStr::new("cp"), crt.as_os_str(), OsStr::new(TRUSTED)],
        None,
    )
    .await?;
    check("sudo cp", out)?;

    let out = utils::run_tool("sudo", &[OsStr::new("-n"), OsStr::new("update-ca-certificates")], None).await?;
    check("update-ca-certificates", out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crt_sits_next_to_pfx() {
        let crt = public_cert_path(Path::new("/opt/ares/certs/ares.pfx"));
        assert_eq!(crt, PathBuf::from("/opt/ares/certs/ares.crt"));
    }

    #[test]
    fn export_password_stays_off_the_command_line() {
        let args = pkcs12_export_args(Path::new("k.pem"), Path::new("c.crt"), Path::new("p.pfx"));
        let pos = args.iter().position(|a| a == "-passout").unwrap();
        assert_eq!(args[pos + 1], OsString::from("env:ARES_CERT_PASSWORD"));
        assert!(args.iter().all(|a| !a.to_string_lossy().starts_with("pass:")));
        assert_eq!(args.last().unwrap(), "env:ARES_CERT_PASSWORD");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_tool_reports_stderr() {
        let out = utils::run_tool("sh", &[OsStr::new("-c"), OsStr::new("echo denied >&2; exit 1")], None)
            .await
            .unwrap();
        let err = check("sh", out).unwrap_err();
        assert!(err.to_string().contains("denied"));
    }
}
