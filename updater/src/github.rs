//! GitHub Release API 클라이언트
//!
//! GitHub REST API로 릴리즈 목록을 읽어 버전 카탈로그를 만들고,
//! 버전 + 컴포넌트에 맞는 에셋을 골라 내려받습니다.

use crate::download::{self, DownloadRequest};
use crate::version::{self, SemVer};
use crate::{host_os_name, AresSource, Component, ProgressSink, ReleaseDownloader, UpdaterError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "ares-launcher";

/// GitHub Release 응답 (필요한 필드만)
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

/// GitHub Release Asset
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    /// API 에셋 URL (비공개 저장소는 토큰 + octet-stream으로 여기서 받음)
    #[serde(default)]
    pub url: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// 포지 접속 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeOptions {
    /// API 베이스 URL (기본: "https://api.github.com")
    /// 로컬 mock 서버 테스트 시 "http://127.0.0.1:9876" 등으로 오버라이드
    pub api_base_url: Option<String>,
    /// 페이지당 릴리즈 수
    pub per_page: u32,
    /// 읽을 최대 페이지 수
    pub max_pages: u32,
    /// API 요청 타임아웃 (초). 에셋 다운로드에는 적용하지 않음
    pub request_timeout_secs: u64,
}

impl Default for ForgeOptions {
    fn default() -> Self {
        Self {
            api_base_url: None,
            per_page: 10,
            max_pages: 2,
            request_timeout_secs: 30,
        }
    }
}

/// GitHub API 클라이언트
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    options: ForgeOptions,
}

impl GitHubClient {
    pub fn new(options: ForgeOptions) -> Result<Self, UpdaterError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdaterError::NetworkError {
                message: format!("Failed to create HTTP client for updater: {}", e),
            })?;

        let base_url = options
            .api_base_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();

        Ok(Self { http, base_url, options })
    }

    /// base_url만 바꾼 기본 설정 클라이언트 (테스트/mock 서버용)
    pub fn with_base_url(base_url: &str) -> Result<Self, UpdaterError> {
        Self::new(ForgeOptions {
            api_base_url: Some(base_url.to_string()),
            ..ForgeOptions::default()
        })
    }

    fn api_headers(auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(value) = bearer(auth_token) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    /// 릴리즈 목록 (최대 max_pages × per_page개, 짧은 페이지에서 중단)
    pub async fn fetch_releases(
        &self,
        source: &AresSource,
        auth_token: Option<&str>,
    ) -> Result<Vec<GitHubRelease>, UpdaterError> {
        let mut all = Vec::new();
        for page in 1..=self.options.max_pages.max(1) {
            let url = format!(
                "{}/repos/{}/{}/releases?per_page={}&page={}",
                self.base_url, source.owner, source.repo, self.options.per_page, page
            );
            let releases: Vec<GitHubRelease> = self.get_json(&url, auth_token).await?;
            let short_page = (releases.len() as u32) < self.options.per_page;
            all.extend(releases);
            if short_page {
                break;
            }
        }
        Ok(all)
    }

    /// 태그로 릴리즈 하나 조회. 없으면 `Ok(None)`
    pub async fn fetch_release_by_tag(
        &self,
        source: &AresSource,
        tag: &str,
        auth_token: Option<&str>,
    ) -> Result<Option<GitHubRelease>, UpdaterError> {
        let url = release_by_tag_url(&self.base_url, source, tag);
        match self.get_json(&url, auth_token).await {
            Ok(release) => Ok(Some(release)),
            Err(UpdaterError::ApiError { status_code: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        auth_token: Option<&str>,
    ) -> Result<T, UpdaterError> {
        let response = self
            .http
            .get(url)
            .headers(Self::api_headers(auth_token))
            .timeout(Duration::from_secs(self.options.request_timeout_secs))
            .send()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "GitHub API request"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UpdaterError::ApiError {
                status_code: status.as_u16(),
                message: format!("GitHub API error ({}): {}", status, body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| UpdaterError::from_reqwest(&e, "GitHub API response"))
    }

    /// 버전에 해당하는 릴리즈 찾기
    ///
    /// 태그 후보(`1.2.0`, `v1.2.0`, ...)를 순서대로 조회하고, 모두 실패하면
    /// 릴리즈 목록에서 태그를 해석해 같은 버전을 찾는다.
    pub async fn release_for_version(
        &self,
        source: &AresSource,
        version: &SemVer,
        auth_token: Option<&str>,
    ) -> Result<GitHubRelease, UpdaterError> {
        for tag in version::tag_candidates(version) {
            if let Some(release) = self.fetch_release_by_tag(source, &tag, auth_token).await? {
                if version::parse_tag(&release.tag_name).as_ref() == Some(version) {
                    return Ok(release);
                }
            }
        }

        let releases = self.fetch_releases(source, auth_token).await.map_err(|e| match e {
            UpdaterError::ApiError { status_code: 404, .. } => not_found(source, version),
            other => other,
        })?;
        releases
            .into_iter()
            .find(|r| version::parse_tag(&r.tag_name).as_ref() == Some(version))
            .ok_or_else(|| not_found(source, version))
    }

    /// 에셋 전송 URL + 헤더. 토큰이 있으면 API URL을 octet-stream으로 받는다
    fn asset_request(asset: &GitHubAsset, auth_token: Option<&str>) -> (String, HeaderMap) {
        let mut headers = HeaderMap::new();
        match bearer(auth_token) {
            Some(value) if !asset.url.is_empty() => {
                headers.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));
                headers.insert(AUTHORIZATION, value);
                (asset.url.clone(), headers)
            }
            _ => (asset.browser_download_url.clone(), headers),
        }
    }
}

fn bearer(auth_token: Option<&str>) -> Option<HeaderValue> {
    let token = auth_token.map(str::trim).filter(|t| !t.is_empty())?;
    HeaderValue::from_str(&format!("Bearer {}", token)).ok()
}

fn not_found(source: &AresSource, version: &SemVer) -> UpdaterError {
    UpdaterError::ReleaseNotFound {
        source: source.to_string(),
        version: version.to_string(),
    }
}

/// 컴포넌트 키워드를 모두 포함하는 첫 에셋. 없고 에셋이 하나뿐이면 그것을 사용
pub fn select_asset<'a>(
    release: &'a GitHubRelease,
    component: Component,
    os: &str,
) -> Option<&'a GitHubAsset> {
    let keywords = component.asset_keywords(os);
    release
        .assets
        .iter()
        .find(|asset| {
            let name = asset.name.to_lowercase();
            keywords.iter().all(|k| name.contains(&k.to_lowercase()))
        })
        .or_else(|| match release.assets.as_slice() {
            [only] => Some(only),
            _ => None,
        })
}

impl ReleaseDownloader for GitHubClient {
    async fn available_versions(
        &self,
        source: &AresSource,
        auth_token: Option<&str>,
    ) -> Result<Vec<SemVer>, UpdaterError> {
        let releases = match self.fetch_releases(source, auth_token).await {
            Ok(releases) => releases,
            Err(UpdaterError::ApiError { status_code: 404, .. }) => {
                tracing::error!(
                    "[Updater] ARES repository not found for {}. Maybe you're missing the git auth token?",
                    source
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let versions: Vec<SemVer> = releases
            .iter()
            .filter(|r| !r.draft)
            .filter_map(|r| {
                let parsed = version::parse_tag(&r.tag_name);
                if parsed.is_none() {
                    tracing::debug!("[Updater] Skipping unparsable tag '{}'", r.tag_name);
                }
                parsed
            })
            .collect();

        tracing::info!("[Updater] {} release(s) available from {}", versions.len(), source);
        Ok(versions)
    }

    async fn download(
        &self,
        source: &AresSource,
        version: &SemVer,
        component: Component,
        destination: &Path,
        auth_token: Option<&str>,
        progress: Option<ProgressSink<'_>>,
    ) -> Result<PathBuf, UpdaterError> {
        let release = self.release_for_version(source, version, auth_token).await?;
        let asset = select_asset(&release, component, host_os_name()).ok_or_else(|| {
            UpdaterError::AssetNotFound {
                source: source.to_string(),
                version: release.tag_name.clone(),
                component: component.to_string(),
            }
        })?;

        tracing::info!(
            "[Updater] Downloading {} {} from release {} ({} bytes)",
            component,
            version,
            release.tag_name,
            asset.size
        );
        let (url, headers) = Self::asset_request(asset, auth_token);
        let target = asset_target(destination, &asset.name);
        download::download_file(
            &self.http,
            DownloadRequest {
                url: &url,
                destination: &target,
                headers,
                progress,
            },
        )
        .await
    }
}

/// 디렉터리로 받을 때는 에셋 이름으로 파일 경로를 정한다.
/// API 전송은 Content-Disposition 없이 오는 경우가 많아 `new_download`로 떨어지면
/// `.zip` 확장자를 잃고 `archive::unpack`이 거부한다
fn asset_target(destination: &Path, asset_name: &str) -> PathBuf {
    match Path::new(asset_name).file_name() {
        Some(name) if download::treat_as_directory(destination) => destination.join(name),
        _ => destination.to_path_buf(),
    }
}

/// 태그는 `+`, `/` 등을 담을 수 있어 경로 세그먼트 하나로 인코딩한다
fn release_by_tag_url(base_url: &str, source: &AresSource, tag: &str) -> String {
    format!(
        "{}/repos/{}/{}/releases/tags/{}",
        base_url,
        source.owner,
        source.repo,
        encode_path_segment(tag)
    )
}

/// RFC 3986 unreserved 문자만 그대로 두고 나머지는 `%XX`
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
