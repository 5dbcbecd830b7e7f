//! 로컬 제어 API
//!
//! 외부 표시 계층(데스크톱 셸, CLI 등)이 런처 엔진을 조작하는 HTTP 인터페이스.

use crate::certificate::CertificateManager;
use crate::error::{LauncherError, LauncherResult};
use crate::launcher::Launcher;
use ares_updater::version::{latest, parse_tag};
use ares_updater::{Component, ReleaseDownloader};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequest {
    /// 비우면 최신 버전
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TakeOverRequest {
    #[serde(default = "default_take_over")]
    pub component: Component,
}

fn default_take_over() -> Component {
    Component::Both
}

/// IPC Server State
pub struct IPCServer<D, C> {
    pub launcher: Arc<Launcher<D, C>>,
    pub listen_addr: String,
}

impl<D, C> Clone for IPCServer<D, C> {
    fn clone(&self) -> Self {
        Self {
            launcher: self.launcher.clone(),
            listen_addr: self.listen_addr.clone(),
        }
    }
}

impl<D, C> IPCServer<D, C>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    pub fn new(launcher: Arc<Launcher<D, C>>, listen_addr: &str) -> Self {
        Self {
            launcher,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(get_status::<D, C>))
            .route("/api/refresh", post(refresh::<D, C>))
            .route("/api/versions", get(list_versions::<D, C>))
            .route("/api/update", post(update::<D, C>))
            .route("/api/start", post(start::<D, C>))
            .route("/api/stop", post(stop::<D, C>))
            .route("/api/restart", post(restart::<D, C>))
            .route("/api/conflicts", get(detect_conflicts::<D, C>))
            .route("/api/conflicts/kill", post(kill_conflicts::<D, C>))
            .route("/api/conflicts/take-over", post(take_over::<D, C>))
            .route("/api/database/migrate", post(migrate_database::<D, C>))
            .route("/api/launcher/versions", get(launcher_versions::<D, C>))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// `shutdown`이 끝나면 진행 중인 요청을 마무리하고 반환
    pub async fn start(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);

        axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }
}

type AppState<D, C> = State<IPCServer<D, C>>;

/// GET /api/status - 상태 스냅샷
async fn get_status<D, C>(State(state): AppState<D, C>) -> impl IntoResponse
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    Json(state.launcher.status().await)
}

/// POST /api/refresh - 인벤토리 + DB 상태 다시 확인
async fn refresh<D, C>(State(state): AppState<D, C>) -> LauncherResult<impl IntoResponse>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    Ok(Json(state.launcher.check_condition().await?))
}

/// GET /api/versions - 설치 버전과 게시된 버전
async fn list_versions<D, C>(State(state): AppState<D, C>) -> LauncherResult<impl IntoResponse>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    let inventory = state.launcher.inventory();
    let mut available = inventory.query_available().await?;
    available.sort_by(|a, b| b.cmp(a));
    let current = inventory.current_version().await;
    let update_available = match (&current, latest(&available)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(cur), Some(newest)) => newest > cur,
    };
    Ok(Json(json!({
        "current": current,
        "source": state.launcher.config().current_ares_repo,
        "available": available,
        "update_available": update_available,
    })))
}

/// POST /api/update - `{"version": "1.2.0"}` 또는 빈 본문(최신)
async fn update<D, C>(
    State(state): AppState<D, C>,
    body: Option<Json<UpdateRequest>>,
) -> LauncherResult<impl IntoResponse>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let version = match request.version.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => Some(parse_tag(raw).ok_or_else(|| LauncherError::InvalidVersion(raw.to_string()))?),
        None => None,
    };
    let outcome = state.launcher.update(version).await?;
    Ok(Json(json!({ "success": true, "result": outcome })))
}

/// POST /api/start
async fn start<D, C>(State(state): AppState<D, C>) -> impl IntoResponse
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    let report = state.launcher.start().await;
    Json(json!({ "success": report.failures.is_empty(), "result": report }))
}

/// POST /api/stop
async fn stop<D, C>(State(state): AppState<D, C>) -> impl IntoResponse
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    state.launcher.stop().await;
    Json(json!({ "success": true }))
}

/// POST /api/restart
async fn restart<D, C>(State(state): AppState<D, C>) -> impl IntoResponse
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    let report = state.launcher.restart().await;
    Json(json!({ "success": report.failures.is_empty(), "result": report }))
}

/// GET /api/conflicts - 우리가 띄우지 않은 UI/Service
async fn detect_conflicts<D, C>(State(state): AppState<D, C>) -> impl IntoResponse
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    let report = state.launcher.conflicts().detect().await;
    Json(json!({ "conflict": report.has_conflict(), "ui": report.ui, "service": report.service }))
}

/// POST /api/conflicts/kill
async fn kill_conflicts<D, C>(State(state): AppState<D, C>) -> LauncherResult<impl IntoResponse>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    state.launcher.conflicts().kill().await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /api/conflicts/take-over - `{"component": "ui" | "service" | "both"}`
async fn take_over<D, C>(
    State(state): AppState<D, C>,
    body: Option<Json<TakeOverRequest>>,
) -> LauncherResult<impl IntoResponse>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    let component = body.map(|Json(r)| r.component).unwrap_or(Component::Both);
    let conflicts = state.launcher.conflicts();
    let ui = match component {
        Component::Ui | Component::Both => conflicts.take_over_ui().await?,
        Component::Service => false,
    };
    let service = match component {
        Component::Service | Component::Both => conflicts.take_over_service().await?,
        Component::Ui => false,
    };
    Ok(Json(json!({ "success": true, "ui": ui, "service": service })))
}

/// POST /api/database/migrate
async fn migrate_database<D, C>(State(state): AppState<D, C>) -> LauncherResult<impl IntoResponse>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    let status = state.launcher.migrate_database().await?;
    Ok(Json(json!({ "success": true, "database": status })))
}

/// GET /api/launcher/versions - 런처 자체 업데이트 확인
async fn launcher_versions<D, C>(State(state): AppState<D, C>) -> LauncherResult<impl IntoResponse>
where
    D: ReleaseDownloader + 'static,
    C: CertificateManager + 'static,
{
    Ok(Json(state.launcher.launcher_versions().await?))
}
