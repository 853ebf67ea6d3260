use crate::error::MonitorError;
use crate::media::MediaRef;
use crate::monitor::MonitorStatus;
use crate::overlay::{OverlaySink, OverlaySnapshot};
use crate::state::SharedState;
use crate::switcher::ResumePoint;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 提供内嵌的浮层页面
pub async fn index_handler() -> axum::response::Html<&'static str> {
    axum::response::Html(include_str!("../../static/index.html"))
}

#[derive(Serialize)]
pub struct StatusReport {
    pub monitor: MonitorStatus,
    pub overlay: OverlaySnapshot,
}

/// 获取监控状态 API
/// 返回监控阶段、当前会话以及浮层画面
pub async fn monitor_status(State(state): State<SharedState>) -> Json<StatusReport> {
    Json(StatusReport {
        monitor: state.monitor.current_status(),
        overlay: state.overlay.snapshot(),
    })
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub path: String,
}

/// 播放开始 API
/// 立即取代旧会话，初始检查和触发在后台进行
pub async fn handle_start(
    State(state): State<SharedState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, String), (StatusCode, String)> {
    let Some(media) = MediaRef::parse(&req.path) else {
        return Err((StatusCode::BAD_REQUEST, "Missing media file name".to_string()));
    };

    let filename = media.filename;
    let startup = state.monitor.start_monitoring(&req.path);
    let message = format!("Monitor [{}] started", filename);
    tokio::spawn(async move {
        let phase = startup.await;
        info!("Monitor [{}] startup finished in {:?}", filename, phase);
    });

    Ok((StatusCode::ACCEPTED, message))
}

/// 播放停止 API
pub async fn handle_stop(State(state): State<SharedState>) -> String {
    if state.monitor.stop_monitoring() {
        "Monitor stopped".to_string()
    } else {
        "Monitor was idle".to_string()
    }
}

/// 用户点击 "切换到升频流"
pub async fn handle_switch(
    State(state): State<SharedState>,
) -> Result<Json<ResumePoint>, (StatusCode, String)> {
    state.monitor.confirm_switch().map(Json).map_err(|e| {
        warn!("Switch request rejected: {}", e);
        let code = match e {
            MonitorError::NothingPending => StatusCode::CONFLICT,
            MonitorError::Switch(_) => StatusCode::NOT_IMPLEMENTED,
        };
        (code, e.to_string())
    })
}

/// 视频已开始播放
pub async fn handle_playing(State(state): State<SharedState>) -> StatusCode {
    state.monitor.video_playing();
    StatusCode::NO_CONTENT
}

/// 快捷键切换浮层
pub async fn toggle_overlay(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let visible = state.overlay.toggle();
    Json(serde_json::json!({ "visible": visible }))
}

/// 关闭按钮
pub async fn hide_overlay(State(state): State<SharedState>) -> StatusCode {
    state.overlay.hide();
    StatusCode::NO_CONTENT
}
