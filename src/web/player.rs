use crate::bridge::PlayerCommand;
use crate::state::SharedState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
pub struct PlayerReport {
    pub current_time: f64,
    pub paused: bool,
    #[serde(default)]
    pub ended: bool,
}

/// 页面上报 video 元素状态
///
/// 播放结束等同于播放停止
pub async fn report_state(
    State(state): State<SharedState>,
    Json(report): Json<PlayerReport>,
) -> StatusCode {
    state.video.report_state(report.current_time, report.paused);
    if report.ended {
        debug!("Player reported end of media at {:.1}s", report.current_time);
        state.monitor.stop_monitoring();
    }
    StatusCode::NO_CONTENT
}

/// 页面拉取待执行的指令
pub async fn take_commands(State(state): State<SharedState>) -> Json<Vec<PlayerCommand>> {
    Json(state.video.drain_commands())
}

/// 新源已就绪 (MANIFEST_PARSED / loadedmetadata)
pub async fn source_ready(State(state): State<SharedState>) -> StatusCode {
    if state.video.ready() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::CONFLICT
    }
}
