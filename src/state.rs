use crate::bridge::{BridgedEngine, BridgedVideo};
use crate::client::StatusClient;
use crate::config::AppConfig;
use crate::monitor::PlaybackMonitor;
use crate::overlay::OverlayBoard;
use crate::switcher::SegmentedEngine;
use std::sync::Arc;

/// 全局应用上下文
pub struct AppState {
    pub config: AppConfig,
    /// 播放监控器 (单会话)
    pub monitor: PlaybackMonitor<StatusClient>,
    /// 浮层状态，宿主页面轮询读取
    pub overlay: Arc<OverlayBoard>,
    /// 宿主页面 video 元素的桥接
    pub video: Arc<BridgedVideo>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let client = StatusClient::new(&config.watchdog)?;
        let overlay = Arc::new(OverlayBoard::new());
        let video = Arc::new(BridgedVideo::new(config.player.native_hls));
        let engine: Arc<dyn SegmentedEngine> = Arc::new(BridgedEngine::new(
            config.player.segmented_engine,
            video.clone(),
        ));

        let monitor = PlaybackMonitor::new(
            config.monitor.clone(),
            client,
            overlay.clone(),
            video.clone(),
            Some(engine),
        );

        Ok(Self {
            config,
            monitor,
            overlay,
            video,
        })
    }
}

pub type SharedState = Arc<AppState>;
