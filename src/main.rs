mod bridge;
mod client;
mod config;
mod error;
mod media;
mod monitor;
mod overlay;
mod presenter;
mod scheduler;
mod state;
mod status;
mod switcher;
mod web;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use config::AppConfig;
use state::AppState;
use std::sync::Arc;
use tracing::info;

/// Upscale Link - 升频进度监控与流切换
/// 解析命令行参数，加载配置文件，启动监控器和桥接 HTTP 服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "upscale-link.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // 加载配置文件
    let config = AppConfig::load(&args.config)?;
    info!(
        "Upscale Link initialized. Watchdog: {}, auto switch: {}",
        config.watchdog.url, config.monitor.auto_switch
    );

    let state = Arc::new(AppState::new(config)?);

    // 注册HTTP路由
    let app = Router::new()
        .route("/", get(web::admin::index_handler)) // 浮层页面
        .route("/monitor/status", get(web::admin::monitor_status)) // 监控状态
        .route("/monitor/start", post(web::admin::handle_start)) // 播放开始
        .route("/monitor/stop", post(web::admin::handle_stop)) // 播放停止
        .route("/monitor/switch", post(web::admin::handle_switch)) // 确认切换
        .route("/monitor/playing", post(web::admin::handle_playing)) // 视频已播放
        .route("/overlay/toggle", post(web::admin::toggle_overlay))
        .route("/overlay/hide", post(web::admin::hide_overlay))
        .route("/player/state", post(web::player::report_state)) // 播放器状态上报
        .route("/player/commands", get(web::player::take_commands)) // 播放器指令
        .route("/player/ready", post(web::player::source_ready))
        .with_state(state.clone());

    info!("Listening on {}", state.config.server.listen);
    let listener = tokio::net::TcpListener::bind(&state.config.server.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
