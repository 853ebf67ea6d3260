use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// 桥接服务监听地址 (宿主页面通过它上报播放事件)
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// 外部 watchdog 升频服务
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatchdogConfig {
    pub url: String,
    /// 状态查询超时 (毫秒)
    pub status_timeout_ms: u64,
    /// 触发升频超时 (毫秒)
    pub trigger_timeout_ms: u64,
}

/// 播放监控策略
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    /// 轮询间隔 (毫秒)
    pub poll_interval_ms: u64,
    /// 最大轮询次数，达到后放弃 (默认 30 次，约 60 秒)
    pub max_attempts: u32,
    /// 分片足够时自动切换，否则等待用户确认
    pub auto_switch: bool,
    /// 分片数必须严格大于该值才允许切换
    pub min_segments_to_switch: u32,
    /// 播放开始时立即显示 "准备中" 状态
    pub loading_shown_immediately: bool,
    /// 完成后自动隐藏浮层的延迟 (毫秒)，0 表示不自动隐藏
    pub auto_hide_on_complete_ms: u64,
    /// 连续错误容忍次数 (超时不计入)
    pub error_tolerance: u32,
}

/// 宿主播放器能力
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlayerConfig {
    /// 宿主页面是否加载了分片播放引擎 (hls.js)
    pub segmented_engine: bool,
    /// video 元素是否原生支持 HLS (Safari 等)
    pub native_hls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            status_timeout_ms: 5_000,
            trigger_timeout_ms: 10_000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_attempts: 30,
            auto_switch: false,
            min_segments_to_switch: 2,
            loading_shown_immediately: true,
            auto_hide_on_complete_ms: 10_000,
            error_tolerance: 3,
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            segmented_engine: true,
            native_hls: false,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn auto_hide_delay(&self) -> Option<Duration> {
        (self.auto_hide_on_complete_ms > 0)
            .then(|| Duration::from_millis(self.auto_hide_on_complete_ms))
    }
}

fn default_listen() -> String {
    "127.0.0.1:7070".to_string()
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
