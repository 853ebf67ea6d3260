use crate::switcher::{ReadyHook, SegmentedEngine, VideoElement, HLS_MIME};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// 下发给宿主页面的播放器指令
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerCommand {
    /// `engine` 为 true 时交给 hls.js 加载，否则直接替换 video.src
    Load { url: String, engine: bool },
    Seek { seconds: f64 },
    Play,
}

#[derive(Default)]
struct PlayerState {
    current_time: f64,
    paused: bool,
    commands: VecDeque<PlayerCommand>,
    pending: Option<ReadyHook>,
}

/// 宿主页面中的 video 元素
///
/// 页面通过 `/player/state` 上报播放位置，通过 `/player/commands` 拉取指令，
/// 新源就绪 (MANIFEST_PARSED / loadedmetadata) 后调用 `/player/ready`。
pub struct BridgedVideo {
    native_hls: bool,
    inner: Mutex<PlayerState>,
}

impl BridgedVideo {
    pub fn new(native_hls: bool) -> Self {
        Self {
            native_hls,
            inner: Mutex::new(PlayerState {
                paused: true,
                ..PlayerState::default()
            }),
        }
    }

    /// 页面上报的播放状态
    pub fn report_state(&self, current_time: f64, paused: bool) {
        let mut player = self.lock();
        if current_time.is_finite() && current_time >= 0.0 {
            player.current_time = current_time;
        }
        player.paused = paused;
    }

    pub fn drain_commands(&self) -> Vec<PlayerCommand> {
        self.lock().commands.drain(..).collect()
    }

    /// 新源已就绪，执行挂起的恢复动作
    pub fn ready(&self) -> bool {
        // 回调会再次加锁，先释放
        let hook = self.lock().pending.take();
        match hook {
            Some(hook) => {
                debug!("Player source ready, restoring position");
                hook();
                true
            }
            None => false,
        }
    }

    fn load(&self, url: &str, engine: bool, on_ready: ReadyHook) {
        let mut player = self.lock();
        info!(
            "Player loading {} via {}",
            url,
            if engine { "segmented engine" } else { "native element" }
        );
        player.commands.push_back(PlayerCommand::Load {
            url: url.to_string(),
            engine,
        });
        player.pending = Some(on_ready);
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VideoElement for BridgedVideo {
    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn can_play_type(&self, mime: &str) -> bool {
        self.native_hls && mime == HLS_MIME
    }

    fn load_source(&self, url: &str, on_ready: ReadyHook) {
        self.load(url, false, on_ready);
    }

    fn seek(&self, seconds: f64) {
        let mut player = self.lock();
        player.current_time = seconds;
        player.commands.push_back(PlayerCommand::Seek { seconds });
    }

    fn play(&self) {
        let mut player = self.lock();
        player.paused = false;
        player.commands.push_back(PlayerCommand::Play);
    }
}

/// 页面中的 hls.js
pub struct BridgedEngine {
    supported: bool,
    video: Arc<BridgedVideo>,
}

impl BridgedEngine {
    pub fn new(supported: bool, video: Arc<BridgedVideo>) -> Self {
        Self { supported, video }
    }
}

impl SegmentedEngine for BridgedEngine {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn attach(&self, url: &str, _element: Arc<dyn VideoElement>, on_ready: ReadyHook) {
        self.video.load(url, true, on_ready);
    }
}
