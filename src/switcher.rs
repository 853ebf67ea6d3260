use crate::error::SwitchError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// 检测原生 HLS 支持时使用的 MIME 类型
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// 新源可以跳转时调用一次
pub type ReadyHook = Box<dyn FnOnce() + Send + 'static>;

/// 宿主页面中的 video 元素
pub trait VideoElement: Send + Sync {
    fn current_time(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn can_play_type(&self, mime: &str) -> bool;
    /// 替换 `src`，`loadedmetadata` 时执行 `on_ready`
    fn load_source(&self, url: &str, on_ready: ReadyHook);
    fn seek(&self, seconds: f64);
    fn play(&self);
}

/// 脚本侧分片播放引擎 (hls.js 等)
pub trait SegmentedEngine: Send + Sync {
    fn is_supported(&self) -> bool;
    /// 把 `url` 加载到 `element`，清单解析完成后执行 `on_ready`
    fn attach(&self, url: &str, element: Arc<dyn VideoElement>, on_ready: ReadyHook);
}

/// 宿主播放分片流的方式，只判定一次
#[derive(Clone)]
pub enum PlaybackHost {
    SegmentedEngineAdapter(Arc<dyn SegmentedEngine>),
    NativeElement,
    Unavailable,
}

impl PlaybackHost {
    pub fn kind(&self) -> HostKind {
        match self {
            PlaybackHost::SegmentedEngineAdapter(_) => HostKind::SegmentedEngine,
            PlaybackHost::NativeElement => HostKind::Native,
            PlaybackHost::Unavailable => HostKind::Unavailable,
        }
    }
}

impl fmt::Debug for PlaybackHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    SegmentedEngine,
    Native,
    Unavailable,
}

/// 切换前记录的播放状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResumePoint {
    pub current_time: f64,
    pub was_playing: bool,
}

pub struct StreamSwitcher {
    host: PlaybackHost,
}

impl StreamSwitcher {
    /// 优先使用可用的分片引擎，其次原生 HLS
    pub fn new(engine: Option<Arc<dyn SegmentedEngine>>, element: &dyn VideoElement) -> Self {
        let host = match engine {
            Some(engine) if engine.is_supported() => PlaybackHost::SegmentedEngineAdapter(engine),
            _ if element.can_play_type(HLS_MIME) => PlaybackHost::NativeElement,
            _ => PlaybackHost::Unavailable,
        };
        info!("Stream switcher using {:?} playback", host);
        Self { host }
    }

    pub fn host(&self) -> &PlaybackHost {
        &self.host
    }

    /// 把 `element` 切换到 `stream_url`，保留播放位置和播放状态
    ///
    /// # 流程
    /// - 先记录当前位置和是否在播放
    /// - 通过选定的方式加载新源
    /// - 新源就绪后才跳转并恢复播放，避免画面跳回开头
    ///
    /// 无法播放 HLS 时返回 `Unsupported`，不改动任何状态
    pub fn switch(
        &self,
        stream_url: &str,
        element: &Arc<dyn VideoElement>,
    ) -> Result<ResumePoint, SwitchError> {
        let resume = ResumePoint {
            current_time: element.current_time(),
            was_playing: !element.is_paused(),
        };
        let on_ready = restore_hook(element.clone(), resume);

        match &self.host {
            PlaybackHost::SegmentedEngineAdapter(engine) => {
                log_switch(stream_url, resume);
                engine.attach(stream_url, element.clone(), on_ready);
            }
            PlaybackHost::NativeElement => {
                log_switch(stream_url, resume);
                element.load_source(stream_url, on_ready);
            }
            PlaybackHost::Unavailable => {
                warn!("HLS playback not supported, staying on the original source");
                return Err(SwitchError::Unsupported);
            }
        }
        Ok(resume)
    }
}

fn log_switch(stream_url: &str, resume: ResumePoint) {
    info!(
        "Switching to upscaled stream {} at {:.1}s ({})",
        stream_url,
        resume.current_time,
        if resume.was_playing { "playing" } else { "paused" }
    );
}

fn restore_hook(element: Arc<dyn VideoElement>, resume: ResumePoint) -> ReadyHook {
    Box::new(move || {
        element.seek(resume.current_time);
        if resume.was_playing {
            element.play();
        }
    })
}
