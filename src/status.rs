use crate::error::{FailureKind, FetchError};
use serde::{Deserialize, Serialize};

/// watchdog 上报的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    Streaming,
    Finalizing,
    Ready,
    Error,
}

impl JobState {
    /// 映射各接口使用的状态字符串，未知字符串返回 None
    pub fn from_wire(status: &str) -> Option<Self> {
        let state = match status.trim().to_ascii_lowercase().as_str() {
            "ready" | "complete" => JobState::Ready,
            "streaming" | "processing" | "started" | "queued" | "success" | "skipped" => {
                JobState::Streaming
            }
            "finalizing" => JobState::Finalizing,
            "not_started" | "not_found" | "info" => JobState::NotStarted,
            "error" => JobState::Error,
            _ => return None,
        };
        Some(state)
    }
}

/// 升频任务快照，每次轮询重新获取，交给监控器后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub progress_percent: f64,
    pub eta_seconds: Option<u64>,
    pub processing_rate: Option<f64>,
    pub segment_count: u32,
    pub stream_url: Option<String>,
    pub message: Option<String>,
    pub failure: Option<FailureKind>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            progress_percent: 0.0,
            eta_seconds: None,
            processing_rate: None,
            segment_count: 0,
            stream_url: None,
            message: None,
            failure: None,
        }
    }

    pub fn not_started() -> Self {
        Self::new(JobState::NotStarted)
    }

    /// 请求失败时合成的 Error 快照
    pub fn failed(err: &FetchError) -> Self {
        Self {
            message: Some(err.to_string()),
            failure: Some(err.kind()),
            ..Self::new(JobState::Error)
        }
    }

    pub fn with_progress(mut self, percent: f64) -> Self {
        self.progress_percent = clamp_percent(percent);
        self
    }

    pub fn with_segments(mut self, segments: u32) -> Self {
        self.segment_count = segments;
        if !self.trusts_url() {
            self.stream_url = None;
        }
        self
    }

    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        if self.trusts_url() {
            self.stream_url = Some(url.into());
        }
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.processing_rate = Some(rate).filter(|r| r.is_finite() && *r > 0.0);
        self
    }

    pub fn with_eta(mut self, seconds: u64) -> Self {
        self.eta_seconds = Some(seconds);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 至少有一个分片或任务已完成时，流地址才可信
    fn trusts_url(&self) -> bool {
        self.segment_count > 0 || self.state == JobState::Ready
    }

    /// 分片数严格大于阈值且有流地址时才允许切换
    pub fn is_switchable(&self, min_segments: u32) -> bool {
        self.segment_count > min_segments && self.stream_url.is_some()
    }

    pub fn is_transient_failure(&self) -> bool {
        self.failure.is_some_and(FailureKind::is_transient)
    }

    /// 合并 `/progress` 的读数，生成新的快照
    ///
    /// 状态和流地址以 `/hls-status` 为准，进度接口只提供百分比、速度、ETA 和消息。
    /// 进度读取失败或尚无进度记录 (404) 时保持原快照不变
    pub fn merge_progress(&self, progress: &JobStatus) -> JobStatus {
        if matches!(progress.state, JobState::Error | JobState::NotStarted) {
            return self.clone();
        }

        let mut merged = self.clone();
        merged.progress_percent = progress.progress_percent;
        merged.processing_rate = progress.processing_rate;
        merged.eta_seconds = progress.eta_seconds;
        merged.segment_count = merged.segment_count.max(progress.segment_count);
        if progress.message.is_some() {
            merged.message = progress.message.clone();
        }
        merged
    }

    /// 解析 watchdog 返回的 JSON
    pub fn from_json(body: &[u8]) -> Result<Self, FetchError> {
        let wire: WireStatus =
            serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
        wire.into_status()
    }
}

/// `/hls-status`、`/progress` 和 `/upscale-trigger` 共用的响应体
#[derive(Debug, Deserialize)]
struct WireStatus {
    status: Option<String>,
    hls_url: Option<String>,
    segments: Option<u32>,
    complete: Option<bool>,
    progress: Option<f64>,
    processing_rate: Option<f64>,
    eta_seconds: Option<i64>,
    message: Option<String>,
}

impl WireStatus {
    fn into_status(self) -> Result<JobStatus, FetchError> {
        let raw = self
            .status
            .ok_or_else(|| FetchError::Malformed("missing `status` field".to_string()))?;
        let mut state = JobState::from_wire(&raw)
            .ok_or_else(|| FetchError::Malformed(format!("unknown status `{}`", raw)))?;
        // 播放列表已写完，仍在收尾
        if state == JobState::Streaming && self.complete == Some(true) {
            state = JobState::Finalizing;
        }

        let mut status = JobStatus::new(state).with_segments(self.segments.unwrap_or(0));
        if let Some(progress) = self.progress {
            status = status.with_progress(progress);
        } else if state == JobState::Ready {
            status = status.with_progress(100.0);
        }
        if let Some(url) = self.hls_url.filter(|u| !u.is_empty()) {
            status = status.with_stream_url(url);
        }
        if let Some(rate) = self.processing_rate {
            status = status.with_rate(rate);
        }
        if let Some(eta) = self.eta_seconds.filter(|e| *e >= 0) {
            status = status.with_eta(eta as u64);
        }
        if let Some(message) = self.message {
            status = status.with_message(message);
        }
        Ok(status)
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}
