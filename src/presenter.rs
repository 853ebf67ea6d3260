//! 进度浮层渲染
//!
//! `render` 把任务快照转换为浮层画面，没有副作用，
//! 结果由监控器交给 `OverlaySink` 显示。

use crate::status::{JobState, JobStatus};
use serde::Serialize;

pub const PREPARING_TEXT: &str = "Preparing 4K upscaling...";
pub const COMPLETE_TEXT: &str = "✓ Upscaling Complete!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Preparing,
    Processing,
    Finalizing,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Speed {
    pub text: String,
    /// 低于实时速度，浮层会标出
    pub slow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Details {
    pub speed: Option<Speed>,
    pub eta: Option<String>,
    pub segments: u32,
}

/// 浮层一帧所需的全部内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    /// 进度条不确定时为 None
    pub percent: Option<f64>,
    pub percent_text: String,
    pub status_line: String,
    pub tone: Tone,
    pub details: Option<Details>,
    /// "切换到升频流" 按钮对应的流地址
    pub switch_url: Option<String>,
    pub complete: bool,
    /// 应用这一帧时开始自动隐藏倒计时
    pub auto_dismiss: bool,
}

impl ViewModel {
    pub fn preparing() -> Self {
        Self {
            percent: None,
            percent_text: "0%".to_string(),
            status_line: PREPARING_TEXT.to_string(),
            tone: Tone::Preparing,
            details: None,
            switch_url: None,
            complete: false,
            auto_dismiss: false,
        }
    }
}

/// 计算 `current` 对应的浮层画面
///
/// `previous` 只用于判断是否刚进入 `Ready`，每次完成只触发一次自动隐藏
pub fn render(
    previous: Option<&JobStatus>,
    current: &JobStatus,
    is_loading_phase: bool,
    min_segments: u32,
) -> ViewModel {
    if is_loading_phase {
        return ViewModel::preparing();
    }

    // 1. 进度百分比
    let complete = current.state == JobState::Ready;
    let percent = if complete {
        100.0
    } else {
        current.progress_percent.clamp(0.0, 100.0)
    };

    // 2. 色调与状态文字
    let tone = match current.state {
        JobState::NotStarted | JobState::Streaming => Tone::Processing,
        JobState::Finalizing => Tone::Finalizing,
        JobState::Ready => Tone::Complete,
        JobState::Error => Tone::Error,
    };

    let status_line = match current.state {
        JobState::Ready => COMPLETE_TEXT.to_string(),
        JobState::Error => current
            .message
            .clone()
            .unwrap_or_else(|| "Upscaling status unavailable".to_string()),
        JobState::NotStarted => current
            .message
            .clone()
            .unwrap_or_else(|| "Starting upscale process...".to_string()),
        JobState::Streaming | JobState::Finalizing => current
            .message
            .clone()
            .unwrap_or_else(|| "Processing...".to_string()),
    };

    // 3. 速度、ETA、分片详情
    let details = Details {
        speed: current.processing_rate.map(|rate| Speed {
            text: format!("{:.2}x", rate),
            slow: rate < 1.0,
        }),
        eta: current.eta_seconds.map(format_eta),
        segments: current.segment_count,
    };

    // 4. 切换按钮
    let switch_url = current
        .is_switchable(min_segments)
        .then(|| current.stream_url.clone())
        .flatten();

    let was_complete = previous.is_some_and(|p| p.state == JobState::Ready);

    ViewModel {
        percent: Some(percent),
        percent_text: format!("{}%", percent.round() as u32),
        status_line,
        tone,
        details: Some(details),
        switch_url,
        complete,
        auto_dismiss: complete && !was_complete,
    }
}

/// 剩余时间格式: `45s`、`3m 7s`、`2h 5m`
pub fn format_eta(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming(progress: f64, segments: u32) -> JobStatus {
        JobStatus::new(JobState::Streaming)
            .with_progress(progress)
            .with_segments(segments)
            .with_stream_url("http://h/x/stream.m3u8")
    }

    #[test]
    fn loading_phase_hides_everything() {
        let status = streaming(40.0, 8).with_rate(1.4).with_eta(30);
        let view = render(None, &status, true, 2);
        assert_eq!(view, ViewModel::preparing());
        assert_eq!(view.status_line, PREPARING_TEXT);
        assert!(view.details.is_none());
        assert!(view.switch_url.is_none());
    }

    #[test]
    fn switch_affordance_needs_more_than_min_segments() {
        for segments in 0..=2 {
            let view = render(None, &streaming(20.0, segments), false, 2);
            assert_eq!(view.switch_url, None, "segments={}", segments);
        }
        let view = render(None, &streaming(20.0, 3), false, 2);
        assert_eq!(view.switch_url.as_deref(), Some("http://h/x/stream.m3u8"));

        let no_url = JobStatus::new(JobState::Streaming).with_segments(10);
        assert_eq!(render(None, &no_url, false, 2).switch_url, None);
    }

    #[test]
    fn progress_details() {
        let status = streaming(10.4, 1)
            .with_rate(0.75)
            .with_eta(3725)
            .with_message("Upscaling (slower than real-time: 0.8x)");
        let view = render(None, &status, false, 2);

        assert_eq!(view.percent, Some(10.4));
        assert_eq!(view.percent_text, "10%");
        assert_eq!(view.tone, Tone::Processing);
        assert_eq!(view.status_line, "Upscaling (slower than real-time: 0.8x)");
        let details = view.details.unwrap();
        assert_eq!(
            details.speed,
            Some(Speed {
                text: "0.75x".to_string(),
                slow: true
            })
        );
        assert_eq!(details.eta.as_deref(), Some("1h 2m"));
        assert_eq!(details.segments, 1);
        assert!(!view.complete);
        assert!(!view.auto_dismiss);
    }

    #[test]
    fn auto_dismiss_only_on_transition_to_ready() {
        let ready = JobStatus::new(JobState::Ready).with_progress(100.0);
        let before = streaming(90.0, 20);

        let first = render(Some(&before), &ready, false, 2);
        assert!(first.complete);
        assert!(first.auto_dismiss);
        assert_eq!(first.tone, Tone::Complete);
        assert_eq!(first.status_line, COMPLETE_TEXT);
        assert_eq!(first.percent, Some(100.0));

        let again = render(Some(&ready), &ready, false, 2);
        assert!(again.complete);
        assert!(!again.auto_dismiss);
    }

    #[test]
    fn error_and_finalizing_tones() {
        let error = JobStatus::new(JobState::Error).with_message("watchdog returned HTTP 500");
        let view = render(None, &error, false, 2);
        assert_eq!(view.tone, Tone::Error);
        assert_eq!(view.status_line, "watchdog returned HTTP 500");

        let finalizing = JobStatus::new(JobState::Finalizing).with_progress(100.0);
        assert_eq!(render(None, &finalizing, false, 2).tone, Tone::Finalizing);
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(0), "0s");
        assert_eq!(format_eta(59), "59s");
        assert_eq!(format_eta(187), "3m 7s");
        assert_eq!(format_eta(7500), "2h 5m");
    }
}
