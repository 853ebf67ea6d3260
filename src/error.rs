use serde::Serialize;
use thiserror::Error;

/// 与 watchdog 服务通信失败
///
/// 不会离开 `StatusClient`，都会折叠成 `Error` 状态的 `JobStatus`
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("watchdog unreachable: {0}")]
    Network(String),
    #[error("watchdog did not answer within {0} ms")]
    TimedOut(u64),
    #[error("watchdog returned HTTP {0}")]
    Http(u16),
    #[error("malformed watchdog response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Network(_) => FailureKind::Network,
            FetchError::TimedOut(_) => FailureKind::TimedOut,
            FetchError::Http(_) => FailureKind::Http,
            FetchError::Malformed(_) => FailureKind::Malformed,
        }
    }
}

/// 合成 `Error` 状态的失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    TimedOut,
    Http,
    Malformed,
}

impl FailureKind {
    /// 超时值得重试，不计入连续错误次数
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::TimedOut)
    }
}

/// 流切换失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("HLS playback not supported in this browser")]
    Unsupported,
}

/// 用户操作被监控器拒绝
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("no upscaled stream is waiting for confirmation")]
    NothingPending,
    #[error(transparent)]
    Switch(#[from] SwitchError),
}
