use crate::config::WatchdogConfig;
use crate::error::FetchError;
use crate::media::MediaRef;
use crate::status::{JobState, JobStatus};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 监控器的任务状态来源
///
/// 实现不会返回错误，所有失败都折叠成 `Error` 状态的 `JobStatus`
pub trait StatusSource: Send + Sync + 'static {
    /// 查询 `/hls-status`，判断升频文件是否已存在
    fn check_status(&self, media: &MediaRef) -> impl Future<Output = JobStatus> + Send;

    /// 请求 watchdog 启动升频 (已在运行或已完成时返回当前状态)
    fn trigger_upscale(&self, media: &MediaRef) -> impl Future<Output = JobStatus> + Send;

    /// 一次轮询
    fn poll_status(&self, media: &MediaRef) -> impl Future<Output = JobStatus> + Send;
}

/// watchdog 服务的 HTTP 客户端
pub struct StatusClient {
    http: reqwest::Client,
    base_url: Url,
    status_timeout: Duration,
    trigger_timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TriggerBody<'a> {
    item: TriggerItem<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TriggerItem<'a> {
    path: &'a str,
    name: &'a str,
}

impl StatusClient {
    pub fn new(config: &WatchdogConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("watchdog url `{}` cannot be used as a base", config.url);
        }

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url,
            status_timeout: Duration::from_millis(config.status_timeout_ms),
            trigger_timeout: Duration::from_millis(config.trigger_timeout_ms),
        })
    }

    /// `GET {url}/hls-status/{filename}`
    pub async fn check_status(&self, media: &MediaRef) -> JobStatus {
        let url = self.endpoint(&["hls-status", &media.filename]);
        let request = self.http.get(url).timeout(self.status_timeout);
        self.fetch(request, self.status_timeout).await
    }

    /// `POST {url}/upscale-trigger`
    pub async fn trigger_upscale(&self, media: &MediaRef) -> JobStatus {
        let url = self.endpoint(&["upscale-trigger"]);
        let body = TriggerBody {
            item: TriggerItem {
                path: &media.path,
                name: &media.basename,
            },
        };
        let request = self
            .http
            .post(url)
            .json(&body)
            .timeout(self.trigger_timeout);
        self.fetch(request, self.trigger_timeout).await
    }

    /// `GET {url}/progress/{filename}`
    pub async fn fetch_progress(&self, media: &MediaRef) -> JobStatus {
        let url = self.endpoint(&["progress", &media.filename]);
        let request = self.http.get(url).timeout(self.status_timeout);
        self.fetch(request, self.status_timeout).await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // new() 已拒绝无法作为 base 的地址
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn fetch(&self, request: reqwest::RequestBuilder, timeout: Duration) -> JobStatus {
        match self.send(request, timeout).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Watchdog request failed: {}", e);
                JobStatus::failed(&e)
            }
        }
    }

    /// 发送请求并解析响应
    ///
    /// # 错误
    /// - 超时: `TimedOut`
    /// - 连接失败: `Network`
    /// - 非 2xx (404 除外): `Http`
    /// - 响应体无法解析: `Malformed`
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<JobStatus, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::TimedOut(timeout.as_millis() as u64)
            } else {
                FetchError::Network(e.to_string())
            }
        };

        // 1. 发送请求
        let response = request.send().await.map_err(classify)?;
        let code = response.status();

        // 2. 检查状态码，404 表示任务尚未开始，不算错误
        if code == StatusCode::NOT_FOUND {
            debug!("Watchdog has no job for {}", response.url());
            return Ok(JobStatus::not_started());
        }
        if !code.is_success() {
            return Err(FetchError::Http(code.as_u16()));
        }

        // 3. 读取并解析响应体
        let body = response.bytes().await.map_err(classify)?;
        JobStatus::from_json(&body)
    }
}

impl StatusSource for StatusClient {
    async fn check_status(&self, media: &MediaRef) -> JobStatus {
        StatusClient::check_status(self, media).await
    }

    async fn trigger_upscale(&self, media: &MediaRef) -> JobStatus {
        StatusClient::trigger_upscale(self, media).await
    }

    /// 先查状态，任务未结束时再合并进度详情
    async fn poll_status(&self, media: &MediaRef) -> JobStatus {
        let status = StatusClient::check_status(self, media).await;
        match status.state {
            JobState::Streaming | JobState::Finalizing | JobState::NotStarted => {
                let progress = self.fetch_progress(media).await;
                status.merge_progress(&progress)
            }
            JobState::Ready | JobState::Error => status,
        }
    }
}
