use crate::client::StatusSource;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::media::MediaRef;
use crate::overlay::{Notice, OverlaySink};
use crate::presenter::{self, ViewModel};
use crate::scheduler::{PollScheduler, PollTarget, Tick, TickControl};
use crate::status::{JobState, JobStatus};
use crate::switcher::{HostKind, ResumePoint, SegmentedEngine, StreamSwitcher, VideoElement};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 监控状态机阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    Idle,
    AwaitingInitialCheck,
    Triggering,
    Polling,
    AwaitingUserConfirm,
    AutoSwitching,
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// 开始播放时升频文件已存在
    AlreadyUpscaled,
    Switched,
    /// 播放中途完成，下次播放使用
    ReadyForNextPlayback,
    GaveUp,
    Errored,
    Unsupported,
    Stopped,
}

/// 单次播放的监控会话
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSession {
    pub media: MediaRef,
    pub generation: u64,
    pub attempt_count: u32,
    pub last_status: Option<JobStatus>,
    /// 从播放开始直到确认视频真正播放 (或收到终态)
    pub is_loading_phase: bool,
    pub cancelled: bool,
    pub consecutive_errors: u32,
    pub pending_switch_url: Option<String>,
}

impl MonitorSession {
    fn new(media: MediaRef, generation: u64) -> Self {
        Self {
            media,
            generation,
            attempt_count: 0,
            last_status: None,
            is_loading_phase: true,
            cancelled: false,
            consecutive_errors: 0,
            pending_switch_url: None,
        }
    }
}

/// `getCurrentStatus` 的返回值
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub phase: MonitorPhase,
    pub session: Option<MonitorSession>,
    pub polling: bool,
    pub max_attempts: u32,
    pub last_outcome: Option<SessionOutcome>,
    pub last_view: Option<ViewModel>,
    pub playback_host: HostKind,
}

#[derive(Debug, Clone, Copy)]
enum StatusOrigin {
    Trigger,
    Poll(Tick),
}

struct MonitorState {
    phase: MonitorPhase,
    session: Option<MonitorSession>,
    scheduler: PollScheduler,
    next_generation: u64,
    /// 最近一次绘制浮层的会话代数
    overlay_owner: u64,
    dismiss: Option<JoinHandle<()>>,
    last_outcome: Option<SessionOutcome>,
    last_view: Option<ViewModel>,
}

impl MonitorState {
    fn live_session(&mut self, generation: u64) -> Option<&mut MonitorSession> {
        self.session
            .as_mut()
            .filter(|s| s.generation == generation && !s.cancelled)
    }

    fn cancel_dismiss(&mut self) {
        if let Some(handle) = self.dismiss.take() {
            handle.abort();
        }
    }
}

struct Shared<S> {
    config: MonitorConfig,
    source: S,
    overlay: Arc<dyn OverlaySink>,
    element: Arc<dyn VideoElement>,
    switcher: StreamSwitcher,
    state: Mutex<MonitorState>,
}

/// 播放监控器
///
/// 监听播放开始/停止信号，驱动状态查询、轮询、进度渲染和流切换。
/// 所有状态都在一把锁内修改，锁不会跨越 `.await` 持有；
/// 每个异步结果在写入前都会核对会话代数，过期结果直接丢弃。
pub struct PlaybackMonitor<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for PlaybackMonitor<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: StatusSource> PlaybackMonitor<S> {
    pub fn new(
        config: MonitorConfig,
        source: S,
        overlay: Arc<dyn OverlaySink>,
        element: Arc<dyn VideoElement>,
        engine: Option<Arc<dyn SegmentedEngine>>,
    ) -> Self {
        let switcher = StreamSwitcher::new(engine, element.as_ref());
        let state = MonitorState {
            phase: MonitorPhase::Idle,
            session: None,
            scheduler: PollScheduler::new(),
            next_generation: 0,
            overlay_owner: 0,
            dismiss: None,
            last_outcome: None,
            last_view: None,
        };

        Self {
            shared: Arc::new(Shared {
                config,
                source,
                overlay,
                element,
                switcher,
                state: Mutex::new(state),
            }),
        }
    }

    /// 播放开始
    ///
    /// 调用时立即取代旧会话 (取消轮询、重置状态、显示加载中)，
    /// 返回的 future 负责初始检查和触发升频，完成后返回当前阶段。
    ///
    /// # 流程
    /// - 升频文件已存在：直接回到 Idle，不触发、不轮询
    /// - 否则触发升频，按轮询结果处理触发响应，需要时开始轮询
    pub fn start_monitoring(&self, path: &str) -> impl Future<Output = MonitorPhase> + Send + 'static {
        let generation = self.shared.begin_session(MediaRef::new(path));
        let shared = self.shared.clone();
        async move { shared.run_startup(generation).await }
    }

    /// 播放停止，任何阶段都立即回到 Idle
    ///
    /// 返回时轮询已取消，之后完成的请求结果都会被丢弃
    pub fn stop_monitoring(&self) -> bool {
        self.shared.stop()
    }

    /// 用户确认切换到升频流
    pub fn confirm_switch(&self) -> Result<ResumePoint, MonitorError> {
        self.shared.confirm_switch()
    }

    /// 视频已真正开始播放，结束加载状态
    pub fn video_playing(&self) {
        self.shared.video_playing()
    }

    pub fn current_status(&self) -> MonitorStatus {
        let state = self.shared.lock();
        MonitorStatus {
            phase: state.phase,
            session: state.session.clone(),
            polling: state.scheduler.is_active(),
            max_attempts: self.shared.config.max_attempts,
            last_outcome: state.last_outcome,
            last_view: state.last_view.clone(),
            playback_host: self.shared.switcher.host().kind(),
        }
    }
}

impl<S: StatusSource> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_session(&self, media: MediaRef) -> u64 {
        let mut state = self.lock();
        state.scheduler.cancel();
        state.cancel_dismiss();
        if let Some(mut old) = state.session.take() {
            old.cancelled = true;
            info!(
                "Monitor [{}] superseded by [{}]",
                old.media.filename, media.filename
            );
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        info!("Monitor [{}] playback started: {}", media.filename, media.path);

        state.session = Some(MonitorSession::new(media, generation));
        state.phase = MonitorPhase::AwaitingInitialCheck;
        state.overlay_owner = generation;
        state.last_outcome = None;

        if self.config.loading_shown_immediately {
            self.show(&mut state, ViewModel::preparing());
        } else {
            state.last_view = None;
            self.overlay.reset();
        }
        generation
    }

    async fn run_startup(self: Arc<Self>, generation: u64) -> MonitorPhase {
        let Some(media) = self.session_media(generation) else {
            return self.phase();
        };

        // 1. 检查升频文件是否已经存在
        let initial = self.source.check_status(&media).await;
        if !self.after_initial_check(generation, initial) {
            return self.phase();
        }

        // 2. 触发升频，响应与轮询结果走同一处理路径
        let triggered = self.source.trigger_upscale(&media).await;
        let accepted = triggered.state != JobState::Error;
        if self.apply_status(generation, triggered, StatusOrigin::Trigger) == TickControl::Continue {
            // 3. 开始轮询
            self.start_polling(generation, accepted);
        }
        self.phase()
    }

    fn phase(&self) -> MonitorPhase {
        self.lock().phase
    }

    fn session_media(&self, generation: u64) -> Option<MediaRef> {
        self.lock().live_session(generation).map(|s| s.media.clone())
    }

    fn after_initial_check(&self, generation: u64, status: JobStatus) -> bool {
        let mut state = self.lock();
        let Some(session) = state.live_session(generation) else {
            debug!("Discarding initial check for superseded session #{}", generation);
            return false;
        };

        let ready = status.state == JobState::Ready;
        session.last_status = Some(status);
        if ready {
            info!(
                "Monitor [{}] upscaled version already exists",
                session.media.filename
            );
            self.finish(&mut state, SessionOutcome::AlreadyUpscaled);
            return false;
        }

        state.phase = MonitorPhase::Triggering;
        true
    }

    /// `announce` 为 true 时提示用户升频已开始
    fn start_polling(self: &Arc<Self>, generation: u64, announce: bool) {
        let mut state = self.lock();
        let Some(session) = state.live_session(generation) else {
            return;
        };
        let filename = session.media.filename.clone();

        state.phase = MonitorPhase::Polling;
        let ticker = SessionTicker {
            shared: Arc::downgrade(self),
            session: generation,
        };
        let schedule = state.scheduler.start(
            ticker,
            self.config.poll_interval(),
            self.config.max_attempts,
        );
        debug!("Monitor [{}] polling with schedule #{}", filename, schedule);

        if announce {
            self.overlay.notify(Notice::info(
                "Starting 4K upscaling... Stream will be available in ~15 seconds",
            ));
        }
    }

    async fn poll_once(self: Arc<Self>, generation: u64, tick: Tick) -> TickControl {
        let Some(media) = self.session_media(generation) else {
            return TickControl::Stop;
        };
        let status = self.source.poll_status(&media).await;
        self.apply_status(generation, status, StatusOrigin::Poll(tick))
    }

    /// 处理一次状态结果 (触发响应或轮询结果)
    ///
    /// 返回 `Stop` 表示不再需要轮询
    fn apply_status(
        self: &Arc<Self>,
        generation: u64,
        status: JobStatus,
        origin: StatusOrigin,
    ) -> TickControl {
        let min_segments = self.config.min_segments_to_switch;
        let mut state = self.lock();
        let Some(session) = state.live_session(generation) else {
            debug!(
                "Discarding {:?} result for superseded session #{}",
                status.state, generation
            );
            return TickControl::Stop;
        };
        let filename = session.media.filename.clone();

        if status.state == JobState::Ready {
            if let StatusOrigin::Trigger = origin {
                info!("Monitor [{}] using existing upscaled file", filename);
                session.last_status = Some(status);
                self.finish(&mut state, SessionOutcome::AlreadyUpscaled);
                return TickControl::Stop;
            }
            session.is_loading_phase = false;
        }

        if let StatusOrigin::Poll(tick) = origin {
            session.attempt_count = tick.attempt;
            debug!(
                "Monitor [{}] poll {}/{} (schedule #{}): {:?} {:.1}% ({} segments)",
                filename,
                tick.attempt,
                tick.max_attempts,
                tick.generation,
                status.state,
                status.progress_percent,
                status.segment_count
            );
        }
        // 只有轮询结果计入连续错误，触发响应不占用轮询次数
        match (origin, status.state) {
            (StatusOrigin::Poll(_), JobState::Error) if !status.is_transient_failure() => {
                session.consecutive_errors += 1
            }
            (_, JobState::Error) => {}
            _ => session.consecutive_errors = 0,
        }

        let view = presenter::render(
            session.last_status.as_ref(),
            &status,
            session.is_loading_phase,
            min_segments,
        );
        session.last_status = Some(status.clone());
        let consecutive_errors = session.consecutive_errors;

        state.overlay_owner = generation;
        if view.auto_dismiss {
            self.schedule_dismiss(&mut state, generation);
        }
        self.show(&mut state, view);

        if status.state == JobState::Ready {
            info!("Monitor [{}] final upscaled file is ready", filename);
            self.finish(&mut state, SessionOutcome::ReadyForNextPlayback);
            return TickControl::Stop;
        }

        if status.state == JobState::Error && consecutive_errors > self.config.error_tolerance {
            warn!(
                "Monitor [{}] watchdog failed {} times in a row: {}",
                filename,
                consecutive_errors,
                status.message.as_deref().unwrap_or("unknown error")
            );
            self.finish(&mut state, SessionOutcome::Errored);
            return TickControl::Stop;
        }

        let Some(url) = status
            .stream_url
            .clone()
            .filter(|_| status.is_switchable(min_segments))
        else {
            return TickControl::Continue;
        };

        info!(
            "Monitor [{}] upscaled stream available with {} segments",
            filename, status.segment_count
        );
        if self.config.auto_switch {
            state.phase = MonitorPhase::AutoSwitching;
            let outcome = match self.switcher.switch(&url, &self.element) {
                Ok(_) => SessionOutcome::Switched,
                Err(_) => SessionOutcome::Unsupported,
            };
            self.finish(&mut state, outcome);
        } else {
            // 等待用户确认，期间不再轮询
            state.scheduler.cancel();
            if let Some(session) = state.live_session(generation) {
                session.pending_switch_url = Some(url);
            }
            state.phase = MonitorPhase::AwaitingUserConfirm;
            self.overlay
                .notify(Notice::info("4K upscaled stream is now available!"));
        }
        TickControl::Stop
    }

    fn gave_up(&self, generation: u64, tick: Tick) {
        let mut state = self.lock();
        let Some(session) = state.live_session(generation) else {
            return;
        };
        session.attempt_count = tick.attempt;
        info!(
            "Monitor [{}] max attempts ({}) reached, stopping monitor",
            session.media.filename, tick.max_attempts
        );
        self.finish(&mut state, SessionOutcome::GaveUp);
    }

    fn confirm_switch(&self) -> Result<ResumePoint, MonitorError> {
        let mut state = self.lock();
        if state.phase != MonitorPhase::AwaitingUserConfirm {
            return Err(MonitorError::NothingPending);
        }
        let url = state
            .session
            .as_ref()
            .filter(|s| !s.cancelled)
            .and_then(|s| s.pending_switch_url.clone())
            .ok_or(MonitorError::NothingPending)?;

        match self.switcher.switch(&url, &self.element) {
            Ok(resume) => {
                self.finish(&mut state, SessionOutcome::Switched);
                Ok(resume)
            }
            Err(e) => {
                self.finish(&mut state, SessionOutcome::Unsupported);
                Err(e.into())
            }
        }
    }

    fn video_playing(&self) {
        let min_segments = self.config.min_segments_to_switch;
        let mut state = self.lock();
        let Some(session) = state.session.as_mut().filter(|s| !s.cancelled) else {
            return;
        };
        if !session.is_loading_phase {
            return;
        }

        session.is_loading_phase = false;
        info!("Monitor [{}] video playback confirmed", session.media.filename);
        let view = session
            .last_status
            .as_ref()
            .map(|last| presenter::render(Some(last), last, false, min_segments));
        if let Some(view) = view {
            self.show(&mut state, view);
        }
    }

    fn show(&self, state: &mut MonitorState, view: ViewModel) {
        self.overlay.show(&view);
        state.last_view = Some(view);
    }

    fn stop(&self) -> bool {
        let mut state = self.lock();
        state.cancel_dismiss();
        match &state.session {
            Some(session) => {
                info!("Monitor [{}] playback stopped", session.media.filename);
                self.finish(&mut state, SessionOutcome::Stopped);
                true
            }
            None => {
                state.scheduler.cancel();
                state.last_view = None;
                self.overlay.reset();
                false
            }
        }
    }

    /// 结束当前会话并回到 Idle
    ///
    /// # 副作用
    /// - 取消轮询
    /// - 按结果弹出提示、隐藏浮层 (升频完成时浮层保留，交给自动隐藏)
    fn finish(&self, state: &mut MonitorState, outcome: SessionOutcome) {
        state.scheduler.cancel();
        if let Some(mut session) = state.session.take() {
            session.cancelled = true;
            debug!("Monitor [{}] finished: {:?}", session.media.filename, outcome);
        }
        state.phase = MonitorPhase::Idle;
        state.last_outcome = Some(outcome);

        let notice = match outcome {
            SessionOutcome::AlreadyUpscaled | SessionOutcome::Stopped => None,
            SessionOutcome::Switched => Some(Notice::success("Switched to 4K upscaled stream!")),
            SessionOutcome::ReadyForNextPlayback => {
                Some(Notice::info("Upscaled version is ready for next playback"))
            }
            SessionOutcome::GaveUp => Some(Notice::info(
                "Upscaled stream not available, continuing with original",
            )),
            SessionOutcome::Errored => Some(Notice::info(
                "Upscaling service unavailable, continuing with original",
            )),
            SessionOutcome::Unsupported => {
                Some(Notice::error("HLS playback not supported in this browser"))
            }
        };
        if let Some(notice) = notice {
            self.overlay.notify(notice);
        }
        if outcome != SessionOutcome::ReadyForNextPlayback {
            state.cancel_dismiss();
            state.last_view = None;
            self.overlay.reset();
        }
    }

    fn schedule_dismiss(self: &Arc<Self>, state: &mut MonitorState, generation: u64) {
        let Some(delay) = self.config.auto_hide_delay() else {
            return;
        };
        state.cancel_dismiss();

        let shared = Arc::downgrade(self);
        state.dismiss = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut state = shared.lock();
            if state.overlay_owner == generation {
                debug!("Auto-hiding overlay of session #{}", generation);
                shared.overlay.hide();
                state.dismiss = None;
            }
        }));
    }
}

/// 轮询回调，只持有监控器的弱引用
struct SessionTicker<S> {
    shared: Weak<Shared<S>>,
    session: u64,
}

impl<S: StatusSource> PollTarget for SessionTicker<S> {
    async fn on_tick(&self, tick: Tick) -> TickControl {
        match self.shared.upgrade() {
            Some(shared) => shared.poll_once(self.session, tick).await,
            None => TickControl::Stop,
        }
    }

    fn on_gave_up(&self, tick: Tick) {
        if let Some(shared) = self.shared.upgrade() {
            shared.gave_up(self.session, tick);
        }
    }
}
