use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 一次轮询的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 发起本次轮询的调度代数
    pub generation: u64,
    /// 第几次轮询 (从 1 开始)
    pub attempt: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// 轮询目标
pub trait PollTarget: Send + Sync + 'static {
    fn on_tick(&self, tick: Tick) -> impl Future<Output = TickControl> + Send;

    /// 轮询次数耗尽时调用，每个调度最多一次
    fn on_gave_up(&self, tick: Tick);
}

struct ActivePoll {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// 单飞轮询调度器
///
/// 任何时刻最多只有一个轮询任务。每个任务都带有代数标记，
/// `start` 或 `cancel` 会推进代数，旧任务在执行下一次轮询前发现代数不符即退出。
pub struct PollScheduler {
    current: Arc<AtomicU64>,
    active: Option<ActivePoll>,
}

impl PollScheduler {
    pub fn new() -> Self {
        Self {
            current: Arc::new(AtomicU64::new(0)),
            active: None,
        }
    }

    /// 启动新的轮询，先取消已有的调度
    ///
    /// 第一次轮询立即执行，之后按固定间隔执行
    pub fn start<T: PollTarget>(&mut self, target: T, interval: Duration, max_attempts: u32) -> u64 {
        self.cancel();

        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(
            target,
            generation,
            self.current.clone(),
            interval,
            max_attempts.max(1),
            cancel.clone(),
        ));

        debug!(
            "Poll schedule #{} started ({:?} interval, {} attempts)",
            generation, interval, max_attempts
        );
        self.active = Some(ActivePoll {
            generation,
            cancel,
            handle,
        });
        generation
    }

    /// 取消当前调度，可重复调用
    ///
    /// 返回后不会再有新的轮询开始执行
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };

        let _ = self.current.compare_exchange(
            active.generation,
            active.generation + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        active.cancel.cancel();
        active.handle.abort();
        debug!("Poll schedule #{} cancelled", active.generation);
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| self.is_current(a.generation) && !a.handle.is_finished())
    }

    pub fn generation(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_schedule<T: PollTarget>(
    target: T,
    generation: u64,
    current: Arc<AtomicU64>,
    period: Duration,
    max_attempts: u32,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempt = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        // 已被新调度取代
        if current.load(Ordering::SeqCst) != generation {
            break;
        }

        attempt += 1;
        let tick = Tick {
            generation,
            attempt,
            max_attempts,
        };
        let control = tokio::select! {
            _ = cancel.cancelled() => break,
            control = target.on_tick(tick) => control,
        };
        if control == TickControl::Stop {
            break;
        }

        if attempt >= max_attempts {
            // 只有仍是当前代数时才上报放弃，避免与 cancel 竞争
            let retired = current
                .compare_exchange(generation, generation + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if retired {
                info!("Poll schedule #{} exhausted {} attempts. Giving up.", generation, attempt);
                target.on_gave_up(tick);
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[derive(Clone, Default)]
    struct Counter {
        ticks: Arc<AtomicU32>,
        gave_up: Arc<AtomicU32>,
        stop_at: Option<u32>,
    }

    impl PollTarget for Counter {
        async fn on_tick(&self, tick: Tick) -> TickControl {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            match self.stop_at {
                Some(n) if tick.attempt >= n => TickControl::Stop,
                _ => TickControl::Continue,
            }
        }

        fn on_gave_up(&self, _tick: Tick) {
            self.gave_up.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate() {
        let counter = Counter::default();
        let mut scheduler = PollScheduler::new();
        scheduler.start(counter.clone(), secs(2), 30);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(secs(2)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 2);
        assert!(scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_once_after_max_attempts() {
        let counter = Counter::default();
        let mut scheduler = PollScheduler::new();
        scheduler.start(counter.clone(), secs(2), 3);

        tokio::time::sleep(secs(30)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 3);
        assert_eq!(counter.gave_up.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_leaves_one_live_schedule() {
        let first = Counter::default();
        let second = Counter::default();
        let mut scheduler = PollScheduler::new();

        let g1 = scheduler.start(first.clone(), secs(2), 30);
        tokio::time::sleep(secs(3)).await;
        let first_ticks = first.ticks.load(Ordering::SeqCst);
        assert_eq!(first_ticks, 2);

        let g2 = scheduler.start(second.clone(), secs(2), 30);
        tokio::time::sleep(secs(9)).await;

        assert!(g2 > g1);
        assert!(!scheduler.is_current(g1));
        assert_eq!(first.ticks.load(Ordering::SeqCst), first_ticks);
        assert_eq!(second.ticks.load(Ordering::SeqCst), 5);
        assert_eq!(first.gave_up.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let counter = Counter::default();
        let mut scheduler = PollScheduler::new();
        scheduler.start(counter.clone(), secs(2), 30);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(scheduler.cancel());
        let generation = scheduler.generation();
        for _ in 0..5 {
            assert!(!scheduler.cancel());
        }
        assert_eq!(scheduler.generation(), generation);
        assert!(!scheduler.is_active());

        tokio::time::sleep(secs(20)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 1);
        assert_eq!(counter.gave_up.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_control_ends_schedule() {
        let counter = Counter {
            stop_at: Some(2),
            ..Counter::default()
        };
        let mut scheduler = PollScheduler::new();
        scheduler.start(counter.clone(), secs(1), 30);

        tokio::time::sleep(secs(10)).await;
        assert_eq!(counter.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(counter.gave_up.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_active());
    }

    #[test]
    fn cancel_without_runtime_is_noop() {
        let mut scheduler = PollScheduler::new();
        assert!(!scheduler.cancel());
        assert!(!scheduler.is_active());
    }
}
