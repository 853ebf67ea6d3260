use crate::presenter::ViewModel;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// 通知保留条数
const NOTICE_HISTORY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// 非阻塞提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// 进度浮层的写入端
///
/// 监控器在持有自身锁时调用，实现中不得回调监控器
pub trait OverlaySink: Send + Sync {
    fn show(&self, view: &ViewModel);
    /// 暂时隐藏，保留画面 (快捷键可再次显示)
    fn hide(&self);
    /// 会话结束: 隐藏并清除画面
    fn reset(&self);
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OverlaySnapshot {
    pub visible: bool,
    pub view: Option<ViewModel>,
    pub notices: Vec<Notice>,
}

#[derive(Default)]
struct BoardState {
    visible: bool,
    view: Option<ViewModel>,
    notices: VecDeque<Notice>,
}

/// 共享浮层状态，由宿主页面通过 `/monitor/status` 读取
#[derive(Default)]
pub struct OverlayBoard {
    inner: Mutex<BoardState>,
}

impl OverlayBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        let board = self.lock();
        OverlaySnapshot {
            visible: board.visible,
            view: board.view.clone(),
            notices: board.notices.iter().cloned().collect(),
        }
    }

    /// 快捷键切换浮层显示 (仅在已有画面时才能显示)
    pub fn toggle(&self) -> bool {
        let mut board = self.lock();
        board.visible = !board.visible && board.view.is_some();
        board.visible
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OverlaySink for OverlayBoard {
    fn show(&self, view: &ViewModel) {
        let mut board = self.lock();
        board.view = Some(view.clone());
        board.visible = true;
    }

    fn hide(&self) {
        self.lock().visible = false;
    }

    fn reset(&self) {
        let mut board = self.lock();
        board.visible = false;
        board.view = None;
    }

    fn notify(&self, notice: Notice) {
        let mut board = self.lock();
        if board.notices.len() == NOTICE_HISTORY {
            board.notices.pop_front();
        }
        board.notices.push_back(notice);
    }
}
