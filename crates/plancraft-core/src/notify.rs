//! Transient, self-clearing user notices.
//!
//! Holds at most one message. Each new message replaces the previous one and
//! restarts the clear timer. Distinct from the session `error`, which persists
//! until the next stage transition.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

/// Kind of transient notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Feature acknowledged but not yet available
    ComingSoon,
    /// Non-fatal advisory
    Advisory,
    /// Confirmation toast
    Toast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn coming_soon(label: &str) -> Self {
        Self {
            kind: NoticeKind::ComingSoon,
            message: format!("{} is coming soon", label),
        }
    }

    pub fn advisory(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Advisory,
            message: message.into(),
        }
    }

    pub fn toast(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Toast,
            message: message.into(),
        }
    }
}

#[derive(Default)]
struct Slot {
    current: Option<Notice>,
    /// Bumped on every post so an outdated timer never clears a newer notice
    seq: u64,
    timer: Option<JoinHandle<()>>,
    closed: bool,
}

/// Single-slot notice channel with auto-clear.
///
/// Must be used from within a Tokio runtime.
#[derive(Clone)]
pub struct NotificationChannel {
    slot: Arc<Mutex<Slot>>,
    ttl: Duration,
}

impl NotificationChannel {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Show a notice, replacing any current one and restarting the clear timer.
    pub fn post(&self, notice: Notice) {
        let mut slot = self.lock();
        if slot.closed {
            tracing::debug!(message = %notice.message, "Notice posted after close, dropping");
            return;
        }

        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.seq += 1;
        let seq = slot.seq;
        slot.current = Some(notice);

        let weak = Arc::downgrade(&self.slot);
        let ttl = self.ttl;
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(slot) = weak.upgrade() {
                let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
                if slot.seq == seq {
                    slot.current = None;
                    slot.timer = None;
                }
            }
        }));
    }

    /// Shorthand for a "coming soon" acknowledgement.
    pub fn coming_soon(&self, label: &str) {
        self.post(Notice::coming_soon(label));
    }

    pub fn current(&self) -> Option<Notice> {
        self.lock().current.clone()
    }

    /// Clear the current notice immediately.
    pub fn dismiss(&self) {
        let mut slot = self.lock();
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.current = None;
    }

    /// Tear down: cancel the pending timer and refuse further notices.
    pub fn close(&self) {
        let mut slot = self.lock();
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        slot.current = None;
        slot.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
