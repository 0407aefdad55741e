//! Transient, non-blocking notifications ("toasts") for cart actions.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// How long a toast stays on screen.
pub const TOAST_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

impl ToastKind {
    /// CSS modifier class for the toast element.
    #[must_use]
    pub const fn css_class(&self) -> &'static str {
        match self {
            Self::Success => "toast--success",
            Self::Error => "toast--error",
            Self::Info => "toast--info",
        }
    }
}

/// A notification to show briefly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub duration: Duration,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Info, message)
    }

    fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            duration: TOAST_DURATION,
        }
    }
}

/// Somewhere to show toasts.
pub trait Toaster: Send + Sync {
    fn show(&self, toast: Toast);
}

/// Writes toasts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogToaster;

impl Toaster for LogToaster {
    fn show(&self, toast: Toast) {
        match toast.kind {
            ToastKind::Error => tracing::warn!(message = %toast.message, "toast"),
            ToastKind::Success | ToastKind::Info => tracing::info!(message = %toast.message, "toast"),
        }
    }
}

/// Collects toasts until drained; the page shell pops them from here.
#[derive(Debug, Default)]
pub struct ToastQueue {
    pending: Mutex<Vec<Toast>>,
}

impl ToastQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued toast, oldest first.
    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Toaster for ToastQueue {
    fn show(&self, toast: Toast) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(toast);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_drains_in_order() {
        let queue = ToastQueue::new();
        queue.show(Toast::success("Added"));
        queue.show(Toast::error("Failed"));
        assert_eq!(queue.len(), 2);

        let toasts = queue.drain();
        assert_eq!(toasts.first().map(|t| t.kind), Some(ToastKind::Success));
        assert_eq!(toasts.last().map(|t| t.message.as_str()), Some("Failed"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_toast_defaults() {
        let toast = Toast::info("Hi");
        assert_eq!(toast.duration, TOAST_DURATION);
        assert_eq!(toast.kind.css_class(), "toast--info");
    }
}
