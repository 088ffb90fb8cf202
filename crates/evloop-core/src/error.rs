//! evloop error types.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The selection key was cancelled by another actor (channel closed,
    /// selector shut down) while it was being used.
    #[error("selection key cancelled")]
    CancelledKey,
    /// The selector is closed and accepts no new registrations.
    #[error("selector closed")]
    SelectorClosed,
    /// Task executor is shut down or its queue is full.
    #[error("task executor unavailable")]
    ExecutorUnavailable,
    /// Operation on a context that is already closed.
    #[error("context closed")]
    Closed,
}

impl NetError {
    /// Benign cancellation: the registration raced a concurrent close.
    ///
    /// Callers absorb these locally (log + close) instead of surfacing them.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NetError::CancelledKey | NetError::SelectorClosed)
    }
}

pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", NetError::CancelledKey), "selection key cancelled");
        let e = NetError::from(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(format!("{}", e), "I/O error: boom");
    }

    #[test]
    fn test_classification() {
        assert!(NetError::CancelledKey.is_cancelled());
        assert!(NetError::SelectorClosed.is_cancelled());
        assert!(!NetError::Closed.is_cancelled());

        let wb: NetError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(!wb.is_cancelled());
        assert!(!NetError::ExecutorUnavailable.is_cancelled());
    }
}
