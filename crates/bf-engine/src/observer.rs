//! Synchronous update notifications for kernel state holders.
//!
//! Observers attach at setup time and are invoked from the consumer thread
//! immediately after the subject's state mutates, so they need no internal
//! locking.

/// The kinds of state changes a subject can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    MarketData,
    PositionUpdate,
    OrderUpdate,
    AccountUpdate,
}

/// Receiver of typed update notifications.
pub trait Observer: Send + Sync {
    fn notify(&mut self, kind: UpdateKind);
}
