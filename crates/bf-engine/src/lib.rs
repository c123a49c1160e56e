pub mod observer;
pub mod order_book;
pub mod portfolio;
pub mod order_manager;
pub mod broker;
pub mod ledger;
pub mod stats;
pub mod replay;
pub mod strategy;
pub mod controller;

pub use observer::*;
pub use order_book::*;
pub use portfolio::*;
pub use order_manager::*;
pub use broker::*;
pub use ledger::*;
pub use stats::*;
pub use replay::*;
pub use strategy::*;
pub use controller::*;

use parking_lot::RwLock;
use std::sync::Arc;

/// Shared handle used for the components read across the kernel.
///
/// Writes happen only on the consumer thread; the lock exists for the live
/// mode where adapters read concurrently.
pub type Shared<T> = Arc<RwLock<T>>;

pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}
