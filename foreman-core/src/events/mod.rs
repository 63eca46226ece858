//! Server-side eventing: the in-process pub/sub bus and the snapshot
//! change detector that feeds it.

pub mod bus;
pub mod change;

pub use bus::{BusEvent, EventBus, EventMeta, SubscriptionId};
pub use change::detect_changes;
