//! Buffered, priority-ordered event bus.
//!
//! Publishing only enqueues; dispatch happens when the bus is updated, which
//! the sandbox does once per tick. See [`EventBus`] for the ordering rules.

mod bus;
mod config;
mod handlers;

pub use bus::{EventBus, EventBusStats};
pub use config::{BufferFullPolicy, EventBusConfig};
pub use handlers::{GameEvent, Handler};

/// Conventional priorities. Lower values run first; any `i32` is allowed.
pub struct EventPriority;

impl EventPriority {
    pub const HIGHEST: i32 = i32::MIN;
    pub const HIGH: i32 = -1000;
    pub const NORMAL: i32 = 0;
    pub const LOW: i32 = 1000;
    pub const LOWEST: i32 = i32::MAX;
}
