use serde::{Deserialize, Serialize};

/// What [`EventBus::publish`](super::EventBus::publish) does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferFullPolicy {
    /// Drop the event and return `Ok(false)`.
    #[default]
    DropEvent,
    /// Back off and retry up to `spin_wait_max_count` times, then drop.
    WaitForSpace,
    /// Return `Err(EventError::QueueFull)`.
    Reject,
}

/// Tuning knobs for an [`EventBus`](super::EventBus).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub buffer_size: usize,
    pub max_handlers_per_event: usize,
    pub max_events_per_update: usize,
    pub spin_wait_max_count: u32,
    pub buffer_full_policy: BufferFullPolicy,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            max_handlers_per_event: 32,
            max_events_per_update: 128,
            spin_wait_max_count: 10,
            buffer_full_policy: BufferFullPolicy::DropEvent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_names_are_snake_case() {
        let json = serde_json::to_string(&BufferFullPolicy::WaitForSpace).unwrap();
        assert_eq!(json, "\"wait_for_space\"");

        let parsed: EventBusConfig =
            serde_json::from_str(r#"{"buffer_full_policy":"reject","buffer_size":8}"#).unwrap();
        assert_eq!(parsed.buffer_full_policy, BufferFullPolicy::Reject);
        assert_eq!(parsed.buffer_size, 8);
        assert_eq!(parsed.max_events_per_update, 128);
    }
}
