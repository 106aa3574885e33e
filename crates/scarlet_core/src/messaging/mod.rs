//! Message delivery between sandboxes.

mod retry;

pub use retry::{send_with_retry, MessageOperation, RetryPolicy, RetrySend, SendAction};

/// A message that can be handed to a send action.
pub trait CoreMessage: Send + Sync + 'static {
    /// Stable name of the message kind, used in logs.
    fn message_type(&self) -> &str;
}
