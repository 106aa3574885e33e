//! Identity types shared across the runtime.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a sandbox instance.
///
/// Every service declares the sandbox that owns it; the sandbox refuses to
/// register a service whose owner is a different id.
///
/// # Examples
///
/// ```rust
/// use scarlet_core::SandboxId;
///
/// let id = SandboxId::new();
/// let parsed = SandboxId::from_str(&id.to_string()).unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxId(pub Uuid);

impl SandboxId {
    /// Creates a new random sandbox id using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a sandbox id from its string representation.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for SandboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SandboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
