//! Per-item processing interface.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use super::job::Job;

/// Error returned by an item handler.
///
/// The core loop does not retry individual items: an error from the handler
/// aborts the invocation and fails the whole in-flight job. Handlers that
/// want per-item retries or skip-on-error semantics implement them
/// internally and return `Ok`.
#[derive(Debug, Clone)]
pub struct ItemError {
    message: String,
}

impl ItemError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ItemError {}

/// Result type for item processing.
pub type ItemResult = std::result::Result<(), ItemError>;

/// Context passed to the item handler for each item.
pub struct ItemContext<'a> {
    /// Handler identifier of the owning queue
    pub handler: &'a str,
    /// The job being processed (state as of this item)
    pub job: &'a Job,
    /// Zero-based position of the item in the payload
    pub index: u64,
}

/// The per-item processing capability.
///
/// Concrete job types implement this; the worker loop is generic over it.
///
/// # Example
///
/// ```rust,ignore
/// struct SendReminder;
///
/// #[async_trait]
/// impl ItemProcessor for SendReminder {
///     fn name(&self) -> &'static str {
///         "send_reminder"
///     }
///
///     async fn process(&self, item: &Value, ctx: &ItemContext<'_>) -> ItemResult {
///         let address = item["email"].as_str()
///             .ok_or_else(|| ItemError::new("item has no email"))?;
///         // deliver, then:
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Name of this processor, for logging and error messages.
    fn name(&self) -> &'static str;

    /// Process a single payload item.
    async fn process(&self, item: &Value, ctx: &ItemContext<'_>) -> ItemResult;
}
