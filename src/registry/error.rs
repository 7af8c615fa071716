//! Registry error types
//!
//! Error types for subscription registry operations.

use super::frame::SubscriptionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The subscription is not (or no longer) registered.
    ///
    /// Indicates a reader was released twice; the caller broke the handle
    /// contract.
    NotRegistered(SubscriptionId),
    /// The capture run feeding this registry has ended; no new
    /// subscriptions are accepted until a fresh run reopens it
    Closed,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::NotRegistered(id) => {
                write!(f, "Subscription {} is not registered (released twice?)", id)
            }
            RegistryError::Closed => write!(f, "Registry closed: capture stream ended"),
        }
    }
}

impl std::error::Error for RegistryError {}
