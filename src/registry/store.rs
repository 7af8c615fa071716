//! Subscription registry implementation
//!
//! Maps subscription tokens to their delivery slots and fans frames out to
//! every registered slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::error::RegistryError;
use super::frame::{Frame, SubscriptionId};
use super::slot::{slot, FrameReceiver, FrameSender};

/// Outcome of delivering one frame to all subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Slots that accepted the frame
    pub delivered: usize,
    /// Slots whose reader is gone
    pub refused: usize,
}

struct Slots {
    /// Sender is `None` once the slot was closed by an ended capture run
    entries: HashMap<SubscriptionId, Option<FrameSender>>,
    /// Whether new subscriptions are accepted
    open: bool,
}

/// Registry of active subscriptions
///
/// Owned by one multiplexer instance. The capture task iterates it on every
/// frame while subscribers register and unregister concurrently; all critical
/// sections are short and synchronous, nothing awaits while holding the lock.
pub struct SubscriptionRegistry {
    slots: RwLock<Slots>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    /// Create an empty, open registry
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots {
                entries: HashMap::new(),
                open: true,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscription with a fresh single-slot queue
    pub fn register(&self) -> Result<(SubscriptionId, FrameReceiver), RegistryError> {
        let mut slots = self.slots.write();
        if !slots.open {
            return Err(RegistryError::Closed);
        }

        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = slot();
        slots.entries.insert(id, Some(tx));

        tracing::debug!(
            subscription = %id,
            subscribers = slots.entries.len(),
            "Subscription registered"
        );

        Ok((id, rx))
    }

    /// Remove a subscription
    ///
    /// Removing an id that is not registered is a caller bug and is reported
    /// as [`RegistryError::NotRegistered`].
    pub fn unregister(&self, id: SubscriptionId) -> Result<(), RegistryError> {
        let mut slots = self.slots.write();

        if slots.entries.remove(&id).is_none() {
            tracing::error!(subscription = %id, "Unregister of unknown subscription");
            return Err(RegistryError::NotRegistered(id));
        }

        tracing::debug!(
            subscription = %id,
            subscribers = slots.entries.len(),
            "Subscription removed"
        );

        Ok(())
    }

    /// Deliver a frame to every open slot without blocking
    ///
    /// A refused delivery only affects that one subscriber.
    pub fn fan_out(&self, frame: &Frame) -> FanOut {
        let slots = self.slots.read();
        let mut result = FanOut::default();

        for (id, sender) in slots.entries.iter() {
            let Some(sender) = sender else {
                continue;
            };

            if sender.offer(frame.clone()) {
                result.delivered += 1;
            } else {
                result.refused += 1;
                tracing::warn!(
                    subscription = %id,
                    sequence = frame.sequence(),
                    "Failed writing frame to subscriber"
                );
            }
        }

        result
    }

    /// Close every slot and refuse new registrations
    ///
    /// Readers drain their last frame and then observe end of stream.
    /// Subscriptions stay registered until they are released.
    pub fn close(&self) {
        let mut slots = self.slots.write();
        slots.open = false;
        for sender in slots.entries.values_mut() {
            sender.take();
        }
    }

    /// Accept registrations again (a fresh capture run is starting)
    pub fn reopen(&self) {
        self.slots.write().open = true;
    }

    /// Whether registrations are currently accepted
    pub fn is_open(&self) -> bool {
        self.slots.read().open
    }

    /// Whether `id` is currently registered
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.slots.read().entries.contains_key(&id)
    }

    /// Number of registered subscriptions
    pub fn len(&self) -> usize {
        self.slots.read().entries.len()
    }

    /// Whether no subscription is registered
    pub fn is_empty(&self) -> bool {
        self.slots.read().entries.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
