//! Subscription registry and frame fan-out
//!
//! The registry tracks every attached reader and delivers each extracted
//! frame to all of them. Every subscription owns a single-slot queue, so the
//! capture loop never waits on a slow reader.
//!
//! # Architecture
//!
//! ```text
//!                     SubscriptionRegistry
//!               ┌─────────────────────────────┐
//!               │ entries: HashMap<Id,        │
//!               │   FrameSender (watch::Tx)   │
//!               │ >                           │
//!               └──────────────┬──────────────┘
//!                              │ fan_out(&frame)
//!         ┌────────────────────┼────────────────────┐
//!         ▼                    ▼                    ▼
//!   FrameReceiver        FrameReceiver        FrameReceiver
//!   recv().await         recv().await         recv().await
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` is reference counted, so every subscriber shares the same
//! immutable allocation for a frame. Nothing mutable crosses a slot.

pub mod error;
pub mod frame;
pub mod slot;
pub mod store;

pub use error::RegistryError;
pub use frame::{Frame, SubscriptionId, END_MARKER, START_MARKER};
pub use slot::FrameReceiver;
pub use store::{FanOut, SubscriptionRegistry};
