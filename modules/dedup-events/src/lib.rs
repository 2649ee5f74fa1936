//! Per-job, in-memory broadcast bus for the dedup pipeline's event stream.
//!
//! Deliberately not durable: there is no backing store, no replay across
//! process restarts, and no cross-job delivery. Each job owns one channel;
//! subscribers get `connected`, the job's `item` replay buffer, then the
//! live stream, matching §4.9/§8 (L4) of the ingestion design.

pub mod bus;
pub mod events;

pub use bus::{Bus, Subscription};
pub use events::EventFrame;
