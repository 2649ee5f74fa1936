//! The ingestion controller (§4.7-§4.8): the upstream webset client trait,
//! per-job poll loop, and the default in-memory [`PersistenceAdapter`].

pub mod controller;
pub mod memory_store;
pub mod upstream;

pub use controller::{IngestionController, JobContext};
pub use memory_store::InMemoryStore;
pub use upstream::{ExaUpstreamClient, ListPage, UpstreamClient, UpstreamStatus, WebsetRequest, PAGE_SIZE};
