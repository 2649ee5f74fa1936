//! The dedup engine (§4.1-§4.6, §4.10): canonicalization, the fingerprint
//! table and entity bulletproof layer, the fuzzy matcher, the candidate
//! pool builder, the LLM batch adjudicator, and the pending registry,
//! composed by [`engine::DedupEngine`] into one per-item state machine.

pub mod candidate_pool;
pub mod canonicalize;
pub mod engine;
pub mod fingerprint;
pub mod fuzzy;
pub mod llm_adjudicator;
pub mod normalize_title;
pub mod pending;

pub use canonicalize::canonicalize;
pub use engine::DedupEngine;
pub use fuzzy::{classify, DuplicateRule, FuzzyVerdict};
pub use llm_adjudicator::{LlmAdjudicator, LlmClient, Verdict, LLM_BATCH, LLM_LAT_MS};
pub use normalize_title::normalize_title;
pub use pending::PendingRegistry;
