//! Provider-agnostic single-turn chat completion client.
//!
//! Both [`claude::Claude`] and [`openai::OpenAi`] expose the same
//! `chat_completion(system, user) -> Result<String>` shape so a caller (the
//! dedup engine's LLM adjudicator, in particular) can be written against
//! either provider.

pub mod claude;
pub mod openai;
pub mod util;

pub use claude::Claude;
pub use openai::OpenAi;
