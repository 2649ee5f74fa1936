use thiserror::Error;

/// The internal error taxonomy from spec §7. Most variants are absorbed
/// locally (logged, treated as empty/default) so a single item or LLM
/// batch never takes the whole job down; only `UpstreamFatal` and
/// `Validation` are meant to surface to a caller.
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upstream transient error: {0}")]
    UpstreamTransient(String),

    #[error("Upstream fatal error: {0}")]
    UpstreamFatal(String),

    #[error("Vector service error: {0}")]
    VectorTransient(String),

    #[error("LLM transport error: {0}")]
    LlmTransient(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
