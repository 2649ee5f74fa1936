use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed rejection-reason taxonomy. Every `rejected` event and every
/// persisted `rejectionReason` counter uses one of these strings — nothing
/// else is ever written to the wire or to storage.
///
/// A few variants (`FuzzyMatchLegacy`, `ExactNameDuplicate`) are no longer
/// produced by current engine logic but are kept so the history API can
/// still render reasons recorded by earlier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ExactMatch,
    /// Legacy fuzzy-match reason, superseded by the more specific variants below.
    FuzzyMatchLegacy,
    CacheHit,
    LlmDuplicate,
    NearDuplicate,
    UrlNearDuplicate,
    SubdomainDuplicate,
    UrlResolutionDuplicate,
    ExactUrlDuplicate,
    NormalizedTitleDuplicate,
    EntityFuzzyMatch,
    EntityVeryHighSimilarity,
    EntityLlmDuplicate,
    HighSimilarityMatch,
    /// Internal bookkeeping value, never emitted on the wire as a rejection.
    CompanyDecision,
    ExactNameDuplicate,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::FuzzyMatchLegacy => "fuzzy_match",
            Self::CacheHit => "cache_hit",
            Self::LlmDuplicate => "llm_duplicate",
            Self::NearDuplicate => "near_duplicate",
            Self::UrlNearDuplicate => "url_near_duplicate",
            Self::SubdomainDuplicate => "subdomain_duplicate",
            Self::UrlResolutionDuplicate => "url_resolution_duplicate",
            Self::ExactUrlDuplicate => "exact_url_duplicate",
            Self::NormalizedTitleDuplicate => "normalized_title_duplicate",
            Self::EntityFuzzyMatch => "entity_fuzzy_match",
            Self::EntityVeryHighSimilarity => "entity_very_high_similarity",
            Self::EntityLlmDuplicate => "entity_llm_duplicate",
            Self::HighSimilarityMatch => "high_similarity_match",
            Self::CompanyDecision => "company_decision",
            Self::ExactNameDuplicate => "exact_name_duplicate",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "exact_match" => Self::ExactMatch,
            "fuzzy_match" => Self::FuzzyMatchLegacy,
            "cache_hit" => Self::CacheHit,
            "llm_duplicate" => Self::LlmDuplicate,
            "near_duplicate" => Self::NearDuplicate,
            "url_near_duplicate" => Self::UrlNearDuplicate,
            "subdomain_duplicate" => Self::SubdomainDuplicate,
            "url_resolution_duplicate" => Self::UrlResolutionDuplicate,
            "exact_url_duplicate" => Self::ExactUrlDuplicate,
            "normalized_title_duplicate" => Self::NormalizedTitleDuplicate,
            "entity_fuzzy_match" => Self::EntityFuzzyMatch,
            "entity_very_high_similarity" => Self::EntityVeryHighSimilarity,
            "entity_llm_duplicate" => Self::EntityLlmDuplicate,
            "high_similarity_match" => Self::HighSimilarityMatch,
            "company_decision" => Self::CompanyDecision,
            "exact_name_duplicate" => Self::ExactNameDuplicate,
            other => return Err(format!("unknown rejection reason: {other}")),
        })
    }
}
