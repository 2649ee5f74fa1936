use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reason::RejectionReason;

/// Whether a job dedups people/titles ("entity" — movies, shows, people) or
/// organizations ("company" — businesses, brands). The two modes share the
/// engine's fingerprint table and candidate-pool machinery but disagree on
/// thresholds, bulletproof layers, and prompt shape (§4.1-§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    Entity,
    Company,
}

/// Raw record as it arrives from the upstream webset provider. `properties`
/// is an arbitrary JSON object — the canonicalizer tolerates absence of any
/// specific field within it (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "serde_json::Value::default")]
    pub properties: serde_json::Value,
}

/// Subdomain classification used by the Tier-0 key and the fuzzy matcher's
/// subdomain-similarity rule (§3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubdomainClass {
    Generic,
    Other,
}

/// Derived view of a raw [`Item`], computed exclusively at ingestion time
/// and used by every matching rule downstream (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub row_id: String,
    pub name: String,
    pub url: String,
    pub host: String,
    pub etld1: String,
    pub brand: String,
    pub sub_cls: SubdomainClass,
    pub is_video_platform: bool,
    pub raw: Item,
}

impl CanonicalRow {
    /// `brand:etld1:subCls`, or `video:<name-slug>` for video platforms so
    /// distinct titles on the same platform are never collapsed (§3).
    pub fn tier0_key(&self) -> String {
        if self.is_video_platform {
            format!("video:{}", crate::slugify(&self.name))
        } else {
            let sub_cls = match self.sub_cls {
                SubdomainClass::Generic => "generic",
                SubdomainClass::Other => "other",
            };
            format!("{}:{}:{}", self.brand, self.etld1, sub_cls)
        }
    }
}

/// One side of a [`PendingDecision::Pair`] — a lightweight projection used
/// when building LLM prompts, so the adjudicator never needs the full
/// [`CanonicalRow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRef {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Candidate projection carrying brand/etld1, used by company-mode prompts
/// that reason about business identity rather than just name similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyCandidateRef {
    pub id: String,
    pub name: String,
    pub url: String,
    pub brand: String,
    pub etld1: String,
}

/// A row awaiting LLM adjudication. The tag dispatches both prompt
/// construction and verdict-to-action mapping in the adjudicator (§3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PendingDecision {
    Pair {
        job_id: String,
        id_a: String,
        name_a: String,
        url_a: String,
        id_b: String,
        name_b: String,
        url_b: String,
        raw_a: Box<Item>,
    },
    Entity {
        job_id: String,
        id_new: String,
        name_new: String,
        url_new: String,
        candidates: Vec<CandidateRef>,
        raw_new: Box<Item>,
    },
    Company {
        job_id: String,
        id_new: String,
        name_new: String,
        url_new: String,
        brand_new: String,
        etld1_new: String,
        candidates: Vec<CompanyCandidateRef>,
        raw_new: Box<Item>,
    },
}

impl PendingDecision {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Pair { job_id, .. } => job_id,
            Self::Entity { job_id, .. } => job_id,
            Self::Company { job_id, .. } => job_id,
        }
    }

    /// The `tmpId` a `pending`/`confirm`/`drop` triple is correlated by —
    /// always the id of the new row under adjudication.
    pub fn tmp_id(&self) -> &str {
        match self {
            Self::Pair { id_b, .. } => id_b,
            Self::Entity { id_new, .. } => id_new,
            Self::Company { id_new, .. } => id_new,
        }
    }
}

/// Lifecycle status of a [`Job`] (§4.10's per-job state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Active,
    Processing,
    ProcessingItems,
    Completed,
    Error,
}

/// One ingestion run: created on job submission, mutated by the ingestion
/// controller and persistence adapter, terminal once the upstream goes
/// idle or a fatal error occurs (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub original_query: String,
    #[serde(default)]
    pub entity_type: Option<String>,
    pub status: JobStatus,
    pub total_items: u64,
    pub unique_items: u64,
    pub duplicates_rejected: u64,
    #[serde(default)]
    pub rejection_reasons: HashMap<String, u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, original_query: impl Into<String>, entity_type: Option<String>) -> Self {
        Self {
            job_id: job_id.into(),
            original_query: original_query.into(),
            entity_type,
            status: JobStatus::Active,
            total_items: 0,
            unique_items: 0,
            duplicates_rejected: 0,
            rejection_reasons: HashMap::new(),
            created_at: Utc::now(),
            completed_at: None,
            error_message: None,
            next_cursor: None,
        }
    }

    pub fn mode(&self) -> DedupMode {
        if self.entity_type.is_some() {
            DedupMode::Entity
        } else {
            DedupMode::Company
        }
    }
}

/// Disposition of a persisted [`ItemRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Accepted,
    Rejected,
    Pending,
}

/// Durable record of one item's outcome within a job (§3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub job_id: String,
    pub item_id: String,
    pub name: String,
    pub url: String,
    pub properties: serde_json::Value,
    pub raw_data: serde_json::Value,
    pub status: ItemStatus,
    #[serde(default)]
    pub rejected_by: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<RejectionReason>,
    #[serde(default)]
    pub rejection_details: Option<String>,
    #[serde(default)]
    pub normalized_title: Option<String>,
    #[serde(default)]
    pub similarity: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A globally-unique id minted for rows that arrive without a usable
/// upstream id (§3: "equals source id when present, otherwise newly minted
/// UUID").
pub fn new_row_id() -> String {
    Uuid::new_v4().to_string()
}
