//! The dedup engine orchestrator (§4.2-§4.6, §4.10): one instance per job,
//! wiring together the fingerprint table, the entity bulletproof layer, the
//! fuzzy matcher, the candidate pool builder, the LLM adjudicator, and the
//! pending registry into the per-item state machine `arrived → pending? →
//! {accepted | rejected}`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dedup_common::{
    CanonicalRow, CounterOutcome, DedupMode, Item, ItemRecord, ItemStatus, PendingDecision,
    PersistenceAdapter, RejectionReason,
};
use dedup_events::{Bus, EventFrame};
use dedup_vector::{UrlResolver, VectorClient};
use tokio::sync::{Mutex, RwLock};

use crate::candidate_pool::{build_pool, to_candidate_refs, to_company_candidate_refs, PoolOutcome};
use crate::canonicalize::canonicalize;
use crate::fingerprint::{EntityBulletproofIndex, FingerprintTable};
use crate::fuzzy::{classify, DuplicateRule, FuzzyVerdict};
use crate::llm_adjudicator::LlmAdjudicator;
use crate::pending::PendingRegistry;

/// Candidates recalled per new row from the vector service (§4.4's "vector
/// recall hits"); the spec names no specific value, this mirrors the
/// candidate pool's own top-5 cap with headroom for filtering.
const VECTOR_RECALL_K: usize = 10;

/// Per-job dedup engine. Holds every piece of state §5 says is job-scoped —
/// no cross-job sharing.
pub struct DedupEngine {
    job_id: String,
    mode: DedupMode,
    fingerprint: RwLock<FingerprintTable>,
    bulletproof: RwLock<EntityBulletproofIndex>,
    pending: Mutex<PendingRegistry>,
    processed_ids: Mutex<HashSet<String>>,
    llm: Arc<LlmAdjudicator>,
    vector: Arc<VectorClient>,
    url_resolver: Option<Arc<UrlResolver>>,
    enable_url_resolution: bool,
    bus: Bus,
    persistence: Arc<dyn PersistenceAdapter>,
    processed_items: AtomicU64,
    rejected_items: AtomicU64,
    /// `ENABLE_DEDUP=false` (§6): every item is accepted without touching
    /// the fingerprint table, fuzzy matcher, or LLM adjudicator.
    dedup_enabled: bool,
}

impl DedupEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: impl Into<String>,
        mode: DedupMode,
        llm: Arc<LlmAdjudicator>,
        vector: Arc<VectorClient>,
        url_resolver: Option<Arc<UrlResolver>>,
        enable_url_resolution: bool,
        bus: Bus,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        Self::with_dedup_enabled(job_id, mode, llm, vector, url_resolver, enable_url_resolution, bus, persistence, true)
    }

    /// Same as [`DedupEngine::new`] but lets the caller toggle the core off
    /// entirely (§6 `ENABLE_DEDUP`) — used by the API crate's job wiring.
    #[allow(clippy::too_many_arguments)]
    pub fn with_dedup_enabled(
        job_id: impl Into<String>,
        mode: DedupMode,
        llm: Arc<LlmAdjudicator>,
        vector: Arc<VectorClient>,
        url_resolver: Option<Arc<UrlResolver>>,
        enable_url_resolution: bool,
        bus: Bus,
        persistence: Arc<dyn PersistenceAdapter>,
        dedup_enabled: bool,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            mode,
            fingerprint: RwLock::new(FingerprintTable::new()),
            bulletproof: RwLock::new(EntityBulletproofIndex::new()),
            pending: Mutex::new(PendingRegistry::new()),
            processed_ids: Mutex::new(HashSet::new()),
            llm,
            vector,
            url_resolver,
            enable_url_resolution,
            bus,
            persistence,
            processed_items: AtomicU64::new(0),
            rejected_items: AtomicU64::new(0),
            dedup_enabled,
        }
    }

    pub fn processed_items(&self) -> u64 {
        self.processed_items.load(Ordering::Relaxed)
    }

    pub fn rejected_items(&self) -> u64 {
        self.rejected_items.load(Ordering::Relaxed)
    }

    /// True once every `pending` this engine has emitted has resolved — the
    /// controller consults this before marking the job `completed` (§4.10).
    pub async fn is_settled(&self) -> bool {
        self.pending.lock().await.is_settled()
    }

    /// Drive one raw item through the full pipeline. Idempotent per job
    /// (I2, L2): re-ingesting an already-seen item id is a silent no-op.
    pub async fn process_item(&self, item: Item) {
        {
            let mut seen = self.processed_ids.lock().await;
            if !seen.insert(item.id.clone()) {
                return;
            }
        }

        let row = canonicalize(&item, self.mode);

        if !self.dedup_enabled {
            self.accept(&item, row, None).await;
            return;
        }

        if self.mode == DedupMode::Company {
            let key = row.tier0_key();
            let existing = self.fingerprint.read().await.get(&key).cloned();
            if let Some(existing) = existing {
                self.reject(
                    &item,
                    RejectionReason::ExactMatch,
                    format!("exact fingerprint match on tier-0 key {key}"),
                    Some(existing.row_id),
                )
                .await;
                return;
            }
        }

        if self.mode == DedupMode::Entity {
            let bp = self.bulletproof.read().await;
            if let Some(existing_id) = bp.url_match(&row.url) {
                let existing_id = existing_id.to_string();
                drop(bp);
                self.reject(
                    &item,
                    RejectionReason::ExactUrlDuplicate,
                    "exact URL already accepted in this job".to_string(),
                    Some(existing_id),
                )
                .await;
                return;
            }
            if let Some(existing_id) = bp.title_match(&row.name) {
                let existing_id = existing_id.to_string();
                drop(bp);
                self.reject(
                    &item,
                    RejectionReason::NormalizedTitleDuplicate,
                    "normalized title already accepted in this job".to_string(),
                    Some(existing_id),
                )
                .await;
                return;
            }
        }

        let (immediate, ambiguous) = self.run_fuzzy_matcher(&row).await;
        if let Some((existing, rule)) = immediate {
            let reason = duplicate_reason(rule, self.mode);
            let details = format!("fuzzy rule {rule:?} matched existing row {}", existing.row_id);
            self.reject(&item, reason, details, Some(existing.row_id)).await;
            return;
        }

        if self.mode == DedupMode::Company && self.enable_url_resolution {
            if let Some(resolver) = self.url_resolver.clone() {
                if let Some((existing_id, reason, details)) =
                    check_url_resolution(&row, &ambiguous, &resolver).await
                {
                    self.reject(&item, reason, details, Some(existing_id)).await;
                    return;
                }
            }
        }

        let vector_rows = self.recall_vector_candidates(&row).await;
        let ambiguous_ids: HashSet<String> = ambiguous.iter().map(|r| r.row_id.clone()).collect();

        match build_pool(&row, ambiguous, vector_rows, self.mode) {
            PoolOutcome::Accept => {
                self.accept(&item, row, None).await;
            }
            PoolOutcome::ImmediateReject { existing_row_id, similarity } => {
                let reason = if self.mode == DedupMode::Entity {
                    if ambiguous_ids.contains(&existing_row_id) {
                        RejectionReason::EntityVeryHighSimilarity
                    } else {
                        RejectionReason::HighSimilarityMatch
                    }
                } else {
                    RejectionReason::NearDuplicate
                };
                let details = format!("similarity {similarity:.2} to existing row {existing_row_id}");
                self.reject(&item, reason, details, Some(existing_row_id)).await;
            }
            PoolOutcome::Queue(candidates) => {
                if let Some(existing_id) = self.cache_hit(&row, &candidates) {
                    self.reject(
                        &item,
                        RejectionReason::CacheHit,
                        "host pair previously judged duplicate".to_string(),
                        Some(existing_id),
                    )
                    .await;
                    return;
                }

                let tmp_id = row.row_id.clone();
                self.pending.lock().await.mark_pending(&tmp_id);
                self.bus
                    .publish(&self.job_id, EventFrame::Pending { tmp_id: tmp_id.clone() })
                    .await;

                let decision = match self.mode {
                    DedupMode::Entity => PendingDecision::Entity {
                        job_id: self.job_id.clone(),
                        id_new: row.row_id.clone(),
                        name_new: row.name.clone(),
                        url_new: row.url.clone(),
                        candidates: to_candidate_refs(&candidates),
                        raw_new: Box::new(item.clone()),
                    },
                    DedupMode::Company => PendingDecision::Company {
                        job_id: self.job_id.clone(),
                        id_new: row.row_id.clone(),
                        name_new: row.name.clone(),
                        url_new: row.url.clone(),
                        brand_new: row.brand.clone(),
                        etld1_new: row.etld1.clone(),
                        candidates: to_company_candidate_refs(&candidates),
                        raw_new: Box::new(item.clone()),
                    },
                };

                let verdict = self.llm.enqueue(decision).await;
                self.pending.lock().await.resolve(&tmp_id);

                if verdict.is_duplicate {
                    let reason = if self.mode == DedupMode::Entity {
                        RejectionReason::EntityLlmDuplicate
                    } else {
                        RejectionReason::LlmDuplicate
                    };
                    self.reject(
                        &item,
                        reason,
                        "LLM adjudicator judged this a duplicate".to_string(),
                        verdict.matched_row_id,
                    )
                    .await;
                    self.bus.publish(&self.job_id, EventFrame::Drop { tmp_id }).await;
                } else {
                    self.accept(&item, row, Some(tmp_id)).await;
                }
            }
        }
    }

    /// Run the fuzzy matcher against every currently accepted row. Returns
    /// the first `Duplicate` found (§4.3 rules fire in order per pair, and
    /// the first matching existing row wins across the table) plus the full
    /// set of rows classified `Ambiguous`.
    async fn run_fuzzy_matcher(&self, row: &CanonicalRow) -> (Option<(CanonicalRow, DuplicateRule)>, Vec<CanonicalRow>) {
        let table = self.fingerprint.read().await;
        let mut ambiguous = Vec::new();
        for existing in table.values() {
            match classify(row, existing, self.mode) {
                FuzzyVerdict::Duplicate(rule) => return (Some((existing.clone(), rule)), ambiguous),
                FuzzyVerdict::Ambiguous => ambiguous.push(existing.clone()),
                FuzzyVerdict::Unique => {}
            }
        }
        (None, ambiguous)
    }

    async fn recall_vector_candidates(&self, row: &CanonicalRow) -> Vec<CanonicalRow> {
        let text = format!("{} {}", row.name, row.url).trim().to_string();
        if text.is_empty() {
            return Vec::new();
        }
        let hit_ids = self.vector.query_or_empty(&text, VECTOR_RECALL_K).await;
        if hit_ids.is_empty() {
            return Vec::new();
        }
        let hits: HashSet<&str> = hit_ids.iter().map(String::as_str).collect();
        self.fingerprint
            .read()
            .await
            .values()
            .filter(|r| hits.contains(r.row_id.as_str()))
            .cloned()
            .collect()
    }

    /// Short-circuit an ambiguous row against the LLM cache (§4.5): a
    /// previously-confirmed-duplicate host pair is rejected without another
    /// LLM call.
    fn cache_hit(&self, row: &CanonicalRow, candidates: &[crate::candidate_pool::ScoredCandidate]) -> Option<String> {
        let new_host = host_of(&row.url)?;
        for candidate in candidates {
            if let Some(candidate_host) = host_of(&candidate.row.url) {
                if self.llm.cache_lookup(&new_host, &candidate_host) == Some(true) {
                    return Some(candidate.row.row_id.clone());
                }
            }
        }
        None
    }

    async fn accept(&self, item: &Item, row: CanonicalRow, confirm_tmp_id: Option<String>) {
        let row_id = row.row_id.clone();
        let name = row.name.clone();
        let url = row.url.clone();

        self.fingerprint.write().await.insert(row.clone());
        if self.mode == DedupMode::Entity {
            self.bulletproof.write().await.record(&row);
        }

        let text = format!("{name} {url}").trim().to_string();
        if !text.is_empty() {
            match self.mode {
                DedupMode::Entity => {
                    // Awaited: the next item in this job must see the new row
                    // in the vector index before it is checked (§4.6, §5).
                    self.vector.add_best_effort(&row_id, &text).await;
                }
                DedupMode::Company => {
                    let vector = Arc::clone(&self.vector);
                    let row_id = row_id.clone();
                    tokio::spawn(async move {
                        vector.add_best_effort(&row_id, &text).await;
                    });
                }
            }
        }

        let record = ItemRecord {
            job_id: self.job_id.clone(),
            item_id: item.id.clone(),
            name: row.name.clone(),
            url: row.url.clone(),
            properties: item.properties.clone(),
            raw_data: serde_json::to_value(item).unwrap_or(serde_json::Value::Null),
            status: ItemStatus::Accepted,
            rejected_by: None,
            rejection_reason: None,
            rejection_details: None,
            normalized_title: if self.mode == DedupMode::Entity {
                Some(crate::normalize_title::normalize_title(&row.name))
            } else {
                None
            },
            similarity: None,
            created_at: chrono::Utc::now(),
        };
        if let Err(err) = self.persistence.record_item(record).await {
            tracing::warn!(job_id = %self.job_id, item_id = %item.id, error = %err, "failed to persist accepted item");
        }
        if let Err(err) = self
            .persistence
            .increment_counters(&self.job_id, CounterOutcome::Accepted)
            .await
        {
            tracing::warn!(job_id = %self.job_id, error = %err, "failed to increment accepted counters");
        }

        match confirm_tmp_id {
            Some(_) => {
                self.bus
                    .publish(&self.job_id, EventFrame::Confirm { data: item.clone() })
                    .await;
            }
            None => {
                self.bus
                    .publish(&self.job_id, EventFrame::Item { item: item.clone() })
                    .await;
                self.processed_items.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn reject(
        &self,
        item: &Item,
        reason: RejectionReason,
        details: String,
        existing_item: Option<String>,
    ) {
        self.bus
            .publish(
                &self.job_id,
                EventFrame::Rejected {
                    item: item.clone(),
                    reason,
                    details: details.clone(),
                    existing_item: existing_item.clone(),
                },
            )
            .await;
        self.rejected_items.fetch_add(1, Ordering::Relaxed);

        let record = ItemRecord {
            job_id: self.job_id.clone(),
            item_id: item.id.clone(),
            name: item.name.clone().or_else(|| item.title.clone()).unwrap_or_default(),
            url: item.url.clone().unwrap_or_default(),
            properties: item.properties.clone(),
            raw_data: serde_json::to_value(item).unwrap_or(serde_json::Value::Null),
            status: ItemStatus::Rejected,
            rejected_by: existing_item,
            rejection_reason: Some(reason),
            rejection_details: Some(details),
            normalized_title: None,
            similarity: None,
            created_at: chrono::Utc::now(),
        };
        if let Err(err) = self.persistence.record_item(record).await {
            tracing::warn!(job_id = %self.job_id, item_id = %item.id, error = %err, "failed to persist rejected item");
        }
        if let Err(err) = self
            .persistence
            .increment_counters(&self.job_id, CounterOutcome::Rejected { reason })
            .await
        {
            tracing::warn!(job_id = %self.job_id, error = %err, "failed to increment rejected counters");
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Map a fuzzy-matcher rule that fired `Duplicate` to a wire rejection
/// reason. Entity mode funnels every rule-based duplicate through the single
/// `entity_fuzzy_match` reason; company mode distinguishes the
/// subdomain-specific rule from the rest (§7 taxonomy).
fn duplicate_reason(rule: DuplicateRule, mode: DedupMode) -> RejectionReason {
    if mode == DedupMode::Entity {
        return RejectionReason::EntityFuzzyMatch;
    }
    match rule {
        DuplicateRule::SubdomainSimilarity => RejectionReason::SubdomainDuplicate,
        DuplicateRule::VideoTitleMatch
        | DuplicateRule::SameBrandDifferentDomain
        | DuplicateRule::NameSimilarity => RejectionReason::NearDuplicate,
    }
}

/// Company-mode HEAD-based URL canonicalization check (§5/§9 "suspicious
/// pairs", `ENABLE_URL_RESOLUTION`): resolve the new row's URL and each
/// fuzzy-ambiguous candidate's URL and compare the canonical forms. An exact
/// match after resolution is a stronger signal than raw-string similarity
/// (redirects collapse `http`/`https`, trailing slashes, tracking params);
/// a close-but-not-exact match is reported as `url_near_duplicate`.
async fn check_url_resolution(
    new_row: &CanonicalRow,
    ambiguous: &[CanonicalRow],
    resolver: &UrlResolver,
) -> Option<(String, RejectionReason, String)> {
    if new_row.url.is_empty() || ambiguous.is_empty() {
        return None;
    }
    let resolved_new = resolver.resolve(&new_row.url).await?;
    let normalized_new = resolved_new.trim_end_matches('/');

    for candidate in ambiguous {
        if candidate.url.is_empty() {
            continue;
        }
        let Some(resolved_existing) = resolver.resolve(&candidate.url).await else {
            continue;
        };
        let normalized_existing = resolved_existing.trim_end_matches('/');

        if normalized_new.eq_ignore_ascii_case(normalized_existing) {
            return Some((
                candidate.row_id.clone(),
                RejectionReason::UrlResolutionDuplicate,
                format!("resolved URL {normalized_new} matches existing row {}", candidate.row_id),
            ));
        }

        let similarity = strsim::jaro_winkler(&normalized_new.to_lowercase(), &normalized_existing.to_lowercase());
        if similarity > 0.92 {
            return Some((
                candidate.row_id.clone(),
                RejectionReason::UrlNearDuplicate,
                format!("resolved URL is a near match (similarity {similarity:.2}) to existing row {}", candidate.row_id),
            ));
        }
    }
    None
}
