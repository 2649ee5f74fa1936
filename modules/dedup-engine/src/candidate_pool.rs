//! Candidate Pool Builder (§4.4): unions fuzzy-ambiguous matches with
//! vector-recall hits, ranks by composite similarity, and caps to top-K
//! before an ambiguous row is queued for LLM adjudication.

use dedup_common::{CandidateRef, CanonicalRow, CompanyCandidateRef, DedupMode};

use crate::normalize_title::normalize_title;

const COMPANY_SCORE_FLOOR: f64 = 0.3;
const COMPANY_TOP_K: usize = 5;

const ENTITY_IMMEDIATE_REJECT_THRESHOLD: f64 = 0.9;
const ENTITY_SCORE_FLOOR: f64 = 0.6;
const ENTITY_TOP_K: usize = 3;

/// What the candidate pool decided should happen to a new ambiguous row.
pub enum PoolOutcome {
    /// No candidate survived filtering — accept immediately.
    Accept,
    /// A candidate scored high enough to reject without an LLM call.
    ImmediateReject { existing_row_id: String, similarity: f64 },
    /// Queue these ranked candidates for LLM adjudication.
    Queue(Vec<ScoredCandidate>),
}

pub struct ScoredCandidate {
    pub row: CanonicalRow,
    pub score: f64,
}

/// Company-mode composite score (§4.4): `0.6·name_jw + 0.2·domain_eq +
/// 0.2·brand_eq`.
fn company_score(new: &CanonicalRow, existing: &CanonicalRow) -> f64 {
    let name_jw = strsim::jaro_winkler(&new.name.to_lowercase(), &existing.name.to_lowercase());
    let domain_eq = if !new.etld1.is_empty() && new.etld1 == existing.etld1 { 1.0 } else { 0.0 };
    let brand_eq = if !new.brand.is_empty() && new.brand == existing.brand { 1.0 } else { 0.0 };
    0.6 * name_jw + 0.2 * domain_eq + 0.2 * brand_eq
}

/// Entity-mode score is plain normalized-title similarity — the filter
/// thresholds already encode the rest of the ranking logic (§4.4).
fn entity_score(new: &CanonicalRow, existing: &CanonicalRow) -> f64 {
    strsim::jaro_winkler(&normalize_title(&new.name), &normalize_title(&existing.name))
}

/// Build the candidate pool for a new ambiguous row (§4.4). `ambiguous` are
/// accepted rows the fuzzy matcher classified as `Ambiguous` against `new`;
/// `vector_hits` are accepted rows recalled by the vector service and still
/// present in the fingerprint table. Rows are deduplicated by id.
pub fn build_pool(
    new: &CanonicalRow,
    ambiguous: Vec<CanonicalRow>,
    vector_hits: Vec<CanonicalRow>,
    mode: DedupMode,
) -> PoolOutcome {
    let mut seen = std::collections::HashSet::new();
    let mut union = Vec::new();
    for row in ambiguous.into_iter().chain(vector_hits.into_iter()) {
        if seen.insert(row.row_id.clone()) {
            union.push(row);
        }
    }

    match mode {
        DedupMode::Company => build_company_pool(new, union),
        DedupMode::Entity => build_entity_pool(new, union),
    }
}

fn build_company_pool(new: &CanonicalRow, union: Vec<CanonicalRow>) -> PoolOutcome {
    let mut scored: Vec<ScoredCandidate> = union
        .into_iter()
        .map(|row| {
            let score = company_score(new, &row);
            ScoredCandidate { row, score }
        })
        .filter(|c| c.score > COMPANY_SCORE_FLOOR)
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(COMPANY_TOP_K);

    if scored.is_empty() {
        PoolOutcome::Accept
    } else {
        PoolOutcome::Queue(scored)
    }
}

fn build_entity_pool(new: &CanonicalRow, union: Vec<CanonicalRow>) -> PoolOutcome {
    let mut scored: Vec<ScoredCandidate> = union
        .into_iter()
        .map(|row| {
            let score = entity_score(new, &row);
            ScoredCandidate { row, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(top) = scored.first() {
        if top.score > ENTITY_IMMEDIATE_REJECT_THRESHOLD {
            return PoolOutcome::ImmediateReject {
                existing_row_id: top.row.row_id.clone(),
                similarity: top.score,
            };
        }
    }

    let filtered: Vec<ScoredCandidate> = scored
        .into_iter()
        .filter(|c| c.score >= ENTITY_SCORE_FLOOR)
        .take(ENTITY_TOP_K)
        .collect();

    if filtered.is_empty() {
        PoolOutcome::Accept
    } else {
        PoolOutcome::Queue(filtered)
    }
}

pub fn to_candidate_refs(candidates: &[ScoredCandidate]) -> Vec<CandidateRef> {
    candidates
        .iter()
        .map(|c| CandidateRef {
            id: c.row.row_id.clone(),
            name: c.row.name.clone(),
            url: c.row.url.clone(),
        })
        .collect()
}

pub fn to_company_candidate_refs(candidates: &[ScoredCandidate]) -> Vec<CompanyCandidateRef> {
    candidates
        .iter()
        .map(|c| CompanyCandidateRef {
            id: c.row.row_id.clone(),
            name: c.row.name.clone(),
            url: c.row.url.clone(),
            brand: c.row.brand.clone(),
            etld1: c.row.etld1.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_common::{Item, SubdomainClass};

    fn row(id: &str, name: &str, url: &str, etld1: &str, brand: &str) -> CanonicalRow {
        CanonicalRow {
            row_id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            host: etld1.to_string(),
            etld1: etld1.to_string(),
            brand: brand.to_string(),
            sub_cls: SubdomainClass::Generic,
            is_video_platform: false,
            raw: Item {
                id: id.to_string(),
                url: Some(url.to_string()),
                name: Some(name.to_string()),
                title: None,
                source: None,
                properties: serde_json::Value::Null,
            },
        }
    }

    #[test]
    fn empty_pool_accepts_immediately() {
        let new = row("new", "Brand New Co", "https://new.com", "new.com", "new");
        match build_pool(&new, vec![], vec![], DedupMode::Company) {
            PoolOutcome::Accept => {}
            _ => panic!("expected Accept"),
        }
    }

    #[test]
    fn company_pool_drops_low_scoring_candidates() {
        let new = row("new", "Totally Different Name", "https://new.com", "new.com", "new");
        let existing = row("old", "Acme Corp", "https://acme.com", "acme.com", "acme");
        match build_pool(&new, vec![existing], vec![], DedupMode::Company) {
            PoolOutcome::Accept => {}
            _ => panic!("expected Accept when all candidates score ≤ 0.3"),
        }
    }

    #[test]
    fn company_pool_caps_to_top_five() {
        let new = row("new", "Acme", "https://acme-new.com", "acme-new.com", "acmenew");
        let candidates: Vec<CanonicalRow> = (0..8)
            .map(|i| row(&format!("old{i}"), "Acme", "https://acme.com", "acme.com", "acme"))
            .collect();
        match build_pool(&new, candidates, vec![], DedupMode::Company) {
            PoolOutcome::Queue(scored) => assert!(scored.len() <= 5),
            _ => panic!("expected Queue"),
        }
    }

    #[test]
    fn entity_pool_immediate_rejects_above_high_threshold() {
        let new = row("new", "District 9", "https://a.com/new", "a.com", "a");
        let existing = row("old", "District 9 (2009)", "https://a.com/old", "a.com", "a");
        match build_pool(&new, vec![existing], vec![], DedupMode::Entity) {
            PoolOutcome::ImmediateReject { existing_row_id, .. } => assert_eq!(existing_row_id, "old"),
            _ => panic!("expected ImmediateReject"),
        }
    }

    #[test]
    fn entity_pool_drops_candidates_below_floor() {
        let new = row("new", "District 9", "https://a.com/new", "a.com", "a");
        let existing = row("old", "Completely Unrelated Title Here", "https://b.com/old", "b.com", "b");
        match build_pool(&new, vec![existing], vec![], DedupMode::Entity) {
            PoolOutcome::Accept => {}
            _ => panic!("expected Accept when below entity score floor"),
        }
    }

    #[test]
    fn union_deduplicates_by_row_id() {
        let new = row("new", "Acme", "https://acme-new.com", "acme-new.com", "acmenew");
        let dup = row("old", "Acme", "https://acme.com", "acme.com", "acme");
        match build_pool(&new, vec![dup.clone()], vec![dup], DedupMode::Company) {
            PoolOutcome::Queue(scored) => assert_eq!(scored.len(), 1),
            _ => panic!("expected a single deduplicated candidate"),
        }
    }
}
