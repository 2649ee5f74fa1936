//! Deterministic duplicate/unique/ambiguous classification for a (new,
//! existing) pair of accepted rows (§4.3). Cheap rules run first and shed the
//! obvious cases; whatever is left over as `Ambiguous` feeds the candidate
//! pool and, eventually, the LLM.

use dedup_common::{CanonicalRow, DedupMode, SubdomainClass};

use crate::normalize_title::normalize_title;

/// Minimum brand length for the "same brand, different domain" rule (§4.3
/// rule 3) — brands of length ≤ 2 are too likely to collide by chance
/// (`"jd"`, `"hp"`) to carry matching weight on their own.
const MIN_BRAND_LEN_FOR_MATCH: usize = 2;

const VIDEO_DUPLICATE_THRESHOLD: f64 = 0.95;
const VIDEO_AMBIGUOUS_THRESHOLD: f64 = 0.85;
const BRAND_SAME_DOMAIN_NAME_THRESHOLD: f64 = 0.8;
const COMPANY_NAME_DUPLICATE_THRESHOLD: f64 = 0.95;
const ENTITY_NAME_DUPLICATE_THRESHOLD: f64 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyVerdict {
    Duplicate(DuplicateRule),
    Unique,
    Ambiguous,
}

/// Which §4.3 rule produced a `Duplicate` verdict — lets the caller pick the
/// right [`dedup_common::RejectionReason`] without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateRule {
    VideoTitleMatch,
    SubdomainSimilarity,
    SameBrandDifferentDomain,
    NameSimilarity,
}

/// Classify `new` against one already-accepted `existing` row (§4.3). Rules
/// are evaluated in the order the spec lists them; the first one that
/// fires wins.
pub fn classify(new: &CanonicalRow, existing: &CanonicalRow, mode: DedupMode) -> FuzzyVerdict {
    if new.is_video_platform && existing.is_video_platform {
        return classify_video_platform(new, existing);
    }

    if subdomains_are_similar(new, existing) {
        return match mode {
            DedupMode::Company => FuzzyVerdict::Duplicate(DuplicateRule::SubdomainSimilarity),
            DedupMode::Entity => classify_by_name(new, existing, mode),
        };
    }

    if !new.brand.is_empty()
        && new.brand == existing.brand
        && new.brand.len() > MIN_BRAND_LEN_FOR_MATCH
        && new.etld1 != existing.etld1
    {
        return classify_same_brand_different_domain(new, existing, mode);
    }

    if new.brand != existing.brand && new.etld1 != existing.etld1 {
        return FuzzyVerdict::Unique;
    }

    classify_by_name(new, existing, mode)
}

fn classify_video_platform(new: &CanonicalRow, existing: &CanonicalRow) -> FuzzyVerdict {
    let sim = strsim::jaro_winkler(&normalize_title(&new.name), &normalize_title(&existing.name));
    if sim > VIDEO_DUPLICATE_THRESHOLD {
        FuzzyVerdict::Duplicate(DuplicateRule::VideoTitleMatch)
    } else if sim > VIDEO_AMBIGUOUS_THRESHOLD {
        FuzzyVerdict::Ambiguous
    } else {
        FuzzyVerdict::Unique
    }
}

/// `_areSubdomainsSimilar` (§4.3 rule 2): same registrable domain, and either
/// both subdomains are generic, or one is generic and the other
/// organizational, or both are organizational.
fn subdomains_are_similar(new: &CanonicalRow, existing: &CanonicalRow) -> bool {
    if new.etld1.is_empty() || new.etld1 != existing.etld1 {
        return false;
    }
    matches!(
        (new.sub_cls, existing.sub_cls),
        (SubdomainClass::Generic, SubdomainClass::Generic)
            | (SubdomainClass::Generic, SubdomainClass::Other)
            | (SubdomainClass::Other, SubdomainClass::Generic)
            | (SubdomainClass::Other, SubdomainClass::Other)
    )
}

fn classify_same_brand_different_domain(
    new: &CanonicalRow,
    existing: &CanonicalRow,
    mode: DedupMode,
) -> FuzzyVerdict {
    let both_generic = new.sub_cls == SubdomainClass::Generic && existing.sub_cls == SubdomainClass::Generic;
    let both_specific = new.sub_cls == SubdomainClass::Other && existing.sub_cls == SubdomainClass::Other;

    if both_generic {
        return match mode {
            DedupMode::Company => FuzzyVerdict::Duplicate(DuplicateRule::SameBrandDifferentDomain),
            DedupMode::Entity => FuzzyVerdict::Ambiguous,
        };
    }

    if both_specific {
        let name_sim = strsim::jaro_winkler(&new.name.to_lowercase(), &existing.name.to_lowercase());
        return if name_sim > BRAND_SAME_DOMAIN_NAME_THRESHOLD {
            FuzzyVerdict::Duplicate(DuplicateRule::SameBrandDifferentDomain)
        } else {
            FuzzyVerdict::Ambiguous
        };
    }

    // Mixed generic/specific.
    FuzzyVerdict::Ambiguous
}

fn classify_by_name(new: &CanonicalRow, existing: &CanonicalRow, mode: DedupMode) -> FuzzyVerdict {
    let (sim, threshold) = match mode {
        DedupMode::Company => (
            strsim::jaro_winkler(&new.name.to_lowercase(), &existing.name.to_lowercase()),
            COMPANY_NAME_DUPLICATE_THRESHOLD,
        ),
        DedupMode::Entity => (
            strsim::jaro_winkler(&normalize_title(&new.name), &normalize_title(&existing.name)),
            ENTITY_NAME_DUPLICATE_THRESHOLD,
        ),
    };

    if sim > threshold {
        FuzzyVerdict::Duplicate(DuplicateRule::NameSimilarity)
    } else {
        FuzzyVerdict::Ambiguous
    }
}
