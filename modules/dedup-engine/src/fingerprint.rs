//! Per-job Fingerprint Table (§4.2) plus the entity-mode "bulletproof"
//! exact-match indices (§9 glossary) that short-circuit duplicate detection
//! before fuzzy matching ever runs.

use std::collections::HashMap;

use dedup_common::CanonicalRow;

use crate::normalize_title::normalize_title;

/// Tier-0-Key → accepted row (§3, I1: at most one row per key).
#[derive(Debug, Default)]
pub struct FingerprintTable {
    rows: HashMap<String, CanonicalRow>,
}

impl FingerprintTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tier0_key: &str) -> Option<&CanonicalRow> {
        self.rows.get(tier0_key)
    }

    /// Insert an accepted row under its Tier-0 key. Overwriting would
    /// violate I1 for a caller that skipped the tier-0 check — callers must
    /// always `get` first.
    pub fn insert(&mut self, row: CanonicalRow) {
        self.rows.insert(row.tier0_key(), row);
    }

    pub fn values(&self) -> impl Iterator<Item = &CanonicalRow> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Entity-mode exact-match indices over accepted rows (§3): the
/// Processed-URL Set and Processed-Normalized-Title Map. Checked before
/// fuzzy matching so an exact resubmission never depends on Jaro-Winkler
/// thresholds.
#[derive(Debug, Default)]
pub struct EntityBulletproofIndex {
    urls: HashMap<String, String>,
    normalized_titles: HashMap<String, String>,
}

impl EntityBulletproofIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accepted row id with an identical non-empty URL, if any.
    pub fn url_match(&self, url: &str) -> Option<&str> {
        if url.is_empty() {
            return None;
        }
        self.urls.get(url).map(String::as_str)
    }

    /// Returns the accepted row id with an identical non-empty normalized
    /// title, if any.
    pub fn title_match(&self, name: &str) -> Option<&str> {
        let key = normalize_title(name);
        if key.is_empty() {
            return None;
        }
        self.normalized_titles.get(&key).map(String::as_str)
    }

    pub fn record(&mut self, row: &CanonicalRow) {
        if !row.url.is_empty() {
            self.urls.insert(row.url.clone(), row.row_id.clone());
        }
        let key = normalize_title(&row.name);
        if !key.is_empty() {
            self.normalized_titles.insert(key, row.row_id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_common::{Item, SubdomainClass};

    fn row(id: &str, name: &str, url: &str) -> CanonicalRow {
        CanonicalRow {
            row_id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            host: "example.com".into(),
            etld1: "example.com".into(),
            brand: "example".into(),
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
    fn fingerprint_table_holds_at_most_one_row_per_key() {
        let mut table = FingerprintTable::new();
        let r1 = row("a", "Acme", "https://acme.com");
        let key = r1.tier0_key();
        table.insert(r1);
        assert!(table.get(&key).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn bulletproof_index_finds_exact_url_match() {
        let mut idx = EntityBulletproofIndex::new();
        idx.record(&row("1", "District 9", "https://example.com/d9"));
        assert_eq!(idx.url_match("https://example.com/d9"), Some("1"));
        assert_eq!(idx.url_match("https://example.com/other"), None);
    }

    #[test]
    fn bulletproof_index_finds_normalized_title_match() {
        let mut idx = EntityBulletproofIndex::new();
        idx.record(&row("1", "District 9", "https://example.com/a"));
        assert_eq!(idx.title_match("District 9 (2009)"), Some("1"));
    }

    #[test]
    fn empty_url_and_name_never_match() {
        let idx = EntityBulletproofIndex::new();
        assert_eq!(idx.url_match(""), None);
        assert_eq!(idx.title_match(""), None);
    }

}
