//! Raw item → [`CanonicalRow`] (§4.1). Pure and non-fatal: a malformed or
//! absent URL yields empty derived fields rather than an error (B1).

use dedup_common::{new_row_id, CanonicalRow, DedupMode, Item, SubdomainClass};

/// Subdomains treated as "anyone could be behind this" rather than a
/// specific organization — `www`, a bare apex, and common storefront/app
/// subdomains. Used by the Tier-0 key and the subdomain-similarity rule
/// (§3, §4.3).
const GENERIC_SUBDOMAINS: &[&str] = &["www", "app", "shop", "store", "m", "mobile", ""];

/// Registrable domains known to host many independently-titled videos —
/// Tier-0 keys them by title slug instead of brand/etld1 so distinct videos
/// on the same platform are never collapsed (§3).
const VIDEO_PLATFORMS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com", "dailymotion.com", "twitch.tv"];

/// Public suffixes that take two labels instead of one. Not a full public
/// suffix list — the taxonomy only needs "registrable domain" to be stable
/// and good enough for brand/etld1 grouping, not legally precise.
const TWO_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "co.jp", "co.kr", "com.au", "com.br", "com.cn", "co.in", "co.nz",
];

pub fn canonicalize(item: &Item, mode: DedupMode) -> CanonicalRow {
    let url = extract_url(item);
    let name = clean_name(&extract_name(item, mode, &url));
    let (host, etld1, brand, sub_cls, is_video_platform) = parse_host(&url);

    let row_id = if !item.id.is_empty() {
        item.id.clone()
    } else {
        new_row_id()
    };

    CanonicalRow {
        row_id,
        name,
        url,
        host,
        etld1,
        brand,
        sub_cls,
        is_video_platform,
        raw: item.clone(),
    }
}

fn extract_url(item: &Item) -> String {
    if let Some(u) = item.properties.get("url").and_then(|v| v.as_str()) {
        if !u.is_empty() {
            return u.to_string();
        }
    }
    if let Some(u) = item.url.as_deref() {
        if !u.is_empty() {
            return u.to_string();
        }
    }
    if let Some(u) = find_nested_field(&item.properties, &["url", "website"]) {
        return u;
    }
    if let Some(s) = item.source.as_deref() {
        if looks_like_url(s) {
            return s.to_string();
        }
    }
    String::new()
}

fn extract_name(item: &Item, mode: DedupMode, url: &str) -> String {
    let candidates: Vec<Option<&str>> = match mode {
        DedupMode::Entity => vec![
            item.title.as_deref(),
            item.name.as_deref(),
            item.properties.get("title").and_then(|v| v.as_str()),
            item.properties.get("name").and_then(|v| v.as_str()),
        ],
        DedupMode::Company => vec![
            item.name.as_deref(),
            item.title.as_deref(),
            item.properties.get("name").and_then(|v| v.as_str()),
            item.properties.get("title").and_then(|v| v.as_str()),
            item.properties
                .get("company")
                .and_then(|c| c.get("name"))
                .and_then(|v| v.as_str()),
        ],
    };

    for candidate in candidates {
        if let Some(s) = candidate {
            if !s.trim().is_empty() {
                return s.to_string();
            }
        }
    }

    let nested_keys: &[&str] = match mode {
        DedupMode::Entity => &["title", "name"],
        DedupMode::Company => &["name", "title", "company_name"],
    };
    if let Some(nested) = find_nested_field(&item.properties, nested_keys) {
        return nested;
    }

    let (_, etld1, _, _, _) = parse_host(url);
    if etld1.is_empty() {
        String::new()
    } else {
        dedup_common::slugify(&etld1)
    }
}

/// Strip HTML tags/entities, keep alphanumerics/spaces/`-&.,()`, collapse
/// whitespace (§4.1).
fn clean_name(raw: &str) -> String {
    let no_tags = strip_html_tags(raw);
    let no_entities = decode_basic_entities(&no_tags);
    let filtered: String = no_entities
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '&' | '.' | ',' | '(' | ')') {
                c
            } else {
                ' '
            }
        })
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_html_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn decode_basic_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Depth-first search through a JSON value for the first non-empty string
/// under any of `keys`, at any nesting level (§4.1: "any nested object's
/// title/name").
fn find_nested_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => {
            for key in keys {
                if let Some(s) = map.get(*key).and_then(|v| v.as_str()) {
                    if !s.trim().is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
            for (_, child) in map {
                if let Some(found) = find_nested_field(child, keys) {
                    return Some(found);
                }
            }
            None
        }
        serde_json::Value::Array(items) => {
            for item in items {
                if let Some(found) = find_nested_field(item, keys) {
                    return Some(found);
                }
            }
            None
        }
        _ => None,
    }
}

/// Returns `(host, etld1, brand, sub_cls, is_video_platform)`. An invalid or
/// empty URL yields all-empty fields (B1).
fn parse_host(raw_url: &str) -> (String, String, String, SubdomainClass, bool) {
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return (String::new(), String::new(), String::new(), SubdomainClass::Generic, false);
    };
    let Some(host) = parsed.host_str() else {
        return (String::new(), String::new(), String::new(), SubdomainClass::Generic, false);
    };
    let host = host.to_lowercase();

    let etld1 = registrable_domain(&host);
    let is_video_platform = VIDEO_PLATFORMS.contains(&etld1.as_str());

    let subdomain = host
        .strip_suffix(&etld1)
        .unwrap_or("")
        .trim_end_matches('.')
        .to_string();
    let sub_cls = if GENERIC_SUBDOMAINS.contains(&subdomain.as_str()) {
        SubdomainClass::Generic
    } else {
        SubdomainClass::Other
    };

    let brand = brand_from_etld1(&etld1);

    (host, etld1, brand, sub_cls, is_video_platform)
}

fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host.to_string();
    }
    let last_two = labels[labels.len() - 2..].join(".");
    if TWO_LABEL_SUFFIXES.contains(&last_two.as_str()) && labels.len() >= 3 {
        labels[labels.len() - 3..].join(".")
    } else {
        last_two
    }
}

/// Lowercased domain-without-suffix, digits and separators stripped (§3).
fn brand_from_etld1(etld1: &str) -> String {
    let without_suffix = etld1.split('.').next().unwrap_or("");
    without_suffix
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_common::Item;

    fn item(id: &str, name: Option<&str>, url: Option<&str>, properties: serde_json::Value) -> Item {
        Item {
            id: id.to_string(),
            url: url.map(String::from),
            name: name.map(String::from),
            title: None,
            source: None,
            properties,
        }
    }

    #[test]
    fn extracts_url_from_properties_before_top_level() {
        let it = item(
            "a",
            None,
            Some("https://top-level.com"),
            serde_json::json!({ "url": "https://from-properties.com" }),
        );
        let row = canonicalize(&it, DedupMode::Company);
        assert_eq!(row.url, "https://from-properties.com");
    }

    #[test]
    fn falls_back_to_nested_website_field() {
        let it = item(
            "a",
            None,
            None,
            serde_json::json!({ "company": { "website": "https://nested.example.com" } }),
        );
        let row = canonicalize(&it, DedupMode::Company);
        assert_eq!(row.url, "https://nested.example.com");
    }

    #[test]
    fn empty_url_and_name_tolerated() {
        let it = item("a", None, None, serde_json::Value::Null);
        let row = canonicalize(&it, DedupMode::Entity);
        assert_eq!(row.url, "");
        assert_eq!(row.host, "");
        assert_eq!(row.etld1, "");
        assert_eq!(row.brand, "");
        assert!(!row.is_video_platform);
    }

    #[test]
    fn video_platform_detected_for_youtube() {
        let it = item("v1", Some("Trailer"), Some("https://youtube.com/watch?v=x"), serde_json::Value::Null);
        let row = canonicalize(&it, DedupMode::Entity);
        assert!(row.is_video_platform);
        assert_eq!(row.tier0_key(), "video:trailer");
    }

    #[test]
    fn registrable_domain_handles_two_label_suffixes() {
        let it = item("a", Some("Example"), Some("https://shop.example.co.uk"), serde_json::Value::Null);
        let row = canonicalize(&it, DedupMode::Company);
        assert_eq!(row.etld1, "example.co.uk");
        assert_eq!(row.brand, "example");
    }

    #[test]
    fn name_falls_back_to_domain_slug_when_absent() {
        let it = item("a", None, Some("https://lake-street-church.org"), serde_json::Value::Null);
        let row = canonicalize(&it, DedupMode::Company);
        assert_eq!(row.name, "lake-street-church");
    }

    #[test]
    fn clean_name_strips_tags_and_collapses_whitespace() {
        assert_eq!(clean_name("<b>Lake  St.</b>  Church!!!"), "Lake St. Church");
    }

    #[test]
    fn entity_mode_prefers_title_over_name() {
        let mut it = item("a", Some("Name Field"), None, serde_json::Value::Null);
        it.title = Some("Title Field".to_string());
        let row = canonicalize(&it, DedupMode::Entity);
        assert_eq!(row.name, "Title Field");
    }

    #[test]
    fn company_mode_prefers_name_over_title() {
        let mut it = item("a", Some("Name Field"), None, serde_json::Value::Null);
        it.title = Some("Title Field".to_string());
        let row = canonicalize(&it, DedupMode::Company);
        assert_eq!(row.name, "Name Field");
    }
}
