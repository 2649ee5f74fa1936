pub mod config;
pub mod error;
pub mod persistence;
pub mod reason;
pub mod types;

pub use config::Config;
pub use error::DedupError;
pub use persistence::{CounterOutcome, OverviewStats, PersistenceAdapter};
pub use reason::RejectionReason;
pub use types::*;

/// Normalize a name into a URL-safe slug: lowercase, strip non-alphanumeric
/// (keeping spaces), collapse whitespace, replace spaces with hyphens.
///
/// ```
/// assert_eq!(dedup_common::slugify("Lake Street Church"), "lake-street-church");
/// assert_eq!(dedup_common::slugify("Lake St. Church!!!"), "lake-st-church");
/// assert_eq!(dedup_common::slugify("  Multiple   Spaces  "), "multiple-spaces");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<&str>>().join("-")
}
