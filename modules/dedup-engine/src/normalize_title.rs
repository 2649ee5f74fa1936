//! Entity-mode title normalization pipeline (§4.1). A fixed, ordered sequence
//! of passes that strips release noise (year parentheticals, format markers
//! like "TV Series"/"Movie", regional/language markers like "Dub"/"Sub",
//! episode/season markers, edition markers like "Director's Cut", and
//! trailer/teaser suffixes) so that two postings of the same title survive
//! as the same fingerprint key regardless of how each upstream source
//! decorated it.

use std::sync::LazyLock;

use regex::Regex;

struct Pipeline {
    year_parenthetical: Regex,
    format_markers: Regex,
    regional_markers: Regex,
    episode_season: Regex,
    edition_markers: Regex,
    trailer_teaser: Regex,
    leading_the: Regex,
    trailing_the: Regex,
    non_alnum: Regex,
    whitespace: Regex,
}

static PIPELINE: LazyLock<Pipeline> = LazyLock::new(|| Pipeline {
    year_parenthetical: Regex::new(r"[\(\[]\s*(19|20)\d{2}\s*[\)\]]").unwrap(),
    format_markers: Regex::new(
        r"(?i)\(\s*tv\b[^)]*\)|[\(\[]?\b(tv\s*series|movie|film|book|anime|series|show)\b[\)\]]?",
    )
    .unwrap(),
    regional_markers: Regex::new(
        r"(?i)[\(\[]?\b(us|uk|japanese|english|dub|sub|original)\b[\)\]]?",
    )
    .unwrap(),
    episode_season: Regex::new(
        r"(?i)\bs\d{1,2}e\d{1,3}\b|\bseason\s*\d{1,2}\b|\bepisode\s*\d{1,3}\b|\bep\.?\s*\d{1,3}\b",
    )
    .unwrap(),
    edition_markers: Regex::new(
        r"(?i)\b(director'?s?\s*cut|remastered|extended|revised|special|limited|ultimate|complete|definitive)\b",
    )
    .unwrap(),
    trailer_teaser: Regex::new(
        r"(?i)\b(official\s*)?(trailer|teaser|tv\s*spot|clip|behind\s*the\s*scenes|making\s*of)\s*\d*\b\s*$",
    )
    .unwrap(),
    leading_the: Regex::new(r"(?i)^the\s+").unwrap(),
    trailing_the: Regex::new(r"(?i),\s*the\s*$").unwrap(),
    non_alnum: Regex::new(r"[^a-z0-9 ]").unwrap(),
    whitespace: Regex::new(r"\s+").unwrap(),
});

/// Applies the fixed cleaning pipeline and lowercases the result (§4.1).
/// Order matters: format/regional markers are stripped before the
/// episode/season truncation so a leading "TV Series" doesn't shift where
/// `S01E02` is found; edition and trailer/teaser markers run after
/// truncation since they only ever describe whatever title text survived it.
/// Leading/trailing "The" is repositioned last, after noise is already
/// gone, so `"Matrix, The (1999)"` and `"The Matrix"` normalize to the same
/// string.
pub fn normalize_title(raw: &str) -> String {
    let p = &*PIPELINE;
    let mut s = raw.to_string();

    s = p.year_parenthetical.replace_all(&s, " ").to_string();
    s = p.format_markers.replace_all(&s, " ").to_string();
    s = p.regional_markers.replace_all(&s, " ").to_string();

    // Episode/season markers truncate everything from the match onward,
    // not just the matched substring (§4.1).
    if let Some(m) = p.episode_season.find(&s) {
        s.truncate(m.start());
    }

    s = p.edition_markers.replace_all(&s, " ").to_string();
    s = p.trailer_teaser.replace_all(&s, " ").to_string();

    s = s.to_lowercase();
    s = p.trailing_the.replace(&s, "").to_string();
    s = p.leading_the.replace(&s, "").to_string();

    s = p.non_alnum.replace_all(&s, " ").to_string();
    s = p.whitespace.replace_all(&s, " ").to_string();
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- year / format / regional / edition stripping ---

    #[test]
    fn strips_year_parenthetical() {
        assert_eq!(normalize_title("Inception (2010)"), "inception");
    }

    #[test]
    fn strips_format_markers() {
        assert_eq!(normalize_title("Attack on Titan TV Series"), "attack on titan");
        assert_eq!(normalize_title("Spirited Away (TV)"), "spirited away");
        assert_eq!(normalize_title("Naruto Anime"), "naruto");
    }

    #[test]
    fn strips_regional_language_markers() {
        assert_eq!(normalize_title("Attack on Titan (Dub)"), "attack on titan");
        assert_eq!(normalize_title("Your Name (Sub)"), "your name");
        assert_eq!(normalize_title("Oldboy (Original)"), "oldboy");
    }

    #[test]
    fn strips_edition_markers() {
        assert_eq!(normalize_title("Blade Runner: Director's Cut"), "blade runner");
        assert_eq!(normalize_title("Akira Ultimate Edition"), "akira edition");
        assert_eq!(normalize_title("Dune Definitive"), "dune");
    }

    #[test]
    fn strips_episode_and_season_markers_and_truncates_remainder() {
        assert_eq!(normalize_title("The Office S03E14 Extra Scenes"), "office");
        assert_eq!(normalize_title("Naruto Episode 12 Recap"), "naruto");
        assert_eq!(normalize_title("Naruto Ep 12 Recap"), "naruto");
        assert_eq!(normalize_title("The Office Season 3 Bloopers"), "office");
    }

    #[test]
    fn strips_trailer_and_teaser_family_suffixes() {
        assert_eq!(normalize_title("Oppenheimer Official Trailer"), "oppenheimer");
        assert_eq!(normalize_title("Dune Part Two TV Spot"), "dune part two");
        assert_eq!(normalize_title("Oppenheimer Behind the Scenes"), "oppenheimer");
        assert_eq!(normalize_title("Oppenheimer Making Of"), "oppenheimer");
    }

    // --- leading/trailing "The" repositioning ---

    #[test]
    fn leading_and_trailing_the_normalize_identically() {
        assert_eq!(normalize_title("The Matrix"), normalize_title("Matrix, The"));
    }

    // --- punctuation / whitespace collapse ---

    #[test]
    fn collapses_punctuation_and_whitespace() {
        assert_eq!(normalize_title("Spider-Man:  No Way Home!!!"), "spider man no way home");
    }

    #[test]
    fn is_idempotent_on_already_clean_titles() {
        let once = normalize_title("district 9");
        assert_eq!(normalize_title(&once), once);
    }
}
