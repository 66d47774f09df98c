//! Per-element review extraction.
//!
//! Each of the four fields resolves through its own ordered heuristic
//! list, so one field's primary strategy failing never blocks the others;
//! an unresolved field keeps its sentinel default. Two whole-record drops
//! happen here: Google-translated variants (they duplicate the
//! original-language entry in garbled form) and records with no usable
//! text and no rating.

use aho_corasick::AhoCorasick;
use chromiumoxide::Element;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use super::locate::{is_star_label, is_visible, js_click, visible_text};
use crate::core::types::{ReviewRecord, NO_REVIEW_TEXT, UNKNOWN_DATE, UNKNOWN_REVIEWER};

// ── Text-shape heuristics ────────────────────────────────────────────────────

const MONTH_TOKENS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

fn month_matcher() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(MONTH_TOKENS)
            .expect("valid month tokens")
    })
}

fn rating_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.?\d*").expect("valid pattern"))
}

fn slash_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+[/-]\d+").expect("valid pattern"))
}

pub fn contains_month_token(text: &str) -> bool {
    month_matcher().is_match(text)
}

/// "2 months ago", "Edited · a week ago", "Reviewed in March" — anything
/// shaped like a timestamp rather than body text.
pub fn looks_like_timestamp(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    lower.ends_with("ago") || contains_month_token(&lower)
}

pub fn looks_like_rating_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("star") || lower.contains("bintang")
}

/// Parse the numeric token out of a star aria-label, tolerating a comma
/// decimal separator ("4,5 bintang"). Values outside [0, 5] are noise.
pub fn parse_rating_label(label: &str) -> Option<f64> {
    let normalized = label.replace(',', ".");
    let token = rating_token_re().find(&normalized)?;
    let value: f64 = token.as_str().parse().ok()?;
    if (0.0..=5.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Choose the review body from candidate fragments: the longest candidate
/// over 20 chars that is neither timestamp- nor rating-shaped; failing
/// that, the longest surviving fragment over 10 chars.
pub fn pick_review_text(candidates: &[String]) -> Option<String> {
    let best = candidates
        .iter()
        .filter(|t| char_len(t) > 20 && !looks_like_timestamp(t) && !looks_like_rating_text(t))
        .max_by_key(|t| char_len(t));
    if let Some(text) = best {
        return Some(text.clone());
    }

    candidates
        .iter()
        .filter(|t| {
            char_len(t) > 10 && !t.to_lowercase().contains("ago") && !looks_like_rating_text(t)
        })
        .max_by_key(|t| char_len(t))
        .cloned()
}

/// Last-resort body extraction from the element's raw rendered text:
/// drop timestamp/rating-shaped lines, keep the longest one over 10 chars.
pub fn pick_from_raw(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| char_len(l) > 10 && !looks_like_timestamp(l) && !looks_like_rating_text(l))
        .max_by_key(|l| char_len(l))
        .map(str::to_string)
}

/// Small fragments only: relative-time markers, month names, or
/// slash/dash digit pairs.
pub fn looks_like_date(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || char_len(trimmed) >= 30 {
        return false;
    }
    let lower = trimmed.to_lowercase();
    lower.contains("ago") || contains_month_token(&lower) || slash_date_re().is_match(trimmed)
}

/// Translation-attribution marker on either expected locale.
pub fn is_translated(raw: &str) -> bool {
    raw.contains("Translated by Google") || raw.contains("Terjemahan oleh Google")
}

// ── Element-driven extraction ────────────────────────────────────────────────

const NAME_SELECTORS: &[&str] = &[
    "div[class*=\"fontHeadlineSmall\"]",
    "div[class*=\"fontTitleLarge\"]",
    "div[class*=\"d4r55\"]",
];

const TEXT_SELECTORS: &[&str] = &[
    "div[class*=\"fontBodyMedium\"]",
    "span[class*=\"wiI7pd\"]",
    "div[class*=\"review-full-text\"]",
];

const DATE_SELECTORS: &[&str] = &[
    "div[class*=\"MyEned\"]",
    "div[class*=\"rsqaWe\"]",
    "div[class*=\"fontBodySmall\"]",
];

async fn descendants(el: &Element, selector: &str) -> Vec<Element> {
    el.find_elements(selector).await.unwrap_or_default()
}

async fn extract_name(el: &Element) -> Option<String> {
    for selector in NAME_SELECTORS {
        for candidate in descendants(el, selector).await {
            if let Some(text) = visible_text(&candidate).await {
                return Some(text);
            }
        }
    }
    None
}

async fn extract_rating(el: &Element) -> Option<f64> {
    for span in descendants(el, "span[aria-label]").await {
        let label = match span.attribute("aria-label").await {
            Ok(Some(l)) => l,
            _ => continue,
        };
        if !is_star_label(&label) || !is_visible(&span).await {
            continue;
        }
        if let Some(value) = parse_rating_label(&label) {
            return Some(value);
        }
    }
    None
}

/// Collapsed bodies truncate the text, so the inline "more" control is
/// clicked before any text heuristic runs.
async fn expand_inline(el: &Element) {
    for button in descendants(el, "button").await {
        let text = match button.inner_text().await {
            Ok(Some(t)) => t,
            _ => continue,
        };
        let t = text.trim();
        if !(t.contains("More") || t.contains("more") || t.contains("Lainnya")) {
            continue;
        }
        if !is_visible(&button).await {
            continue;
        }
        if js_click(&button).await {
            debug!("Expanded truncated review text");
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        break;
    }
}

async fn extract_text(el: &Element, raw: &str) -> Option<String> {
    let mut candidates = Vec::new();
    for selector in TEXT_SELECTORS {
        for candidate in descendants(el, selector).await {
            if let Some(text) = visible_text(&candidate).await {
                if char_len(&text) > 5 {
                    candidates.push(text);
                }
            }
        }
    }
    pick_review_text(&candidates).or_else(|| pick_from_raw(raw))
}

async fn extract_date(el: &Element, raw: &str) -> Option<String> {
    for selector in DATE_SELECTORS {
        for candidate in descendants(el, selector).await {
            if let Some(text) = visible_text(&candidate).await {
                if looks_like_date(&text) {
                    return Some(text);
                }
            }
        }
    }
    // Separately detected time-ago fragment, when the styled containers
    // yielded nothing.
    raw.lines()
        .map(str::trim)
        .find(|l| char_len(l) < 30 && l.to_lowercase().contains("ago"))
        .map(str::to_string)
}

async fn has_photos(el: &Element) -> bool {
    if !descendants(el, "button[jsaction*=\"reviewPhoto\"] img")
        .await
        .is_empty()
    {
        return true;
    }
    if !descendants(el, "button[aria-label*=\"Photo\"]").await.is_empty() {
        return true;
    }
    for img in descendants(el, "img").await {
        if let Ok(Some(src)) = img.attribute("src").await {
            if !src.contains("profile") {
                return true;
            }
        }
    }
    false
}

/// Extract one rendered review element into a record. `None` means the
/// element was deliberately dropped (translated variant or no usable
/// signal) — never an error.
pub async fn extract_review(el: &Element) -> Option<ReviewRecord> {
    // Make sure the element is fully rendered before reading it.
    let _ = el.scroll_into_view().await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    expand_inline(el).await;

    let raw = el.inner_text().await.ok().flatten().unwrap_or_default();
    if is_translated(&raw) {
        debug!("Skipping Google-translated review variant");
        return None;
    }

    let reviewer_name = extract_name(el)
        .await
        .unwrap_or_else(|| UNKNOWN_REVIEWER.to_string());
    let rating = extract_rating(el).await.unwrap_or(0.0);
    let mut review_text = extract_text(el, &raw).await;
    let mut date = extract_date(el, &raw).await.unwrap_or_else(|| UNKNOWN_DATE.to_string());

    // A "date" longer than 50 chars is body text that fell through the
    // date heuristics; swap the two.
    if review_text.is_none() && char_len(&date) > 50 {
        review_text = Some(std::mem::replace(&mut date, UNKNOWN_DATE.to_string()));
    }

    let record = ReviewRecord {
        reviewer_name,
        rating,
        date,
        review_text: review_text.unwrap_or_else(|| NO_REVIEW_TEXT.to_string()),
        has_photos: has_photos(el).await,
    };

    if record.is_empty() {
        debug!("Skipping review with no usable content");
        return None;
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_labels_parse_in_both_locales() {
        assert_eq!(parse_rating_label("5 stars"), Some(5.0));
        assert_eq!(parse_rating_label("Rated 3.5 out of 5 stars"), Some(3.5));
        assert_eq!(parse_rating_label("4,5 bintang"), Some(4.5));
        assert_eq!(parse_rating_label("bintang"), None);
        // A leading token outside the star scale is noise, not a rating.
        assert_eq!(parse_rating_label("10 stars"), None);
    }

    #[test]
    fn timestamps_are_recognized() {
        assert!(looks_like_timestamp("2 months ago"));
        assert!(looks_like_timestamp("Visited in January"));
        assert!(!looks_like_timestamp("Great sate, will come back"));
    }

    #[test]
    fn longest_plausible_candidate_wins() {
        let candidates = vec![
            "3 weeks ago".to_string(),
            "5 stars".to_string(),
            "Short".to_string(),
            "The food was excellent and the service fast.".to_string(),
            "Good place, friendly staff, generous portions every time.".to_string(),
        ];
        assert_eq!(
            pick_review_text(&candidates).as_deref(),
            Some("Good place, friendly staff, generous portions every time.")
        );
    }

    #[test]
    fn short_candidates_fall_back_to_relaxed_pass() {
        let candidates = vec!["Decent coffee here".to_string(), "a week ago".to_string()];
        assert_eq!(
            pick_review_text(&candidates).as_deref(),
            Some("Decent coffee here")
        );
    }

    #[test]
    fn raw_fallback_skips_timestamp_lines() {
        let raw = "Budi Santoso\n5 stars\n2 months ago\nSangat enak, pelayanan ramah dan cepat\nLike";
        assert_eq!(
            pick_from_raw(raw).as_deref(),
            Some("Sangat enak, pelayanan ramah dan cepat")
        );
    }

    #[test]
    fn date_shapes() {
        assert!(looks_like_date("2 months ago"));
        assert!(looks_like_date("Mar 2024"));
        assert!(looks_like_date("12/05"));
        assert!(looks_like_date("12-05"));
        assert!(!looks_like_date("An essay about my visit that keeps going on"));
        assert!(!looks_like_date(""));
    }

    #[test]
    fn translation_markers_both_locales() {
        assert!(is_translated("Nice place\n(Translated by Google) good"));
        assert!(is_translated("Enak\nTerjemahan oleh Google"));
        assert!(!is_translated("Plain review body"));
    }

    #[test]
    fn empty_record_invariant() {
        let empty = ReviewRecord::default();
        assert!(empty.is_empty());

        let rated_only = ReviewRecord {
            rating: 4.0,
            ..ReviewRecord::default()
        };
        assert!(!rated_only.is_empty());

        let text_only = ReviewRecord {
            review_text: "Worth the queue".to_string(),
            ..ReviewRecord::default()
        };
        assert!(!text_only.is_empty());
    }
}
