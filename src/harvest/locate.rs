//! Multi-strategy element discovery.
//!
//! Every semantic target ("the reviews tab", "the scrollable container",
//! "an expand-text control") is resolved through an ordered list of
//! structural queries: first non-empty result set wins, strategies are
//! never merged, and total exhaustion means "not found" rather than an
//! error. Callers filter by visibility and apply their own acceptance
//! policy.
//!
//! The source renders in one of two locales, so every text-based strategy
//! matches both token sets (Reviews/Ulasan, Overview/Ringkasan,
//! More/Lainnya, star/bintang).

use chromiumoxide::Element;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::session::Session;

// ── Element-level JS helpers ─────────────────────────────────────────────────

const VISIBLE_FN: &str = r#"
function() {
    const r = this.getBoundingClientRect();
    const s = window.getComputedStyle(this);
    return r.width > 0 && r.height > 0
        && s.display !== 'none' && s.visibility !== 'hidden';
}
"#;

/// Evaluate a JS function with the element bound as `this`, best-effort.
pub async fn js_value(el: &Element, decl: &str) -> Option<serde_json::Value> {
    match el.call_js_fn(decl, false).await {
        Ok(ret) => ret.result.value,
        Err(_) => None,
    }
}

pub async fn is_visible(el: &Element) -> bool {
    matches!(
        js_value(el, VISIBLE_FN).await,
        Some(serde_json::Value::Bool(true))
    )
}

/// JS click first (reliable on overlaid controls), native click as backup.
pub async fn js_click(el: &Element) -> bool {
    if el.call_js_fn("function() { this.click(); }", false).await.is_ok() {
        return true;
    }
    el.click().await.is_ok()
}

/// Trimmed inner text of a visible element, or `None`.
pub async fn visible_text(el: &Element) -> Option<String> {
    if !is_visible(el).await {
        return None;
    }
    el.inner_text()
        .await
        .ok()
        .flatten()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn is_star_label(label: &str) -> bool {
    let l = label.to_lowercase();
    l.contains("star") || l.contains("bintang")
}

// ── Shared first-match combinator ────────────────────────────────────────────

/// Evaluate strategies in priority order, short-circuiting on the first
/// `Some`. Futures are lazy, so later strategies are never run once an
/// earlier one matches.
pub async fn try_each<T>(
    target: &str,
    strategies: Vec<(&'static str, BoxFuture<'_, Option<T>>)>,
) -> Option<T> {
    for (name, strategy) in strategies {
        if let Some(found) = strategy.await {
            debug!("{}: resolved via strategy '{}'", target, name);
            return Some(found);
        }
    }
    debug!("{}: all strategies exhausted", target);
    None
}

// ── Reviews entry point ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TabInfo {
    pub aria_label: String,
    pub text: String,
}

fn review_like(s: &str) -> bool {
    s.contains("review") || s.contains("ulasan")
}

fn overview_like(s: &str) -> bool {
    s.contains("overview") || s.contains("ringkasan")
}

/// Pick review-tab candidates from the rendered tab strip. Ordered
/// strategies, first non-empty wins:
/// (a) review-indicating aria-label,
/// (b) review semantics in label or text, excluding overview semantics,
/// (c) "reviews for <place>" labelled tab,
/// (d) exact-text tab,
/// (e) brute-force scan for review-like substrings minus overview-like,
/// (f) positional fallback — with at least 3 tabs, assume the third.
pub fn select_review_tabs(tabs: &[TabInfo]) -> Vec<usize> {
    let lowered: Vec<(String, String)> = tabs
        .iter()
        .map(|t| (t.aria_label.to_lowercase(), t.text.to_lowercase()))
        .collect();

    let by_label: Vec<usize> = lowered
        .iter()
        .enumerate()
        .filter(|(_, (label, _))| review_like(label))
        .map(|(i, _)| i)
        .collect();
    if !by_label.is_empty() {
        return by_label;
    }

    let by_semantics: Vec<usize> = lowered
        .iter()
        .enumerate()
        .filter(|(_, (label, text))| {
            (review_like(label) || review_like(text))
                && !(overview_like(label) || overview_like(text))
        })
        .map(|(i, _)| i)
        .collect();
    if !by_semantics.is_empty() {
        return by_semantics;
    }

    let by_for_pattern: Vec<usize> = lowered
        .iter()
        .enumerate()
        .filter(|(_, (label, _))| label.contains("reviews for") || label.contains("ulasan untuk"))
        .map(|(i, _)| i)
        .collect();
    if !by_for_pattern.is_empty() {
        return by_for_pattern;
    }

    let by_exact: Vec<usize> = tabs
        .iter()
        .enumerate()
        .filter(|(_, t)| t.text.trim() == "Reviews" || t.text.trim() == "Ulasan")
        .map(|(i, _)| i)
        .collect();
    if !by_exact.is_empty() {
        return by_exact;
    }

    for (i, (label, text)) in lowered.iter().enumerate() {
        if (review_like(label) && !overview_like(label))
            || (review_like(text) && !overview_like(text))
        {
            return vec![i];
        }
    }

    // The third tab is the reviews tab often enough to be worth a shot.
    if tabs.len() >= 3 {
        return vec![2];
    }

    Vec::new()
}

async fn tab_infos(tabs: &[Element]) -> Vec<TabInfo> {
    let mut infos = Vec::with_capacity(tabs.len());
    for tab in tabs {
        let aria_label = tab
            .attribute("aria-label")
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        let text = tab.inner_text().await.ok().flatten().unwrap_or_default();
        infos.push(TabInfo { aria_label, text });
    }
    infos
}

fn place_segments_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"maps/place/([^/]+)/([^/]+)").expect("valid pattern"))
}

/// Tab discovery failed outright; go at the reviews panel through the
/// address bar instead — append the reviews suffix to a place URL, or
/// rebuild one from the place-name/place-id segments.
async fn navigate_via_deep_link(session: &Session) -> bool {
    let Some(current) = session.current_url().await else {
        return false;
    };

    if current.contains("/place/") && !current.contains("/reviews") {
        if let Ok(mut parsed) = Url::parse(&current) {
            parsed.set_query(None);
            parsed.set_fragment(None);
            let mut target = parsed.to_string();
            if !target.ends_with('/') {
                target.push('/');
            }
            target.push_str("reviews");
            info!("Navigating directly to reviews: {}", target);
            if session.goto(&target).await.is_ok() {
                tokio::time::sleep(Duration::from_secs(5)).await;
                return true;
            }
        }
    } else if let Some(caps) = place_segments_re().captures(&current) {
        let target = format!(
            "https://www.google.com/maps/place/{}/{}/reviews",
            &caps[1], &caps[2]
        );
        info!("Reconstructed reviews URL: {}", target);
        if session.goto(&target).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(5)).await;
            return true;
        }
    }

    false
}

/// Last resort after tab and deep-link discovery: click any visible
/// star-labelled rating element and see whether reviews appear.
async fn click_rating_indicator(session: &Session) -> bool {
    for span in session.query_all("span[aria-label]").await {
        let label = match span.attribute("aria-label").await {
            Ok(Some(l)) => l,
            _ => continue,
        };
        if !is_star_label(&label) || !is_visible(&span).await {
            continue;
        }
        let _ = span.scroll_into_view().await;
        if !js_click(&span).await {
            continue;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        if !session.query_all("div[data-review-id]").await.is_empty() {
            info!("Reached reviews by clicking a rating element");
            return true;
        }
    }
    false
}

/// Bring the reviews panel on screen. Returns `false` when every strategy
/// is exhausted — not an error; the caller decides what an empty panel
/// means.
pub async fn open_reviews_panel(session: &Session) -> bool {
    let tabs = session.query_all("button[role=\"tab\"]").await;
    let infos = tab_infos(&tabs).await;
    debug!(
        "Found {} tabs: {:?}",
        infos.len(),
        infos.iter().map(|t| &t.aria_label).collect::<Vec<_>>()
    );

    for idx in select_review_tabs(&infos) {
        let tab = &tabs[idx];
        if !is_visible(tab).await {
            continue;
        }
        info!(
            "Clicking tab (aria-label='{}', text='{}')",
            infos[idx].aria_label, infos[idx].text
        );
        let _ = tab.scroll_into_view().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        if js_click(tab).await {
            // Give the panel time to render before the caller re-queries.
            tokio::time::sleep(Duration::from_secs(5)).await;
            return true;
        }
    }

    if navigate_via_deep_link(session).await {
        return true;
    }
    click_rating_indicator(session).await
}

// ── Review elements ──────────────────────────────────────────────────────────

const TAG_STRUCTURAL_REVIEWS: &str = r#"
(function() {
    let tagged = 0;
    const spans = document.querySelectorAll('span[aria-label]');
    for (const s of spans) {
        const label = (s.getAttribute('aria-label') || '').toLowerCase();
        if (!label.includes('star') && !label.includes('bintang')) continue;
        let p = s;
        for (let depth = 0; depth < 4 && p; depth++) {
            p = p.parentElement;
            if (p && !p.hasAttribute('data-gmh-review')
                  && p.querySelector('div[class*="fontBodyMedium"]')) {
                p.setAttribute('data-gmh-review', '1');
                tagged++;
                break;
            }
        }
    }
    return tagged;
})()
"#;

/// Enumerate currently rendered review elements. `div[data-review-id]` is
/// the native shape; when the panel renders fewer than 5 of those, a
/// structural pass (star span + body-text block) usually finds the rest.
/// Handles are valid for the current cycle only.
pub async fn review_elements(session: &Session) -> Vec<Element> {
    let native = session.query_all("div[data-review-id]").await;
    if native.len() >= 5 {
        return native;
    }

    let tagged = session
        .evaluate_json(TAG_STRUCTURAL_REVIEWS)
        .await
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    if tagged as usize > native.len() {
        let structural = session.query_all("[data-gmh-review]").await;
        if structural.len() > native.len() {
            debug!("Using {} structurally-detected review elements", structural.len());
            return structural;
        }
    }
    native
}

/// Whether the page currently shows anything review-shaped at all.
pub async fn reviews_present(session: &Session) -> bool {
    if !session.query_all("div[data-review-id]").await.is_empty() {
        return true;
    }
    session
        .evaluate_json(TAG_STRUCTURAL_REVIEWS)
        .await
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
        > 0
}

// ── Expand-text controls ─────────────────────────────────────────────────────

/// Buttons that un-truncate collapsed review bodies.
pub async fn expand_controls(session: &Session) -> Vec<Element> {
    let mut found = Vec::new();
    for button in session.query_all("button").await {
        let text = match button.inner_text().await {
            Ok(Some(t)) => t,
            _ => continue,
        };
        let t = text.trim();
        if t.len() < 30 && (t.contains("More") || t.contains("more") || t.contains("Lainnya")) {
            found.push(button);
        }
    }
    found
}

// ── Scrollable container ─────────────────────────────────────────────────────

const TAG_PARENT_OF_REVIEWS: &str = r#"
(function() {
    const review = document.querySelector('div[data-review-id]');
    if (!review || !review.parentElement) return false;
    review.parentElement.setAttribute('data-gmh-scroller', '1');
    return true;
})()
"#;

const TAG_TEXT_RICH: &str = r#"
(function() {
    for (const d of document.querySelectorAll('div')) {
        if (d.querySelectorAll('div[class*="fontBodyMedium"]').length > 3) {
            d.setAttribute('data-gmh-textrich', '1');
            return true;
        }
    }
    return false;
})()
"#;

const CONTAINER_ACCEPT_FN: &str = r#"
function() {
    const r = this.getBoundingClientRect();
    if (r.height <= 100) return false;
    if (this.querySelector('div[data-review-id]')) return true;
    for (const s of this.querySelectorAll('span[aria-label]')) {
        const label = (s.getAttribute('aria-label') || '').toLowerCase();
        if (label.includes('star') || label.includes('bintang')) return true;
    }
    return false;
}
"#;

/// Acceptance policy for a container candidate: visible, non-trivial
/// rendered height, and actually holding review content.
async fn acceptable_container(el: &Element) -> bool {
    if !is_visible(el).await {
        return false;
    }
    matches!(
        js_value(el, CONTAINER_ACCEPT_FN).await,
        Some(serde_json::Value::Bool(true))
    )
}

async fn first_acceptable(session: &Session, selector: &str) -> Option<Element> {
    for el in session.query_all(selector).await {
        if acceptable_container(&el).await {
            return Some(el);
        }
    }
    None
}

async fn tagged_container(session: &Session, tag_script: &str, selector: &str) -> Option<Element> {
    session.evaluate_json(tag_script).await?;
    first_acceptable(session, selector).await
}

/// Resolve the element the pagination driver scrolls. Falls back to
/// `body` when nothing better qualifies, so the driver always has a
/// target.
pub async fn find_scroll_container(session: &Session) -> Option<Element> {
    let found = try_each(
        "scroll container",
        vec![
            (
                "feed",
                first_acceptable(session, "div[role=\"feed\"]").boxed(),
            ),
            (
                "review parent",
                tagged_container(session, TAG_PARENT_OF_REVIEWS, "[data-gmh-scroller]").boxed(),
            ),
            (
                "class fingerprint (full)",
                first_acceptable(session, "div.m6QErb.DxyBCb.kA9KIf.dS8AEf").boxed(),
            ),
            (
                "class fingerprint (m6QErb)",
                first_acceptable(session, "div.m6QErb").boxed(),
            ),
            (
                "class fingerprint (DxyBCb)",
                first_acceptable(session, "div.DxyBCb").boxed(),
            ),
            (
                "scroll jsaction",
                first_acceptable(session, "div[jsaction*=\"scroll\"]").boxed(),
            ),
            (
                "text-rich div",
                tagged_container(session, TAG_TEXT_RICH, "[data-gmh-textrich]").boxed(),
            ),
            (
                "main region",
                first_acceptable(session, "div[role=\"main\"]").boxed(),
            ),
        ],
    )
    .await;
    if found.is_some() {
        return found;
    }

    info!("Using body as scroll container");
    session.query_all("body").await.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(label: &str, text: &str) -> TabInfo {
        TabInfo {
            aria_label: label.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn aria_label_strategy_wins_first() {
        let tabs = vec![
            tab("Overview of Warung Sate", "Overview"),
            tab("Reviews for Warung Sate", "Reviews"),
        ];
        assert_eq!(select_review_tabs(&tabs), vec![1]);
    }

    #[test]
    fn localized_label_matches() {
        let tabs = vec![tab("Ringkasan", "Ringkasan"), tab("Ulasan", "Ulasan")];
        assert_eq!(select_review_tabs(&tabs), vec![1]);
    }

    #[test]
    fn overview_excluded_in_text_strategy() {
        // No review-ish aria-labels, so the semantic strategy runs and must
        // skip the overview tab even though it mentions reviews in its text.
        let tabs = vec![
            tab("", "Overview with 12 reviews"),
            tab("", "Reviews"),
            tab("", "About"),
        ];
        assert_eq!(select_review_tabs(&tabs), vec![1]);
    }

    #[test]
    fn positional_fallback_picks_third_tab() {
        let tabs = vec![tab("", "A"), tab("", "B"), tab("", "C"), tab("", "D")];
        assert_eq!(select_review_tabs(&tabs), vec![2]);
    }

    #[test]
    fn no_tabs_no_candidates() {
        assert!(select_review_tabs(&[]).is_empty());
        assert!(select_review_tabs(&[tab("", "A"), tab("", "B")]).is_empty());
    }

    #[test]
    fn star_labels_both_locales() {
        assert!(is_star_label("5 stars"));
        assert!(is_star_label("4 bintang"));
        assert!(!is_star_label("photo of food"));
    }

    #[tokio::test]
    async fn try_each_short_circuits() {
        use futures::FutureExt;
        use std::sync::atomic::{AtomicBool, Ordering};

        let later_polled = AtomicBool::new(false);
        let hit = try_each(
            "test target",
            vec![
                ("first", async { None::<u32> }.boxed()),
                ("second", async { Some(7u32) }.boxed()),
                (
                    "third",
                    async {
                        later_polled.store(true, Ordering::SeqCst);
                        Some(9u32)
                    }
                    .boxed(),
                ),
            ],
        )
        .await;
        assert_eq!(hit, Some(7));
        assert!(!later_polled.load(Ordering::SeqCst));
    }
}
