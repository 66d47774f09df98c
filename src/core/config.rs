// ---------------------------------------------------------------------------
// Env-tunable knobs for the harvest engine. The streak thresholds are
// empirically tuned values carried over from field use; they have no derived
// rationale, so they stay overridable rather than hard-coded.
// ---------------------------------------------------------------------------

pub const ENV_BROWSER_EXECUTABLE: &str = "GMAPS_HARVEST_BROWSER";
pub const ENV_OVERALL_TIMEOUT_SECS: &str = "GMAPS_HARVEST_TIMEOUT_SECS";
pub const ENV_STALL_STOP_STREAK: &str = "GMAPS_HARVEST_STALL_STREAK";

/// Accepted address-prefix families: canonical place pages and share
/// links. Search and bare map-view URLs are rejected before a browser
/// session is opened.
pub const ACCEPTED_ADDRESS_PREFIXES: &[&str] =
    &["https://www.google.com/maps/place/", "https://maps.app.goo.gl"];

/// Consecutive zero-new-record cycles after which the scroll loop gives up.
pub const DEFAULT_STALL_STOP_STREAK: u32 = 5;
/// Streak at which the driver tries the aggressive bottom/up/down scroll.
pub const AGGRESSIVE_SCROLL_STREAK: u32 = 2;
/// Streak at which the driver clears focus state and re-resolves the
/// scroll container (the old reference may have gone stale).
pub const VIEW_RESET_STREAK: u32 = 3;

/// Expand-text controls clicked per scroll cycle, at most.
pub const EXPAND_BUTTONS_PER_CYCLE: usize = 7;

/// Overall wall-clock budget for one harvest: env override → 300 s.
pub fn overall_timeout_secs() -> u64 {
    std::env::var(ENV_OVERALL_TIMEOUT_SECS)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(300)
}

/// Stall-stop streak: env override → 5.
pub fn stall_stop_streak() -> u32 {
    std::env::var(ENV_STALL_STOP_STREAK)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_STALL_STOP_STREAK)
}

/// Optional override for the Chromium-family browser executable.
/// Only returns a value when the variable points at an existing path.
pub fn browser_executable_override() -> Option<String> {
    let p = std::env::var(ENV_BROWSER_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if std::path::Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}
