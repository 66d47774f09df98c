use serde::{Deserialize, Serialize};

/// Sentinel used when no reviewer name heuristic resolves.
pub const UNKNOWN_REVIEWER: &str = "Unknown Reviewer";
/// Sentinel used when no date heuristic resolves.
pub const UNKNOWN_DATE: &str = "Unknown Date";
/// Sentinel used when no body-text heuristic resolves.
pub const NO_REVIEW_TEXT: &str = "No review text found";

/// One harvested review. Field defaults are the sentinels above; `rating`
/// is in `[0.0, 5.0]` with `0.0` meaning "unresolved".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRecord {
    pub reviewer_name: String,
    pub rating: f64,
    pub date: String,
    pub review_text: String,
    pub has_photos: bool,
}

impl Default for ReviewRecord {
    fn default() -> Self {
        Self {
            reviewer_name: UNKNOWN_REVIEWER.to_string(),
            rating: 0.0,
            date: UNKNOWN_DATE.to_string(),
            review_text: NO_REVIEW_TEXT.to_string(),
            has_photos: false,
        }
    }
}

impl ReviewRecord {
    /// A record with neither text nor a rating carries no usable signal
    /// and must never reach the accumulator.
    pub fn is_empty(&self) -> bool {
        self.review_text == NO_REVIEW_TEXT && self.rating == 0.0
    }

    /// Cheap collision-tolerant fingerprint: reviewer name plus the first
    /// 50 chars of the body. Catches the same review re-rendering under a
    /// fresh transient `data-review-id` after a scroll.
    pub fn content_signature(&self) -> String {
        let prefix: String = self.review_text.chars().take(50).collect();
        format!("{}:{}", self.reviewer_name, prefix)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HarvestRequest {
    pub url: String,
    #[serde(default = "default_target_count")]
    pub target_count: usize,
    #[serde(default = "default_settle_seconds")]
    pub settle_seconds: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default)]
    pub browser_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
}

fn default_target_count() -> usize {
    10
}

fn default_settle_seconds() -> f64 {
    5.0
}

fn default_max_attempts() -> u32 {
    30
}

fn default_headless() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HarvestResponse {
    pub url: String,
    pub requested: usize,
    pub collected: usize,
    pub reviews: Vec<ReviewRecord>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// The only failures a harvest surfaces to its caller. Everything else
/// degrades to "return whatever was accumulated".
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("unsupported address (expected a Google Maps place URL or maps.app.goo.gl link): {0}")]
    InvalidAddress(String),

    #[error("browser session could not be started: {0}")]
    SessionInit(String),
}
