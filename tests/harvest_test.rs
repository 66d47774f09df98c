//! Engine-level tests that run without a browser: address gating, option
//! plumbing, persisted-output semantics, and the launch-profile chain.
//! Anything needing a live Chromium session is exercised manually against
//! a real place page.

use gmaps_harvest::harvest::output;
use gmaps_harvest::harvest::session::launch_profiles;
use gmaps_harvest::types::*;
use gmaps_harvest::{harvest, validate_address, HarvestOptions};

fn record(name: &str, text: &str, rating: f64) -> ReviewRecord {
    ReviewRecord {
        reviewer_name: name.to_string(),
        rating,
        date: "2 months ago".to_string(),
        review_text: text.to_string(),
        has_photos: false,
    }
}

#[tokio::test]
async fn invalid_address_rejected_before_any_session() {
    let result = harvest("https://example.com/not-maps", HarvestOptions::default()).await;
    match result {
        Err(HarvestError::InvalidAddress(addr)) => {
            assert!(addr.contains("example.com"));
        }
        other => panic!("expected InvalidAddress, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn both_address_families_accepted() {
    assert!(validate_address("https://www.google.com/maps/place/Kopi+Kenangan/data=!4m2").is_ok());
    assert!(validate_address("https://maps.app.goo.gl/xYz").is_ok());
    assert!(validate_address("https://www.google.com/search?q=maps").is_err());
    assert!(validate_address("https://www.google.com/maps/search/best+coffee").is_err());
}

#[test]
fn request_defaults_match_invocation_contract() {
    let req: HarvestRequest =
        serde_json::from_str(r#"{"url": "https://maps.app.goo.gl/xYz"}"#).unwrap();
    assert_eq!(req.target_count, 10);
    assert_eq!(req.settle_seconds, 5.0);
    assert_eq!(req.max_attempts, 30);
    assert!(req.headless);
    assert!(req.browser_path.is_none());
    assert!(req.output_path.is_none());

    let opts = HarvestOptions::from(&req);
    assert_eq!(opts.target_count, 10);
    assert_eq!(opts.max_attempts, 30);
}

#[test]
fn record_serializes_with_five_fields() {
    let json = serde_json::to_value(record("Ana", "Great food", 4.5)).unwrap();
    let obj = json.as_object().unwrap();
    assert_eq!(obj.len(), 5);
    for key in ["reviewer_name", "rating", "date", "review_text", "has_photos"] {
        assert!(obj.contains_key(key), "missing field {key}");
    }
}

#[tokio::test]
async fn output_is_overwritten_not_appended() {
    let dir = std::env::temp_dir().join(format!("gmaps-harvest-test-{}", std::process::id()));
    let path = dir.join("reviews.json");

    let first = vec![
        record("Ana", "Great food and fast service", 5.0),
        record("Budi", "Too crowded on weekends", 3.0),
    ];
    output::write_reviews(&path, &first).await.unwrap();

    let second = vec![record("Citra", "Quiet in the mornings", 4.0)];
    output::write_reviews(&path, &second).await.unwrap();

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let parsed: Vec<ReviewRecord> = serde_json::from_str(&contents).unwrap();
    assert_eq!(parsed, second);

    // No leftover temp file from the atomic replace.
    let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    assert_eq!(names, vec!["reviews.json".to_string()]);

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn empty_result_set_persists_as_empty_array() {
    let dir = std::env::temp_dir().join(format!("gmaps-harvest-empty-{}", std::process::id()));
    let path = dir.join("reviews.json");

    output::write_reviews(&path, &[]).await.unwrap();
    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(serde_json::from_str::<Vec<ReviewRecord>>(&contents).unwrap(), vec![]);

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[test]
fn launch_profiles_descend_and_stay_independent() {
    let profiles = launch_profiles();
    assert_eq!(profiles[0].chrome_major, Some(136));
    assert_eq!(profiles[1].chrome_major, Some(135));
    assert_eq!(profiles[2].chrome_major, None);

    // The pinned version lands in the identification string.
    assert!(profiles[0].user_agent().contains("Chrome/136.0.0.0"));
    assert!(profiles[1].user_agent().contains("Chrome/135.0.0.0"));

    // Each call yields a fresh chain; profiles are value types, so no
    // state can leak from a failed launch attempt into the next.
    let again = launch_profiles();
    assert_eq!(again[1].extra_args, profiles[1].extra_args);
}
