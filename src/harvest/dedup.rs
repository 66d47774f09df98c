//! Session-scoped dedup and result accumulation.
//!
//! Identity is two-layered: the element's native `data-review-id` (or a
//! position+name fallback when absent), plus a content signature that
//! catches the same review re-rendering under a fresh transient id after
//! a scroll. A record is admitted only when neither key has been seen in
//! this harvest session. Dedup scope is one session; concurrent harvests
//! own independent accumulators.

use std::collections::HashSet;
use tracing::info;

use crate::core::types::ReviewRecord;

pub struct Accumulator {
    target: usize,
    records: Vec<ReviewRecord>,
    seen_ids: HashSet<String>,
    seen_signatures: HashSet<String>,
    /// High-water mark for progress reporting; never decreases.
    reported: usize,
}

impl Accumulator {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            records: Vec::new(),
            seen_ids: HashSet::new(),
            seen_signatures: HashSet::new(),
            reported: 0,
        }
    }

    /// Admit one extracted record. `position` is the element's index in
    /// the current rendering pass, used only to synthesize a fallback id.
    pub fn admit(
        &mut self,
        record: ReviewRecord,
        native_id: Option<String>,
        position: usize,
    ) -> bool {
        let id = native_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("pos_{}_{}", record.reviewer_name, position));

        if !self.seen_ids.insert(id) {
            return false;
        }
        // The id stays marked even when the signature rejects the record,
        // so a re-rendered duplicate is not re-extracted every cycle.
        let signature = record.content_signature();
        if !self.seen_signatures.insert(signature) {
            return false;
        }

        self.records.push(record);
        self.report_progress();
        true
    }

    fn report_progress(&mut self) {
        if self.records.len() > self.reported {
            self.reported = self.records.len();
            info!("Collected {}/{} reviews", self.reported, self.target);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Monotonic progress count as last reported.
    pub fn progress(&self) -> usize {
        self.reported
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn target_reached(&self) -> bool {
        self.records.len() >= self.target
    }

    /// Hand over the result set in acceptance order, truncated to the
    /// requested target when a mid-cycle batch overshot it.
    pub fn into_records(mut self) -> Vec<ReviewRecord> {
        self.records.truncate(self.target);
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, text: &str) -> ReviewRecord {
        ReviewRecord {
            reviewer_name: name.to_string(),
            rating: 4.0,
            review_text: text.to_string(),
            ..ReviewRecord::default()
        }
    }

    #[test]
    fn native_id_dedup() {
        let mut acc = Accumulator::new(10);
        assert!(acc.admit(record("Ana", "First text"), Some("id-1".into()), 0));
        assert!(!acc.admit(record("Ana", "Different text"), Some("id-1".into()), 1));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn signature_dedup_survives_fresh_native_ids() {
        // Same (name, text-prefix) re-rendered under a new transient id
        // after a scroll must not be admitted twice.
        let mut acc = Accumulator::new(10);
        let text = "An unusually detailed review body exceeding the prefix";
        assert!(acc.admit(record("Budi", text), Some("id-a".into()), 0));
        assert!(!acc.admit(record("Budi", text), Some("id-b".into()), 3));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn signature_uses_fifty_char_prefix() {
        let mut acc = Accumulator::new(10);
        let long_a = format!("{}{}", "x".repeat(50), "tail one");
        let long_b = format!("{}{}", "x".repeat(50), "tail two");
        assert!(acc.admit(record("Citra", &long_a), None, 0));
        // Same first 50 chars → same signature → rejected.
        assert!(!acc.admit(record("Citra", &long_b), None, 1));
    }

    #[test]
    fn fallback_id_from_position_and_name() {
        let mut acc = Accumulator::new(10);
        assert!(acc.admit(record("Dewi", "Text one, long enough to differ"), None, 0));
        // No native id: position+name forms the identity key.
        assert!(!acc.admit(record("Dewi", "A completely different body text"), None, 0));
        assert!(acc.admit(record("Dewi", "A completely different body text"), None, 1));
    }

    #[test]
    fn progress_is_monotonic() {
        let mut acc = Accumulator::new(3);
        let mut last = 0;
        for i in 0..5 {
            acc.admit(record(&format!("R{i}"), &format!("Body text number {i}")), None, i);
            assert!(acc.progress() >= last);
            last = acc.progress();
        }
        assert_eq!(acc.progress(), 5);
    }

    #[test]
    fn truncation_keeps_earliest_accepted() {
        let mut acc = Accumulator::new(2);
        for i in 0..4 {
            acc.admit(record(&format!("R{i}"), &format!("Body text number {i}")), None, i);
        }
        let records = acc.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reviewer_name, "R0");
        assert_eq!(records[1].reviewer_name, "R1");
    }

    #[test]
    fn signature_rejection_marks_id_seen() {
        let mut acc = Accumulator::new(10);
        let text = "A body long enough that the signature prefix is stable";
        assert!(acc.admit(record("Fitri", text), Some("id-a".into()), 0));
        // Same content under a fresh transient id: rejected, and the new
        // id is recorded so the element is skipped cheaply from now on.
        assert!(!acc.admit(record("Fitri", text), Some("id-b".into()), 1));
        assert!(!acc.admit(
            record("Fitri", "Entirely different content this time"),
            Some("id-b".into()),
            2
        ));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn empty_native_id_treated_as_absent() {
        let mut acc = Accumulator::new(10);
        assert!(acc.admit(record("Eka", "Some review body text here"), Some(String::new()), 2));
        assert_eq!(acc.len(), 1);
    }
}
