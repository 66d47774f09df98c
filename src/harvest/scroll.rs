//! Convergence-aware scroll pagination.
//!
//! Each cycle scrolls the container through a fallback chain of methods,
//! waits for rendering to settle, expands truncated bodies, re-enumerates
//! the visible review elements and feeds them through extraction + dedup.
//! Termination is decided every cycle: target reached, attempt budget
//! exhausted, or a stalled-progress streak. Two recovery actions fire on
//! intermediate streak values; neither resets the streak — only a
//! genuinely new record does.

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::Element;
use rand::distr::{Distribution, Uniform};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::dedup::Accumulator;
use super::locate::{self, is_visible, js_click, js_value};
use super::session::Session;
use super::{extract, Interrupt};
use crate::core::config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    AttemptsExhausted,
    Stalled,
    Interrupted,
}

/// Scroll distance grows with the attempt count so a stubborn feed gets
/// pushed progressively harder.
pub fn scroll_distance(attempt: u32) -> u32 {
    1000 + attempt * 200
}

pub struct PaginationDriver<'a> {
    session: &'a Session,
    settle: Duration,
    max_attempts: u32,
    stall_stop: u32,
    attempts: u32,
    stall_streak: u32,
}

impl<'a> PaginationDriver<'a> {
    pub fn new(session: &'a Session, settle: Duration, max_attempts: u32) -> Self {
        Self {
            session,
            settle,
            max_attempts,
            stall_stop: config::stall_stop_streak(),
            attempts: 0,
            stall_streak: 0,
        }
    }

    /// Drive the loop to one of its terminal states. The accumulator is
    /// owned by the supervisor, so everything admitted here survives even
    /// if this future is dropped mid-cycle by the time budget.
    pub async fn run(
        mut self,
        mut scroller: Element,
        acc: &mut Accumulator,
        interrupt: Option<&Interrupt>,
    ) -> Result<StopReason> {
        loop {
            if interrupt.is_some_and(|i| i.is_tripped()) {
                info!("Harvest interrupted; stopping scroll loop");
                return Ok(StopReason::Interrupted);
            }
            if acc.target_reached() {
                return Ok(StopReason::TargetReached);
            }
            if self.attempts >= self.max_attempts {
                info!("Scroll attempt budget exhausted ({})", self.max_attempts);
                return Ok(StopReason::AttemptsExhausted);
            }
            self.attempts += 1;

            self.log_scroll_position(&scroller).await;
            self.scroll_once(&scroller).await;

            tokio::time::sleep(self.settle).await;
            self.expand_visible().await;

            // Uniform jitter so the cycle cadence is not a fixed interval.
            let jitter_ms = {
                let mut rng = rand::rng();
                let dist = Uniform::new(500u64, 1500).unwrap();
                dist.sample(&mut rng)
            };
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

            let new_records = self.harvest_cycle(acc).await;
            debug!(
                "Cycle {}: {} new records, total {}/{}",
                self.attempts,
                new_records,
                acc.len(),
                acc.target()
            );

            if new_records > 0 {
                self.stall_streak = 0;
                continue;
            }
            self.stall_streak += 1;
            info!(
                "No new reviews in {} consecutive cycles",
                self.stall_streak
            );

            if self.stall_streak >= self.stall_stop {
                info!("Stalled; ending collection with {} reviews", acc.len());
                return Ok(StopReason::Stalled);
            }
            if self.stall_streak >= config::AGGRESSIVE_SCROLL_STREAK {
                self.aggressive_scroll(&scroller).await;
            }
            if self.stall_streak == config::VIEW_RESET_STREAK {
                scroller = self.reset_view(scroller).await;
            }
        }
    }

    async fn log_scroll_position(&self, scroller: &Element) {
        if let Some(pos) = js_value(
            scroller,
            "function() { return [this.scrollTop, this.scrollHeight]; }",
        )
        .await
        {
            debug!("Scroll attempt {}: position {}", self.attempts, pos);
        } else {
            debug!("Scroll attempt {}", self.attempts);
        }
    }

    /// Fallback chain of scroll methods; the first one that does not
    /// error wins. A total miss is logged, not escalated — the settle +
    /// re-enumerate step still runs.
    async fn scroll_once(&self, scroller: &Element) {
        let distance = scroll_distance(self.attempts);

        if scroller
            .call_js_fn(
                format!(
                    "function() {{ this.scrollBy({{top: {distance}, behavior: 'smooth'}}); }}"
                ),
                false,
            )
            .await
            .is_ok()
        {
            debug!("Scrolled down by {}px", distance);
            return;
        }

        if scroller
            .call_js_fn(
                "function() { this.scrollTo({top: this.scrollTop + 1000, behavior: 'smooth'}); }",
                false,
            )
            .await
            .is_ok()
        {
            debug!("Scrolled to absolute position");
            return;
        }

        match self.page_down_keys(scroller).await {
            Ok(()) => {
                debug!("Scrolled with PageDown keys");
                return;
            }
            Err(e) => debug!("Key-based scroll failed: {:#}", e),
        }

        let direct = scroller
            .call_js_fn(
                "function() {\n\
                     this.scrollTop = this.scrollTop + 1000;\n\
                     document.documentElement.scrollTop += 1000;\n\
                     window.scrollTo(0, window.scrollY + 1000);\n\
                 }",
                false,
            )
            .await;
        if let Err(e) = direct {
            warn!("All scroll methods failed this cycle: {}", e);
        }
    }

    async fn page_down_keys(&self, scroller: &Element) -> Result<()> {
        scroller
            .focus()
            .await
            .map_err(|e| anyhow!("focus failed: {}", e))?;
        for _ in 0..3 {
            for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
                let params = DispatchKeyEventParams::builder()
                    .r#type(kind)
                    .key("PageDown")
                    .code("PageDown")
                    .windows_virtual_key_code(34)
                    .native_virtual_key_code(34)
                    .build()
                    .map_err(|e| anyhow!("key event build failed: {}", e))?;
                self.session
                    .page()
                    .execute(params)
                    .await
                    .map_err(|e| anyhow!("key dispatch failed: {}", e))?;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(())
    }

    /// Click a bounded number of visible expand-text controls so the
    /// extractor sees full bodies.
    async fn expand_visible(&self) {
        let mut expanded = 0usize;
        for button in locate::expand_controls(self.session).await {
            if expanded >= config::EXPAND_BUTTONS_PER_CYCLE {
                break;
            }
            if !is_visible(&button).await {
                continue;
            }
            let _ = button.scroll_into_view().await;
            tokio::time::sleep(Duration::from_millis(200)).await;
            if js_click(&button).await {
                expanded += 1;
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        }
        if expanded > 0 {
            debug!("Expanded {} review text(s)", expanded);
        }
    }

    /// Re-enumerate, extract, admit. Element handles from this pass are
    /// never retained into the next cycle.
    async fn harvest_cycle(&self, acc: &mut Accumulator) -> usize {
        let elements = locate::review_elements(self.session).await;
        let mut new_records = 0usize;

        for (position, el) in elements.iter().enumerate() {
            let native_id = el.attribute("data-review-id").await.ok().flatten();
            let Some(record) = extract::extract_review(el).await else {
                continue;
            };
            if acc.admit(record, native_id, position) {
                new_records += 1;
                if acc.target_reached() {
                    break;
                }
            }
        }
        new_records
    }

    /// Streak-2 recovery: slam to the bottom, back up, forward again —
    /// shakes loose feeds whose lazy loader stopped observing.
    async fn aggressive_scroll(&self, scroller: &Element) {
        debug!("Trying aggressive scrolling");
        let steps = [
            "function() { this.scrollTo(0, this.scrollHeight); }",
            "function() { this.scrollBy(0, -300); }",
            "function() { this.scrollBy(0, 500); }",
        ];
        for step in steps {
            if let Err(e) = scroller.call_js_fn(step, false).await {
                debug!("Aggressive scroll step failed: {}", e);
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    /// Streak-3 recovery: synthetic off-screen click to clear any focus
    /// or overlay state, then re-resolve the container in case the old
    /// reference went stale.
    async fn reset_view(&self, current: Element) -> Element {
        debug!("Resetting page view");
        let _ = self
            .session
            .evaluate_json(
                "(function() {\n\
                     var el = document.createElement('div');\n\
                     el.setAttribute('style', 'height: 100px; width: 100px; position: absolute; left: 0; top: 0;');\n\
                     document.body.appendChild(el);\n\
                     el.click();\n\
                     document.body.removeChild(el);\n\
                     return true;\n\
                 })()",
            )
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        match locate::find_scroll_container(self.session).await {
            Some(fresh) => {
                debug!("Refreshed scroll container reference");
                fresh
            }
            None => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_distance_grows_with_attempts() {
        assert_eq!(scroll_distance(1), 1200);
        assert_eq!(scroll_distance(5), 2000);
        assert!(scroll_distance(10) > scroll_distance(9));
    }
}
