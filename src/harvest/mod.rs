//! The harvesting engine.
//!
//! `harvest()` is total over valid addresses: after a session is
//! acquired, every failure mode — stalled progress, exhausted attempts,
//! elapsed time budget, external interruption, unclassified mid-loop
//! errors — degrades to "return whatever was accumulated". Only address
//! validation and session acquisition can surface an error, and both
//! happen before any page state exists.

pub mod dedup;
pub mod extract;
pub mod locate;
pub mod output;
pub mod scroll;
pub mod session;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::core::config;
use crate::core::types::{HarvestError, HarvestRequest, ReviewRecord};
use dedup::Accumulator;
use scroll::{PaginationDriver, StopReason};
use session::Session;

// ── Cancellation handle ──────────────────────────────────────────────────────

/// Cloneable manual-interruption handle. Tripping it short-circuits the
/// scroll loop at the next cycle boundary; partial results are still
/// returned and the session still released — interruption is a terminal
/// state, not an error.
#[derive(Clone, Default)]
pub struct Interrupt {
    tripped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            info!("Harvest interruption requested");
            self.notify.notify_waiters();
        }
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        // Register with the notifier before checking the flag so a trip
        // landing in between is not missed.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_tripped() {
            return;
        }
        notified.await;
    }
}

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HarvestOptions {
    pub target_count: usize,
    pub settle_seconds: f64,
    pub max_attempts: u32,
    pub headless: bool,
    pub browser_path: Option<String>,
    pub output_path: Option<PathBuf>,
    /// Overall wall-clock budget for the whole harvest.
    pub overall_timeout: Duration,
    pub interrupt: Option<Interrupt>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            target_count: 10,
            settle_seconds: 5.0,
            max_attempts: 30,
            headless: true,
            browser_path: None,
            output_path: None,
            overall_timeout: Duration::from_secs(config::overall_timeout_secs()),
            interrupt: None,
        }
    }
}

impl From<&HarvestRequest> for HarvestOptions {
    fn from(req: &HarvestRequest) -> Self {
        Self {
            target_count: req.target_count,
            settle_seconds: req.settle_seconds,
            max_attempts: req.max_attempts,
            headless: req.headless,
            browser_path: req.browser_path.clone(),
            output_path: req.output_path.as_ref().map(PathBuf::from),
            ..Self::default()
        }
    }
}

// ── Address validation ───────────────────────────────────────────────────────

/// Reject anything outside the two accepted address-prefix families
/// before a session is opened. No side effects on rejection.
pub fn validate_address(address: &str) -> Result<(), HarvestError> {
    let trimmed = address.trim();
    if config::ACCEPTED_ADDRESS_PREFIXES
        .iter()
        .any(|p| trimmed.starts_with(p))
    {
        Ok(())
    } else {
        Err(HarvestError::InvalidAddress(address.to_string()))
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Harvest reviews for one place address. Returns the deduplicated record
/// sequence in acceptance order, truncated to `target_count`.
pub async fn harvest(
    address: &str,
    opts: HarvestOptions,
) -> Result<Vec<ReviewRecord>, HarvestError> {
    validate_address(address)?;

    info!("Starting review collection for: {}", address);
    let session = Session::open(opts.headless, opts.browser_path.as_deref()).await?;

    let records = supervise(session, address, &opts).await;

    if let Some(path) = &opts.output_path {
        if let Err(e) = output::write_reviews(path, &records).await {
            warn!("Failed to persist reviews (results still returned): {:#}", e);
        }
    }

    info!("Harvest finished with {} unique reviews", records.len());
    Ok(records)
}

// ── Lifecycle supervision ────────────────────────────────────────────────────

/// Run the drive loop under the overall time budget and the interruption
/// handle. Whatever the exit path — normal stop, timeout, interrupt,
/// unclassified failure — the session is released and the accumulated
/// records are returned.
async fn supervise(session: Session, address: &str, opts: &HarvestOptions) -> Vec<ReviewRecord> {
    let mut acc = Accumulator::new(opts.target_count);
    let interrupt = opts.interrupt.clone();

    let drove = {
        let driven = drive(&session, address, opts, &mut acc, interrupt.as_ref());
        match &interrupt {
            Some(int) => {
                tokio::select! {
                    res = tokio::time::timeout(opts.overall_timeout, driven) => res,
                    // Cancellation point between cycles; the driver also
                    // polls the flag so an in-cycle trip stops promptly.
                    () = int.wait() => {
                        warn!("Harvest interrupted; saving reviews collected so far");
                        Ok(Ok(StopReason::Interrupted))
                    }
                }
            }
            None => tokio::time::timeout(opts.overall_timeout, driven).await,
        }
    };

    match drove {
        Err(_elapsed) => warn!(
            "Time budget ({:?}) elapsed; keeping {} collected reviews",
            opts.overall_timeout,
            acc.len()
        ),
        Ok(Err(e)) => warn!(
            "Error during review collection: {:#}; saving reviews collected so far",
            e
        ),
        Ok(Ok(reason)) => info!(?reason, collected = acc.len(), "Scrolling complete"),
    }

    // Unconditional on every exit path.
    session.close().await;
    acc.into_records()
}

/// One pass of the harvest pipeline: navigate, consent, find the reviews
/// panel, resolve the scroll container, then hand control to the
/// pagination driver.
/// Settle wait, bounded to a sane window. Wire input is attacker-shaped:
/// a huge or non-finite `settle_seconds` must not be able to panic
/// `Duration` construction after the session is already open.
fn settle_duration(secs: f64) -> Duration {
    if secs.is_finite() {
        Duration::from_secs_f64(secs.clamp(0.0, 600.0))
    } else {
        Duration::from_secs_f64(5.0)
    }
}

async fn drive(
    session: &Session,
    address: &str,
    opts: &HarvestOptions,
    acc: &mut Accumulator,
    interrupt: Option<&Interrupt>,
) -> anyhow::Result<StopReason> {
    let settle = settle_duration(opts.settle_seconds);

    session.goto(address).await?;
    info!("URL loaded, waiting for page to initialize");
    tokio::time::sleep(Duration::from_secs(5)).await;

    session.accept_consent().await;

    if !locate::open_reviews_panel(session).await {
        warn!("Could not open the reviews panel through any strategy");
    }
    if !locate::reviews_present(session).await {
        // Not an error: an empty result set is the defined outcome when
        // a target's strategies are exhausted.
        info!("No reviews found after navigation attempts");
        return Ok(StopReason::Stalled);
    }

    let Some(scroller) = locate::find_scroll_container(session).await else {
        info!("No scrollable container resolved");
        return Ok(StopReason::Stalled);
    };

    let driver = PaginationDriver::new(session, settle, opts.max_attempts);
    driver.run(scroller, acc, interrupt).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_page_addresses_accepted() {
        assert!(validate_address("https://www.google.com/maps/place/Warung+Sate/@-6.2,106.8,17z").is_ok());
        assert!(validate_address("https://maps.app.goo.gl/AbCdEf123").is_ok());
    }

    #[test]
    fn foreign_addresses_rejected() {
        assert!(matches!(
            validate_address("https://example.com/not-maps"),
            Err(HarvestError::InvalidAddress(_))
        ));
        assert!(matches!(
            validate_address("http://www.google.com/maps/place/x"),
            Err(HarvestError::InvalidAddress(_))
        ));
        // Maps URLs that are not place pages stay outside the gate.
        assert!(matches!(
            validate_address("https://www.google.com/maps/search/warung+sate"),
            Err(HarvestError::InvalidAddress(_))
        ));
        assert!(matches!(
            validate_address("https://www.google.com/maps/@-6.2,106.8,15z"),
            Err(HarvestError::InvalidAddress(_))
        ));
        assert!(matches!(
            validate_address(""),
            Err(HarvestError::InvalidAddress(_))
        ));
    }

    #[test]
    fn settle_values_from_the_wire_never_panic() {
        // Any JSON-legal number must yield a usable duration.
        let req: HarvestRequest = serde_json::from_str(
            r#"{"url": "https://maps.app.goo.gl/x", "settle_seconds": 1e300}"#,
        )
        .unwrap();
        let opts = HarvestOptions::from(&req);
        assert_eq!(settle_duration(opts.settle_seconds), Duration::from_secs(600));

        assert_eq!(settle_duration(-3.0), Duration::ZERO);
        assert_eq!(settle_duration(f64::NAN), Duration::from_secs(5));
        assert_eq!(settle_duration(f64::INFINITY), Duration::from_secs(5));
        assert_eq!(settle_duration(5.0), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn interrupt_trips_once_and_wakes_waiters() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_tripped());

        let waiter = interrupt.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        interrupt.trip();
        interrupt.trip(); // idempotent
        assert!(interrupt.is_tripped());
        handle.await.unwrap();

        // A late waiter returns immediately.
        interrupt.wait().await;
    }
}
