//! Browser session management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (override → PATH → well-known paths).
//! * The descending launch-profile chain — each attempt gets a freshly
//!   constructed `BrowserConfig`, never one recycled from a failed attempt.
//! * Navigation / script-evaluation primitives the rest of the harvest
//!   engine drives the page with.
//!
//! Stealth model: process-level defaults only (pinned realistic UA, viewport,
//! `--disable-blink-features=AutomationControlled`, locale hints for the two
//! locales the source renders in). Behavioural jitter lives in the
//! pagination driver.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Element, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config;
use crate::core::types::HarvestError;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `custom` — the caller-supplied binary path, when it exists.
/// 2. `GMAPS_HARVEST_BROWSER` env var (explicit override).
/// 3. PATH scan — finds package-manager installs on all platforms.
/// 4. OS-specific well-known install paths (including the WSL-mounted
///    Windows locations the source is commonly driven from).
///
/// A `custom` path that does not exist is not fatal; we log and fall
/// through to the search chain.
pub fn find_browser_executable(custom: Option<&str>) -> Option<String> {
    if let Some(p) = custom {
        if Path::new(p).exists() {
            info!("Using browser binary at: {}", p);
            return Some(p.to_string());
        }
        warn!("Browser binary not found at {}, searching known locations", p);
    }

    if let Some(p) = config::browser_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/local/bin/chromium",
        "/mnt/c/Program Files/Google/Chrome/Application/chrome.exe",
        "/mnt/c/Program Files (x86)/Google/Chrome/Application/chrome.exe",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    for c in candidates {
        if Path::new(c).exists() {
            info!("Found browser at: {}", c);
            return Some(c.to_string());
        }
    }

    None
}

// ── Launch profiles ──────────────────────────────────────────────────────────

/// One launch attempt's worth of configuration. Profiles are tried in the
/// fixed order returned by [`launch_profiles`]; each attempt builds a fresh
/// `BrowserConfig` from its profile — a config that already went through a
/// failed launch carries stale internal state and misbehaves on reuse.
#[derive(Debug, Clone, Copy)]
pub struct LaunchProfile {
    /// Chrome major version baked into the user-agent, `None` = unpinned.
    pub chrome_major: Option<u32>,
    pub extra_args: &'static [&'static str],
}

impl LaunchProfile {
    pub fn user_agent(&self) -> String {
        let major = self.chrome_major.unwrap_or(135);
        format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/{major}.0.0.0 Safari/537.36"
        )
    }
}

/// Descending profile chain: newest pinned version first, then an older pin
/// with first-run suppression flags, then an unpinned last resort.
pub fn launch_profiles() -> [LaunchProfile; 3] {
    [
        LaunchProfile {
            chrome_major: Some(136),
            extra_args: &[],
        },
        LaunchProfile {
            chrome_major: Some(135),
            extra_args: &["--no-first-run", "--no-service-autorun", "--password-store=basic"],
        },
        LaunchProfile {
            chrome_major: None,
            extra_args: &[],
        },
    ]
}

/// Build a fresh `BrowserConfig` for one launch attempt.
///
/// Flags chosen for:
/// * Compatibility with CI / restricted environments (`--no-sandbox`,
///   `--disable-dev-shm-usage`).
/// * Stealth — `--disable-blink-features=AutomationControlled` hides the
///   `navigator.webdriver` flag.
/// * Locale bias toward the source's two expected render locales.
fn build_config(profile: &LaunchProfile, exe: &str, headless: bool) -> Result<BrowserConfig> {
    let ua = profile.user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1920,
            height: 1080,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1920, 1080)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--lang=id")
        .arg("--accept-lang=id-ID,id")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    for extra in profile.extra_args {
        builder = builder.arg(*extra);
    }

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// An exclusively-owned live browser session. One per harvest invocation;
/// closed on every exit path by the lifecycle supervisor.
pub struct Session {
    browser: Browser,
    page: Page,
    handler: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Acquire a session, walking the launch-profile chain until one
    /// succeeds. Exhausting all profiles is the engine's only fatal error.
    pub async fn open(headless: bool, custom_binary: Option<&str>) -> Result<Self, HarvestError> {
        let exe = find_browser_executable(custom_binary).ok_or_else(|| {
            HarvestError::SessionInit(
                "no browser executable found; install Chrome/Chromium or set GMAPS_HARVEST_BROWSER"
                    .to_string(),
            )
        })?;

        let mut last_error = String::new();
        for profile in launch_profiles() {
            match Self::try_launch(&profile, &exe, headless).await {
                Ok(session) => {
                    info!(
                        "Browser session started (chrome_major={:?}, headless={})",
                        profile.chrome_major, headless
                    );
                    return Ok(session);
                }
                Err(e) => {
                    warn!(
                        "Launch attempt failed (chrome_major={:?}): {:#}",
                        profile.chrome_major, e
                    );
                    last_error = format!("{e:#}");
                }
            }
        }

        Err(HarvestError::SessionInit(format!(
            "all launch profiles exhausted; last error: {last_error}"
        )))
    }

    async fn try_launch(profile: &LaunchProfile, exe: &str, headless: bool) -> Result<Self> {
        // Fresh config per attempt, never reused.
        let cfg = build_config(profile, exe, headless)?;
        let (browser, mut handler) = Browser::launch(cfg)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open page: {}", e))?;

        Ok(Self {
            browser,
            page,
            handler: handle,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("Failed to navigate to {}: {}", url, e))?;
        Ok(())
    }

    pub async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    /// Evaluate a JS expression, best-effort, into a JSON value.
    pub async fn evaluate_json(&self, expr: &str) -> Option<serde_json::Value> {
        self.page
            .evaluate(expr)
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
    }

    /// `querySelectorAll` scoped to the page; strategy callers treat an
    /// error the same as an empty result set.
    pub async fn query_all(&self, selector: &str) -> Vec<Element> {
        self.page.find_elements(selector).await.unwrap_or_default()
    }

    /// Best-effort cookie/consent acceptance after first navigation. The
    /// dialog renders in either expected locale or not at all.
    pub async fn accept_consent(&self) {
        let labels = ["accept all", "i agree", "accept", "agree", "setuju", "ok"];
        for button in self.query_all("button").await {
            let text = match button.inner_text().await {
                Ok(Some(t)) => t.trim().to_lowercase(),
                _ => continue,
            };
            if text.len() > 40 || !labels.iter().any(|l| text.contains(l)) {
                continue;
            }
            if !super::locate::is_visible(&button).await {
                continue;
            }
            if button.click().await.is_ok() {
                info!("Accepted consent dialog (\"{}\")", text);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            break;
        }
    }

    /// Release the browser. The supervisor runs this on every exit path;
    /// close errors are logged and swallowed.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        self.handler.abort();
        info!("Browser session released");
    }
}
