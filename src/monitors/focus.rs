//! Active window tracking.

use std::process::Command;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::storage::{append_journal, kinds, Database};
use crate::Result;

/// How often the focus monitor polls the active window.
pub const FOCUS_INTERVAL: Duration = Duration::from_secs(5);

/// Recorded when no meaningful window has focus.
pub const UNKNOWN_FOCUS: &str = "unknown or idle";

/// Titles the desktop shell reports when nothing in particular is focused.
const SHELL_TITLES: &[&str] = &["Desktop", "Program Manager"];

/// Source of the focused window's title.
pub trait FocusProbe: Send {
    /// Title of the focused window, or `None` if nothing is focused.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform query fails.
    fn active_title(&mut self) -> Result<Option<String>>;
}

/// Normalize a raw title, mapping empty and shell titles to [`UNKNOWN_FOCUS`].
#[must_use]
pub fn clean_title(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(title) if !title.is_empty() && !SHELL_TITLES.contains(&title) => title.to_string(),
        _ => UNKNOWN_FOCUS.to_string(),
    }
}

/// X11 probe that shells out to `xdotool`.
///
/// Any failure, including a missing binary or no display, reads as no focus.
#[derive(Debug, Default, Clone, Copy)]
pub struct XdotoolProbe;

impl FocusProbe for XdotoolProbe {
    fn active_title(&mut self) -> Result<Option<String>> {
        let output = match Command::new("xdotool")
            .args(["getactivewindow", "getwindowname"])
            .output()
        {
            Ok(output) if output.status.success() => output,
            Ok(_) => return Ok(None),
            Err(e) => {
                tracing::trace!(error = %e, "xdotool unavailable");
                return Ok(None);
            }
        };
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

/// Journals `window-focus-changed` each time the focused title changes.
pub struct FocusMonitor {
    probe: Box<dyn FocusProbe>,
    last_title: Option<String>,
    interval: Duration,
}

impl FocusMonitor {
    #[must_use]
    pub fn new(probe: Box<dyn FocusProbe>) -> Self {
        Self {
            probe,
            last_title: None,
            interval: FOCUS_INTERVAL,
        }
    }

    /// Override the polling interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Last title recorded, if any.
    #[must_use]
    pub fn last_title(&self) -> Option<&str> {
        self.last_title.as_deref()
    }

    /// Poll once; journal the title if it differs from the previous one.
    ///
    /// A failing probe reads as [`UNKNOWN_FOCUS`].
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn tick(&mut self, db: &Database) -> Result<Option<i64>> {
        let raw = self.probe.active_title().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Focus probe failed");
            None
        });
        let title = clean_title(raw.as_deref());

        if self.last_title.as_deref() == Some(title.as_str()) {
            return Ok(None);
        }

        let id = db.with_conn(|conn| {
            append_journal(conn, kinds::WINDOW_FOCUS_CHANGED, &title, None, None)
        })?;
        tracing::debug!(%title, "Focus changed");
        self.last_title = Some(title);
        Ok(Some(id))
    }

    /// Poll on every interval until `shutdown` fires.
    pub async fn run(self, db: Database, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Focus monitor started");

        let mut monitor = self;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => match monitor.tick_blocking(&db).await {
                    Some(next) => monitor = next,
                    None => break,
                },
            }
        }

        tracing::info!("Focus monitor stopped");
    }

    /// Poll on the blocking pool; the probe spawns a process and waits on it.
    /// `None` if the blocking task died.
    async fn tick_blocking(mut self, db: &Database) -> Option<Self> {
        let db = db.clone();
        let polled = tokio::task::spawn_blocking(move || {
            let result = self.tick(&db);
            (self, result)
        })
        .await;

        match polled {
            Ok((monitor, result)) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to record focus change");
                }
                Some(monitor)
            }
            Err(e) => {
                tracing::error!(error = %e, "Focus poll task failed");
                None
            }
        }
    }
}
