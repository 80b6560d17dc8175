//! Progress reporting for long-running drivers.
//!
//! A process-wide flag selects the default; individual runs can override it
//! through their options. All bars attach to one shared [`MultiProgress`] so
//! parallel chains render cleanly instead of interleaving on stderr.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

static PROGRESS: AtomicBool = AtomicBool::new(true);

/// Enables or disables progress logging process-wide.
pub fn set_progress(enabled: bool) {
    PROGRESS.store(enabled, Ordering::Relaxed);
}

/// Returns the current process-wide progress default.
pub fn progress_enabled() -> bool {
    PROGRESS.load(Ordering::Relaxed)
}

fn multi() -> &'static MultiProgress {
    static MULTI: OnceLock<MultiProgress> = OnceLock::new();
    MULTI.get_or_init(MultiProgress::new)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap()
        .progress_chars("##-")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix} [{elapsed_precise}] {spinner} {pos} {msg}")
        .unwrap()
}

/// A throttled position reporter wrapping an [`indicatif`] bar.
///
/// Updates are emitted at roughly 0.5% granularity (threshold `total / 200`)
/// so the hot sampling loop never spends time drawing. When reporting is
/// disabled every method is a no-op.
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    threshold: u64,
    next: u64,
}

impl ProgressReporter {
    /// A bar with a known number of iterations.
    pub fn bounded(enabled: bool, name: &str, total: u64) -> Self {
        let bar = enabled.then(|| {
            let bar = multi().add(ProgressBar::new(total));
            bar.set_style(bar_style());
            bar.set_prefix(name.to_string());
            bar
        });
        let threshold = (total / 200).max(1);
        Self {
            bar,
            threshold,
            next: threshold,
        }
    }

    /// A spinner for runs whose length is not known up front
    /// (convergence-predicate driven sampling).
    pub fn unbounded(enabled: bool, name: &str) -> Self {
        let bar = enabled.then(|| {
            let bar = multi().add(ProgressBar::new_spinner());
            bar.set_style(spinner_style());
            bar.set_prefix(name.to_string());
            bar
        });
        Self {
            bar,
            threshold: 1,
            next: 1,
        }
    }

    /// Moves the bar to `pos`, subject to the update threshold.
    pub fn update(&mut self, pos: u64) {
        if let Some(bar) = &self.bar {
            if pos >= self.next {
                bar.set_position(pos);
                self.next = pos + self.threshold;
            }
        }
    }

    /// Prints a line above the bar, or to stdout when reporting is off.
    pub fn println(&self, msg: &str) {
        match &self.bar {
            Some(bar) => bar.println(msg),
            None => println!("{msg}"),
        }
    }

    /// Finalizes the bar.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message("done");
        }
    }
}
