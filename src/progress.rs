//! Process-wide switch for the progress bars drawn while loading.
//!
//! Bars are on by default; `main` turns them off once at startup unless the
//! user asks for them.

use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressStyle};

static PROGRESS_BARS: AtomicBool = AtomicBool::new(true);

pub fn disable_progress_bars() {
    PROGRESS_BARS.store(false, Ordering::Relaxed);
}

pub fn enable_progress_bars() {
    PROGRESS_BARS.store(true, Ordering::Relaxed);
}

pub fn progress_bars_enabled() -> bool {
    PROGRESS_BARS.load(Ordering::Relaxed)
}

/// A bar of `len` steps, or a hidden one when bars are disabled.
pub fn progress_bar(len: u64, message: &str) -> ProgressBar {
    if !progress_bars_enabled() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg:20} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bars_are_hidden() {
        disable_progress_bars();
        assert!(!progress_bars_enabled());
        assert!(progress_bar(10, "loading").is_hidden());
        enable_progress_bars();
        assert!(progress_bars_enabled());
    }
}
