//! Progress indicators for drupid CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui;

/// Start a spinner with a message. Hidden when `quiet` is set.
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Clear the spinner and print a success line
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    ui::success(msg);
}

/// Clear the spinner and print an error line
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    ui::error(msg);
}
