//! Progress indicators for tierctl.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

/// Start a spinner with a message.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}").expect("static template"),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(msg.to_string());
    pb
}

/// Finish a spinner with a success message.
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    ui::success(msg);
}

/// Finish a spinner with an error message.
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    ui::error(msg);
}
