// src/utils/log.rs

//! Console report helpers for CLI runs.
//!
//! Thin wrappers over the `log` facade with the run-report formatting
//! (headers, steps, aligned summaries) used by the pipeline.

/// Log a debug message.
pub fn debug(message: &str) {
    log::debug!("{}", message);
}

/// Log an info message.
pub fn info(message: &str) {
    log::info!("{}", message);
}

/// Log a warning message.
pub fn warn(message: &str) {
    log::warn!("{}", message);
}

/// Log an error message.
pub fn error(message: &str) {
    log::error!("{}", message);
}

/// Log a success message.
pub fn success(message: &str) {
    log::info!("✓ {}", message);
}

/// Log a step in a multi-step run.
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log a header.
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented).
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section.
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for line in summary_lines(items) {
        log::info!("{}", line);
    }
}

fn summary_lines(items: &[(&str, String)]) -> Vec<String> {
    let width = items.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    items
        .iter()
        .map(|(key, value)| format!("    {:<width$} : {}", key, value, width = width))
        .collect()
}
