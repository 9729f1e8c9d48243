// src/utils/log.rs

//! Formatted progress output on top of the `log` facade.
//!
//! Keeps run logs readable in CI job output: banners around a run,
//! numbered steps and an aligned summary block.

/// Log a step in a process
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("{}", format_step(step_num, total, message));
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(60);
    log::info!("{border}");
    log::info!("  {title}");
    log::info!("{border}");
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {message}");
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    for line in format_summary(title, items) {
        log::info!("{line}");
    }
}

fn format_step(step_num: usize, total: usize, message: &str) -> String {
    format!("[STEP {step_num}/{total}] {message}")
}

fn format_summary(title: &str, items: &[(&str, String)]) -> Vec<String> {
    let width = items.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut lines = vec![format!("[SUMMARY] {title}")];
    lines.extend(
        items
            .iter()
            .map(|(key, value)| format!("    {key:<width$} : {value}")),
    );
    lines
}
