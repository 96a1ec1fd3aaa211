//! Utility functions shared across the service.

use chrono::{DateTime, Local, Timelike};

/// Format a timestamp as the Korean clock label shown in chat bubbles,
/// e.g. "오후 2:30".
pub fn clock_label(t: DateTime<Local>) -> String {
    let (is_pm, hour) = t.hour12();
    let meridiem = if is_pm { "오후" } else { "오전" };
    format!("{} {}:{:02}", meridiem, hour, t.minute())
}

/// Clock label for the current local time.
pub fn now_clock_label() -> String {
    clock_label(Local::now())
}
