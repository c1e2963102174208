//! Progress figures derived from a stored offset and duration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartMode {
    FromStart,
    Continue,
}

/// Whole-percent progress, clamped to `0..=100`. Unknown or non-positive
/// inputs read as no progress.
pub fn progress_percent(position_secs: Option<i64>, duration_ms: Option<i64>) -> u8 {
    let (Some(position), Some(duration)) = (position_secs, duration_ms) else {
        return 0;
    };
    if position <= 0 || duration <= 0 {
        return 0;
    }

    let percent = i128::from(position) * 1000 * 100 / i128::from(duration);
    percent.min(100) as u8
}

pub fn is_finished(position_secs: Option<i64>, duration_ms: Option<i64>) -> bool {
    progress_percent(position_secs, duration_ms) >= 100
}

/// Finished items and items without a stored offset restart from zero.
pub fn default_start_mode(position_secs: Option<i64>, duration_ms: Option<i64>) -> StartMode {
    let has_offset = position_secs.map(|p| p > 0).unwrap_or(false);
    if !has_offset || is_finished(position_secs, duration_ms) {
        StartMode::FromStart
    } else {
        StartMode::Continue
    }
}
