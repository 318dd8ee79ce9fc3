//! Utilities module for logging, errors, meters and charts
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types
//! - Running-average meters for iteration logs
//! - SVG curve charts for ROC / PR diagnostics

pub mod charts;
pub mod error;
pub mod logging;
pub mod meters;

pub use error::{DaError, Result};
pub use logging::init_logging;
pub use meters::{AverageMeter, ProgressMeter};

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Render a vector of floats the way the experiment logs print them
pub fn format_vector(values: &[f32], precision: usize) -> String {
    let items: Vec<String> = values
        .iter()
        .map(|v| format!("{:.p$}", v, p = precision))
        .collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.5), "30.5s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(3661.0), "1h 1m");
    }

    #[test]
    fn test_format_vector() {
        assert_eq!(format_vector(&[1.0, 0.0, 0.5], 1), "[1.0, 0.0, 0.5]");
        assert_eq!(format_vector(&[], 2), "[]");
    }
}
