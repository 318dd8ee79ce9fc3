//! Running-average meters for iteration logging

use std::fmt;

/// Tracks the latest value and a sample-weighted running average
#[derive(Debug, Clone)]
pub struct AverageMeter {
    name: &'static str,
    precision: usize,
    pub val: f64,
    pub sum: f64,
    pub count: usize,
}

impl AverageMeter {
    pub fn new(name: &'static str, precision: usize) -> Self {
        Self {
            name,
            precision,
            val: 0.0,
            sum: 0.0,
            count: 0,
        }
    }

    /// Record `val` observed over `n` samples
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn reset(&mut self) {
        self.val = 0.0;
        self.sum = 0.0;
        self.count = 0;
    }
}

impl fmt::Display for AverageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.p$} ({:.p$})",
            self.name,
            self.val,
            self.avg(),
            p = self.precision
        )
    }
}

/// Prints `prefix [i/N] meter | meter | ...` lines through tracing
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    num_batches: usize,
    prefix: String,
}

impl ProgressMeter {
    pub fn new(num_batches: usize, prefix: impl Into<String>) -> Self {
        Self {
            num_batches,
            prefix: prefix.into(),
        }
    }

    pub fn line(&self, batch: usize, meters: &[&AverageMeter]) -> String {
        let width = self.num_batches.to_string().len();
        let mut out = format!(
            "{}[{:>w$}/{}]",
            self.prefix,
            batch,
            self.num_batches,
            w = width
        );
        for meter in meters {
            out.push('\t');
            out.push_str(&meter.to_string());
        }
        out
    }

    pub fn display(&self, batch: usize, meters: &[&AverageMeter]) {
        tracing::info!("{}", self.line(batch, meters));
    }
}
