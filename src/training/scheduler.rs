//! Learning Rate Scheduler Module
//!
//! Step-level schedules. Every optimizer owns a `StepwiseLr` that is advanced
//! once per optimizer step.

use serde::{Deserialize, Serialize};

/// Learning rate as a function of the step count
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LRScheduler {
    /// Constant learning rate (no scheduling)
    Constant { lr: f64 },

    /// Inverse decay: `lr = initial_lr * (1 + gamma * step)^(-decay_rate)`
    InverseDecay {
        initial_lr: f64,
        gamma: f64,
        decay_rate: f64,
    },
}

impl LRScheduler {
    pub fn constant(lr: f64) -> Self {
        Self::Constant { lr }
    }

    /// The adaptation schedule: gamma 0.001, decay 0.75
    pub fn inverse_decay(initial_lr: f64) -> Self {
        Self::InverseDecay {
            initial_lr,
            gamma: 0.001,
            decay_rate: 0.75,
        }
    }

    pub fn get_lr(&self, step: usize) -> f64 {
        match self {
            Self::Constant { lr } => *lr,
            Self::InverseDecay {
                initial_lr,
                gamma,
                decay_rate,
            } => initial_lr * (1.0 + gamma * step as f64).powf(-decay_rate),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Constant { lr } => format!("Constant LR: {:.6}", lr),
            Self::InverseDecay {
                initial_lr,
                gamma,
                decay_rate,
            } => format!(
                "Inverse decay: initial={:.6}, gamma={}, decay={}",
                initial_lr, gamma, decay_rate
            ),
        }
    }
}

/// A schedule plus its own step counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepwiseLr {
    scheduler: LRScheduler,
    step: usize,
}

impl StepwiseLr {
    pub fn new(scheduler: LRScheduler) -> Self {
        Self { scheduler, step: 0 }
    }

    /// Learning rate for the current step, then advance
    pub fn next_lr(&mut self) -> f64 {
        let lr = self.scheduler.get_lr(self.step);
        self.step += 1;
        lr
    }

    pub fn current_lr(&self) -> f64 {
        self.scheduler.get_lr(self.step)
    }

    pub fn step_count(&self) -> usize {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_scheduler() {
        let scheduler = LRScheduler::constant(0.001);
        assert_eq!(scheduler.get_lr(0), 0.001);
        assert_eq!(scheduler.get_lr(5000), 0.001);
    }

    #[test]
    fn test_inverse_decay_values() {
        let scheduler = LRScheduler::inverse_decay(0.01);
        assert_eq!(scheduler.get_lr(0), 0.01);
        // (1 + 1)^-0.75
        assert!((scheduler.get_lr(1000) - 0.01 * 2f64.powf(-0.75)).abs() < 1e-12);

        let mut prev = f64::INFINITY;
        for step in (0..20_000).step_by(500) {
            let lr = scheduler.get_lr(step);
            assert!(lr < prev);
            assert!(lr > 0.0);
            prev = lr;
        }
    }

    #[test]
    fn test_stepwise_counter() {
        let mut lr = StepwiseLr::new(LRScheduler::inverse_decay(0.1));
        assert_eq!(lr.next_lr(), 0.1);
        assert_eq!(lr.step_count(), 1);
        assert!(lr.current_lr() < 0.1);
    }

    #[test]
    fn test_description() {
        let text = LRScheduler::inverse_decay(0.01).description();
        assert!(text.starts_with("Inverse decay"));
        assert!(text.contains("0.75"));
    }
}
