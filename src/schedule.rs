//! Inverse-power learning-rate decay.

/// `lr(iter) = base_lr * (1 + gamma * iter)^(-power)`.
///
/// The iteration index is passed explicitly on every lookup; the schedule
/// itself holds no mutable state. Parameter groups layer their own fixed
/// multipliers on top of the decayed rate.
#[derive(Debug, Clone, Copy)]
pub struct InvLrSchedule {
    pub base_lr: f64,
    pub gamma: f64,
    pub power: f64,
}

impl InvLrSchedule {
    pub fn new(base_lr: f64, gamma: f64, power: f64) -> Self {
        Self {
            base_lr,
            gamma,
            power,
        }
    }

    /// Decayed rate at iteration `iter` for a group with multiplier `mult`.
    pub fn lr(&self, iter: usize, mult: f64) -> f64 {
        self.base_lr * mult * (1.0 + self.gamma * iter as f64).powf(-self.power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_base_lr() {
        let s = InvLrSchedule::new(0.1, 0.001, 0.75);
        assert!((s.lr(0, 1.0) - 0.1).abs() < 1e-12);
        assert!((s.lr(0, 10.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn strictly_decreasing() {
        let s = InvLrSchedule::new(0.1, 0.001, 0.75);
        let mut prev = f64::INFINITY;
        for i in 0..1000 {
            let lr = s.lr(i, 1.0);
            assert!(lr < prev, "lr increased at iter {i}");
            prev = lr;
        }
    }
}
