use crate::core::rng::SimRng;
use crate::core::types::{days_to_secs, SimTime};
use serde::{Deserialize, Serialize};

/// Machine part that can break
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSpec {
    pub name: String,
    /// Error code recorded on the machine when this part breaks
    pub code: i64,
    /// Relative likelihood of being the part that broke
    pub weight: f64,
    /// Complex errors wait for scheduled maintenance
    #[serde(default)]
    pub needs_maintenance: bool,
    /// Operator repair time
    #[serde(default = "default_repair_hours")]
    pub repair_hours: f64,
}

fn default_repair_hours() -> f64 {
    1.0
}

/// Built-in part catalogue used when the document declares none
pub fn default_parts() -> Vec<PartSpec> {
    let part = |name: &str, code, weight, needs_maintenance, repair_hours| PartSpec {
        name: name.to_string(),
        code,
        weight,
        needs_maintenance,
        repair_hours,
    };
    vec![
        part("part1", 201, 10.0, false, 1.0),
        part("part2", 202, 8.0, false, 2.0),
        part("part3", 203, 6.0, true, 4.0),
        part("part4", 204, 4.0, true, 8.0),
    ]
}

/// Per-machine part-failure timer.
///
/// The next failure is drawn from a normal distribution whose 5%/95% quantiles
/// are the configured min/max days between failures.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureProcess {
    min_days: f64,
    max_days: f64,
    generation: u64,
    next_at: Option<SimTime>,
    /// Part that broke while the machine was not running
    pub(crate) pending: Option<usize>,
}

impl FailureProcess {
    pub fn new(min_days: f64, max_days: f64) -> Self {
        Self {
            min_days,
            max_days,
            generation: 0,
            next_at: None,
            pending: None,
        }
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min_days, self.max_days)
    }

    /// Draw the next failure time; any previously armed timer becomes stale
    pub fn arm(&mut self, now: SimTime, rng: &mut SimRng) -> (u64, SimTime) {
        let days = rng.interval(self.min_days, self.max_days).max(0.0);
        // Never fire in the instant it was armed
        let delay = days_to_secs(days).max(1);
        self.generation += 1;
        self.next_at = Some(now + delay);
        (self.generation, delay)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn next_failure_at(&self) -> Option<SimTime> {
        self.next_at
    }

    pub fn draw_part(parts: &[PartSpec], rng: &mut SimRng) -> Option<usize> {
        let weights: Vec<f64> = parts.iter().map(|p| p.weight.max(0.0)).collect();
        rng.weighted_index(&weights)
    }

    /// Chance of an extra failure at one thermal check
    pub fn overheat_probability(thermal: f64, threshold: f64, base: f64) -> f64 {
        if thermal <= threshold {
            return 0.0;
        }
        if threshold <= 0.0 {
            return base.clamp(0.0, 1.0);
        }
        (base * thermal / threshold).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_timer_uses_midpoint() {
        let mut rng = SimRng::new(0, false);
        let mut process = FailureProcess::new(7.0, 31.0);
        let (generation, delay) = process.arm(100, &mut rng);
        assert_eq!(generation, 1);
        assert_eq!(delay, 19 * 86_400);
        assert_eq!(process.next_failure_at(), Some(100 + delay));
    }

    #[test]
    fn test_rearming_invalidates_previous() {
        let mut rng = SimRng::new(0, true);
        let mut process = FailureProcess::new(1.0, 2.0);
        let (first, _) = process.arm(0, &mut rng);
        let (second, _) = process.arm(0, &mut rng);
        assert!(!process.is_current(first));
        assert!(process.is_current(second));
    }

    #[test]
    fn test_deterministic_part_is_heaviest() {
        let mut rng = SimRng::new(0, false);
        let parts = default_parts();
        assert_eq!(FailureProcess::draw_part(&parts, &mut rng), Some(0));
        assert!(!parts[0].needs_maintenance);
        assert!(parts[3].needs_maintenance);
    }

    #[test]
    fn test_overheat_probability() {
        assert_eq!(FailureProcess::overheat_probability(5.0, 10.0, 0.1), 0.0);
        assert!((FailureProcess::overheat_probability(20.0, 10.0, 0.1) - 0.2).abs() < 1e-12);
        assert_eq!(FailureProcess::overheat_probability(500.0, 10.0, 0.1), 1.0);
    }
}
