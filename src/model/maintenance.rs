use super::machine::{codes, Machine, MachineCtx, MachineEvent, MachineState};
use crate::core::types::SimTime;
use log::info;
use serde::{Deserialize, Serialize};

/// Failure and maintenance profile of a machine as declared in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceProfile {
    /// Days between part failures, as a 5%/95% interval
    #[serde(alias = "part-fail-freq-days")]
    pub part_fail_freq_days: [f64; 2],
}

impl Default for MaintenanceProfile {
    fn default() -> Self {
        Self {
            part_fail_freq_days: [7.0, 31.0],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceState {
    pub active: bool,
    pub since: Option<SimTime>,
    pub completed: u64,
    /// Whether the machine was in error when the window opened
    pub(crate) repairs_error: bool,
}

impl Machine {
    /// Maintenance window opens: the machine is switched off immediately
    pub(crate) fn begin_maintenance(&mut self, ctx: &mut MachineCtx<'_>) {
        if self.maintenance.active {
            return;
        }
        info!(
            "[Machine {}] {} Maintenance started",
            self.id,
            ctx.clock.datetime(ctx.now)
        );
        self.maintenance.active = true;
        self.maintenance.since = Some(ctx.now);
        self.maintenance.repairs_error = self.error.is_some();
        self.force_off(codes::FORCED + codes::MANUAL_SWITCH_OFF, ctx);
    }

    /// Maintenance window closes: thermal load, failure timer and errors are reset
    pub(crate) fn end_maintenance(&mut self, ctx: &mut MachineCtx<'_>) {
        if !self.maintenance.active {
            return;
        }
        self.maintenance.active = false;
        self.maintenance.since = None;
        self.maintenance.completed += 1;
        self.thermal = 0.0;
        self.failure.pending = None;
        let (generation, delay) = self.failure.arm(ctx.now, ctx.rng);
        ctx.outbox.push((MachineEvent::PartFailure { generation }, delay));

        let cleared = self.clear_error() || self.maintenance.repairs_error;
        self.maintenance.repairs_error = false;
        info!(
            "[Machine {}] {} Maintenance finished{}",
            self.id,
            ctx.clock.datetime(ctx.now),
            if cleared { ", error cleared" } else { "" }
        );
        if cleared {
            // A repaired machine is handed back powered on
            self.set_state(MachineState::On, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::SimRng;
    use crate::core::types::Clock;
    use crate::model::failure::{default_parts, FailureProcess};
    use crate::model::machine::MachineSettings;
    use crate::model::program::ProgramBook;
    use chrono::NaiveDate;

    fn with_ctx<R>(now: SimTime, f: impl FnOnce(&mut MachineCtx<'_>) -> R) -> R {
        let book = ProgramBook::new();
        let parts = default_parts();
        let mut rng = SimRng::new(0, false);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut ctx = MachineCtx {
            now,
            clock: Clock::new(start),
            step_secs: 60,
            book: &book,
            containers: &mut [],
            parts: &parts,
            rng: &mut rng,
            outbox: Vec::new(),
            replenished: Vec::new(),
        };
        f(&mut ctx)
    }

    fn machine() -> Machine {
        Machine::new(
            "m1",
            vec![],
            None,
            FailureProcess::new(7.0, 31.0),
            MachineSettings::default(),
        )
    }

    #[test]
    fn test_maintenance_forces_off_and_resets() {
        let mut m = machine();
        with_ctx(0, |ctx| m.set_state(MachineState::On, ctx));
        m.thermal = 12.5;

        with_ctx(100, |ctx| m.begin_maintenance(ctx));
        assert_eq!(m.state(), MachineState::Off);
        assert!(m.under_maintenance());

        let outbox = with_ctx(200, |ctx| {
            m.end_maintenance(ctx);
            std::mem::take(&mut ctx.outbox)
        });
        assert!(!m.under_maintenance());
        assert_eq!(m.thermal(), 0.0);
        assert_eq!(m.state(), MachineState::Off);
        assert_eq!(m.maintenance().completed, 1);
        assert!(matches!(outbox[0].0, MachineEvent::PartFailure { .. }));
        assert_eq!(m.failure_process().next_failure_at(), Some(200 + 19 * 86_400));
    }

    #[test]
    fn test_maintenance_clears_complex_error() {
        let mut m = machine();
        with_ctx(0, |ctx| m.set_state(MachineState::On, ctx));
        // part4 needs maintenance
        with_ctx(10, |ctx| m.fail_part(3, ctx));
        assert_eq!(m.state(), MachineState::Error);

        with_ctx(20, |ctx| m.begin_maintenance(ctx));
        assert_eq!(m.state(), MachineState::Off);
        with_ctx(30, |ctx| m.end_maintenance(ctx));
        assert_eq!(m.state(), MachineState::On);
        assert!(m.error().is_none());
    }
}
