use super::action::Dispatch;
use super::block::{ActiveBlock, Schedule};
use crate::core::types::{Clock, ScheduleId, SimTime};
use log::{debug, info};
use std::collections::BTreeMap;

/// Block boundary on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    Start { schedule: ScheduleId, block: usize },
    End { schedule: ScheduleId, activation: u64 },
}

impl ScheduleEvent {
    fn schedule(&self) -> ScheduleId {
        match self {
            ScheduleEvent::Start { schedule, .. } | ScheduleEvent::End { schedule, .. } => *schedule,
        }
    }
}

/// What a batch of block boundaries produced
#[derive(Debug, Default, PartialEq)]
pub struct Resolution {
    /// Messages for targets, in the order they must be delivered
    pub dispatches: Vec<Dispatch>,
    /// Further boundaries with delays
    pub events: Vec<(ScheduleEvent, SimTime)>,
}

/// Evaluates every schedule's blocks against the clock and resolves overlaps
#[derive(Debug, Clone)]
pub struct Scheduler {
    schedules: Vec<Schedule>,
    clock: Clock,
    next_activation: u64,
}

impl Scheduler {
    pub fn new(schedules: Vec<Schedule>, clock: Clock) -> Self {
        Self {
            schedules,
            clock,
            next_activation: 0,
        }
    }

    pub fn schedules(&self) -> &[Schedule] {
        &self.schedules
    }

    pub fn schedule(&self, id: ScheduleId) -> Option<&Schedule> {
        self.schedules.get(id.index())
    }

    /// First occurrence of every block, as absolute times
    pub fn initial_events(&self) -> Vec<(ScheduleEvent, SimTime)> {
        let start = self.clock.start();
        let mut events = Vec::new();
        for (s, schedule) in self.schedules.iter().enumerate() {
            for (b, block) in schedule.blocks.iter().enumerate() {
                if let Some(next) = block.cron.next_at_or_after(start) {
                    events.push((
                        ScheduleEvent::Start {
                            schedule: ScheduleId(s),
                            block: b,
                        },
                        self.clock.sim_time(next),
                    ));
                }
            }
        }
        events
    }

    /// Resolve every boundary due at `now`.
    ///
    /// Ends are applied before starts. Among blocks starting together only the
    /// best ranked one can take effect; it preempts the effective block unless
    /// that block has a higher priority.
    pub fn resolve(&mut self, now: SimTime, events: Vec<ScheduleEvent>) -> Resolution {
        let mut by_schedule: BTreeMap<ScheduleId, Vec<ScheduleEvent>> = BTreeMap::new();
        for event in events {
            by_schedule.entry(event.schedule()).or_default().push(event);
        }

        let mut resolution = Resolution::default();
        for (id, events) in by_schedule {
            self.resolve_schedule(id, now, events, &mut resolution);
        }
        resolution
    }

    fn resolve_schedule(
        &mut self,
        id: ScheduleId,
        now: SimTime,
        events: Vec<ScheduleEvent>,
        out: &mut Resolution,
    ) {
        let datetime = self.clock.datetime(now);
        let clock = self.clock;
        let Some(schedule) = self.schedules.get_mut(id.index()) else {
            return;
        };

        for event in &events {
            if let ScheduleEvent::End { activation, .. } = event {
                if schedule.effective.map(|a| a.activation) == Some(*activation) {
                    if let Some(active) = schedule.effective.take() {
                        let block = &schedule.blocks[active.block];
                        debug!("[Schedule {}] {} Block {} ended", schedule.id, datetime, block.label);
                        out.dispatches.extend(block.action.on_end(schedule.machine));
                    }
                }
            }
        }

        let mut starting: Vec<usize> = Vec::new();
        for event in &events {
            if let ScheduleEvent::Start { block, .. } = event {
                starting.push(*block);
                // Occurrences are fixed by the cron, whatever happens to this one
                if let Some(next) = schedule.blocks[*block].cron.next_after(datetime) {
                    out.events.push((
                        ScheduleEvent::Start {
                            schedule: id,
                            block: *block,
                        },
                        clock.sim_time(next) - now,
                    ));
                }
            }
        }
        if starting.is_empty() {
            return;
        }

        starting.sort_by(|a, b| {
            schedule.blocks[*b].cmp_same_instant(&schedule.blocks[*a])
        });
        let best = starting[0];
        for loser in &starting[1..] {
            schedule.stats.skipped += 1;
            debug!(
                "[Schedule {}] {} Block {} skipped in favour of {}",
                schedule.id, datetime, schedule.blocks[*loser].label, schedule.blocks[best].label
            );
        }

        if let Some(active) = schedule.effective {
            let current = &schedule.blocks[active.block];
            if !schedule.blocks[best].preempts(current) {
                schedule.stats.skipped += 1;
                debug!(
                    "[Schedule {}] {} Block {} skipped, {} has priority",
                    schedule.id, datetime, schedule.blocks[best].label, current.label
                );
                return;
            }
            info!(
                "[Schedule {}] {} Block {} preempts {}",
                schedule.id, datetime, schedule.blocks[best].label, current.label
            );
            schedule.stats.preemptions += 1;
            schedule.effective = None;
            out.dispatches.extend(current.action.on_end(schedule.machine));
        }

        self.next_activation += 1;
        let block = &schedule.blocks[best];
        let active = ActiveBlock {
            block: best,
            activation: self.next_activation,
            started_at: now,
            ends_at: now + block.duration_secs,
        };
        debug!(
            "[Schedule {}] {} Block {} starts {} for {}s",
            schedule.id,
            datetime,
            block.label,
            block.action.name(),
            block.duration_secs
        );
        schedule.effective = Some(active);
        schedule.stats.activations += 1;
        out.dispatches.extend(block.action.on_start(schedule.machine));
        out.events.push((
            ScheduleEvent::End {
                schedule: id,
                activation: active.activation,
            },
            block.duration_secs,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cron::CronExpr;
    use crate::core::types::{MachineId, SECS_PER_HOUR};
    use crate::model::machine::MachineEvent;
    use crate::schedule::action::Action;
    use crate::schedule::block::Block;
    use chrono::NaiveDate;

    fn clock() -> Clock {
        Clock::new(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn switch(cron: &str, hours: u64, priority: i64, program: &str, order: usize) -> Block {
        Block {
            label: program.to_string(),
            cron: CronExpr::parse(cron).unwrap(),
            duration_secs: hours * SECS_PER_HOUR,
            priority,
            action: Action::SwitchProgram {
                program_id: program.to_string(),
            },
            order,
        }
    }

    fn scheduler(blocks: Vec<Block>) -> Scheduler {
        let mut schedule = Schedule::new("s1", "operating", blocks);
        schedule.machine = Some(MachineId(0));
        Scheduler::new(vec![schedule], clock())
    }

    fn start(block: usize) -> ScheduleEvent {
        ScheduleEvent::Start {
            schedule: ScheduleId(0),
            block,
        }
    }

    fn switched_to(resolution: &Resolution) -> Vec<String> {
        resolution
            .dispatches
            .iter()
            .filter_map(|d| match d {
                Dispatch::Machine(_, MachineEvent::SwitchProgram(p)) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initial_events_follow_cron() {
        let s = scheduler(vec![switch("30 7 * * *", 4, 0, "p1", 0)]);
        assert_eq!(s.initial_events(), vec![(start(0), 27_000)]);
    }

    #[test]
    fn test_higher_priority_wins_same_instant_regardless_of_order() {
        for (first, second) in [(-1, 1), (1, -1)] {
            let mut s = scheduler(vec![
                switch("0 9 * * *", 1, first, &format!("prio{}", first), 0),
                switch("0 9 * * *", 1, second, &format!("prio{}", second), 1),
            ]);
            let r = s.resolve(32_400, vec![start(0), start(1)]);
            assert_eq!(switched_to(&r), vec!["prio1".to_string()]);
            assert_eq!(s.schedules()[0].stats().skipped, 1);
        }
    }

    #[test]
    fn test_higher_priority_preempts_running_block() {
        let mut s = scheduler(vec![
            switch("0 7 * * *", 5, -1, "low", 0),
            switch("0 9 * * *", 1, 1, "high", 1),
        ]);
        s.resolve(7 * SECS_PER_HOUR, vec![start(0)]);
        let r = s.resolve(9 * SECS_PER_HOUR, vec![start(1)]);

        assert_eq!(
            r.dispatches,
            vec![
                Dispatch::Machine(MachineId(0), MachineEvent::PlannedWindowEnded),
                Dispatch::Machine(MachineId(0), MachineEvent::SwitchProgram("high".into())),
            ]
        );
        assert_eq!(s.schedules()[0].active_block().unwrap().label, "high");
        assert_eq!(s.schedules()[0].stats().preemptions, 1);
    }

    #[test]
    fn test_lower_priority_start_is_skipped() {
        let mut s = scheduler(vec![
            switch("0 7 * * *", 5, 1, "high", 0),
            switch("0 9 * * *", 1, -1, "low", 1),
        ]);
        s.resolve(7 * SECS_PER_HOUR, vec![start(0)]);
        let r = s.resolve(9 * SECS_PER_HOUR, vec![start(1)]);

        assert!(r.dispatches.is_empty());
        assert_eq!(s.schedules()[0].active_block().unwrap().label, "high");
        // Next day's occurrence is still queued
        assert!(r.events.contains(&(start(1), 24 * SECS_PER_HOUR)));
    }

    #[test]
    fn test_preempted_block_end_is_ignored() {
        let mut s = scheduler(vec![
            switch("0 7 * * *", 5, -1, "low", 0),
            switch("0 9 * * *", 1, 1, "high", 1),
        ]);
        let first = s.resolve(7 * SECS_PER_HOUR, vec![start(0)]);
        let low_end = first
            .events
            .iter()
            .find_map(|(e, _)| matches!(e, ScheduleEvent::End { .. }).then_some(*e))
            .unwrap();
        s.resolve(9 * SECS_PER_HOUR, vec![start(1)]);
        let high_end = ScheduleEvent::End {
            schedule: ScheduleId(0),
            activation: s.schedules()[0].effective().unwrap().activation,
        };

        let r = s.resolve(10 * SECS_PER_HOUR, vec![high_end]);
        assert_eq!(r.dispatches.len(), 1);
        assert!(s.schedules()[0].active_block().is_none());

        // The low block's own end passes without effect: it is not resumed
        let r = s.resolve(12 * SECS_PER_HOUR, vec![low_end]);
        assert!(r.dispatches.is_empty());
    }
}
