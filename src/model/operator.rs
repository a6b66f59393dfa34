use super::machine::{ErrorKind, Machine, MachineState};
use crate::core::rng::SimRng;
use crate::core::types::{hours_to_secs, Clock, MachineId, SimTime, SECS_PER_DAY};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperatorState {
    Home,
    Work,
    Lunch,
}

impl OperatorState {
    pub fn code(&self) -> i64 {
        match self {
            OperatorState::Home => 0,
            OperatorState::Work => 1,
            OperatorState::Lunch => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorState::Home => "home",
            OperatorState::Work => "work",
            OperatorState::Lunch => "lunch",
        }
    }
}

/// Daily working pattern of an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkSchedule {
    /// Working weekdays, 0 = Monday
    pub workdays: Vec<u32>,
    #[serde(alias = "work-start")]
    pub work_start: NaiveTime,
    #[serde(alias = "work-end")]
    pub work_end: NaiveTime,
    #[serde(alias = "lunch-start")]
    pub lunch_start: NaiveTime,
    #[serde(alias = "lunch-minutes")]
    pub lunch_minutes: i64,
    /// Standard deviation of arrival and departure times
    #[serde(alias = "arrival-jitter-minutes")]
    pub arrival_jitter_minutes: f64,
}

impl Default for WorkSchedule {
    fn default() -> Self {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            workdays: (0..7).collect(),
            work_start: at(7, 30),
            work_end: at(15, 30),
            lunch_start: at(11, 30),
            lunch_minutes: 30,
            arrival_jitter_minutes: 5.0,
        }
    }
}

impl WorkSchedule {
    fn works_on(&self, datetime: &NaiveDateTime) -> bool {
        self.workdays
            .contains(&datetime.weekday().num_days_from_monday())
    }

    fn has_lunch(&self) -> bool {
        self.lunch_minutes > 0 && self.lunch_start > self.work_start && self.lunch_start < self.work_end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorEvent {
    Arrive,
    LunchStart,
    LunchEnd,
    Leave,
    Check { generation: u64 },
}

/// What the operator decided during one reaction
#[derive(Debug, Default, PartialEq)]
pub struct OperatorOutcome {
    pub events: Vec<(OperatorEvent, SimTime)>,
    /// Presence change to announce to the assigned machine
    pub presence: Option<bool>,
    /// Successful repair of this error, finishing after the delay
    pub repair: Option<(u64, SimTime)>,
}

#[derive(Debug, Clone)]
pub struct Operator {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) state: OperatorState,
    pub(crate) machine: Option<MachineId>,
    pub(crate) schedule: WorkSchedule,
    pub(crate) recovery_proba: f64,
    pub(crate) check_interval_secs: SimTime,
    check_generation: u64,
    /// Error currently being repaired
    repairing: Option<u64>,
    pub(crate) attempts: u64,
    pub(crate) repairs: u64,
}

impl Operator {
    pub fn new(
        id: impl Into<String>,
        machine: Option<MachineId>,
        schedule: WorkSchedule,
        recovery_proba: f64,
        check_interval_secs: SimTime,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            state: OperatorState::Home,
            machine,
            schedule,
            recovery_proba: recovery_proba.clamp(0.0, 1.0),
            check_interval_secs: check_interval_secs.max(1),
            check_generation: 0,
            repairing: None,
            attempts: 0,
            repairs: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    pub fn machine(&self) -> Option<MachineId> {
        self.machine
    }

    pub fn recovery_attempts(&self) -> u64 {
        self.attempts
    }

    pub fn repairs(&self) -> u64 {
        self.repairs
    }

    /// First arrival after the simulation start
    pub(crate) fn initial_events(&mut self, clock: &Clock, rng: &mut SimRng) -> Vec<(OperatorEvent, SimTime)> {
        let start = clock.start();
        let today_end = start.date().and_time(self.schedule.work_end);
        if self.schedule.works_on(&start)
            && start.time() >= self.schedule.work_start
            && start < today_end
        {
            // Simulation starts mid-shift
            return vec![(OperatorEvent::Arrive, 0)];
        }
        vec![(OperatorEvent::Arrive, self.next_arrival(start, clock, rng))]
    }

    pub(crate) fn handle(
        &mut self,
        event: OperatorEvent,
        now: SimTime,
        clock: &Clock,
        machine: Option<&Machine>,
        rng: &mut SimRng,
    ) -> OperatorOutcome {
        let mut outcome = OperatorOutcome::default();
        let datetime = clock.datetime(now);

        match event {
            OperatorEvent::Arrive => {
                self.set_state(OperatorState::Work, datetime);
                outcome.presence = Some(true);
                let today = datetime.date();
                if self.schedule.has_lunch() && datetime.time() < self.schedule.lunch_start {
                    let lunch = today.and_time(self.schedule.lunch_start);
                    outcome.events.push((OperatorEvent::LunchStart, clock.sim_time(lunch) - now));
                }
                let end = self.jittered(today.and_time(self.schedule.work_end), rng).max(datetime);
                outcome.events.push((OperatorEvent::Leave, clock.sim_time(end) - now));
                outcome.events.push(self.arm_check(0));
            }
            OperatorEvent::LunchStart => {
                if self.state == OperatorState::Work {
                    self.set_state(OperatorState::Lunch, datetime);
                    outcome.presence = Some(false);
                    let minutes = self.schedule.lunch_minutes.max(0) as SimTime;
                    outcome.events.push((OperatorEvent::LunchEnd, minutes * 60));
                }
            }
            OperatorEvent::LunchEnd => {
                if self.state == OperatorState::Lunch {
                    self.set_state(OperatorState::Work, datetime);
                    outcome.presence = Some(true);
                    outcome.events.push(self.arm_check(0));
                }
            }
            OperatorEvent::Leave => {
                self.set_state(OperatorState::Home, datetime);
                outcome.presence = Some(false);
                self.check_generation += 1;
                let delay = self.next_arrival(datetime, clock, rng);
                outcome.events.push((OperatorEvent::Arrive, delay));
            }
            OperatorEvent::Check { generation } => {
                if generation == self.check_generation && self.state == OperatorState::Work {
                    outcome.repair = self.attempt_recovery(machine, datetime, rng);
                    outcome.events.push(self.arm_check(self.check_interval_secs));
                }
            }
        }

        outcome
    }

    fn arm_check(&mut self, delay: SimTime) -> (OperatorEvent, SimTime) {
        self.check_generation += 1;
        (
            OperatorEvent::Check {
                generation: self.check_generation,
            },
            delay,
        )
    }

    fn attempt_recovery(
        &mut self,
        machine: Option<&Machine>,
        datetime: NaiveDateTime,
        rng: &mut SimRng,
    ) -> Option<(u64, SimTime)> {
        let machine = machine?;
        if machine.state() != MachineState::Error {
            self.repairing = None;
            return None;
        }
        let error = machine.error()?;
        if self.repairing == Some(error.seq) {
            return None;
        }
        if error.kind == ErrorKind::Complex {
            debug!(
                "[Operator {}] {} Error {} on {} needs maintenance",
                self.id,
                datetime,
                error.code,
                machine.id()
            );
            return None;
        }

        self.attempts += 1;
        if !rng.chance(self.recovery_proba) {
            debug!("[Operator {}] {} Recovery attempt failed", self.id, datetime);
            return None;
        }
        self.repairing = Some(error.seq);
        self.repairs += 1;
        let hours = rng.positive_normal(error.repair_hours, error.repair_hours * 0.1);
        info!(
            "[Operator {}] {} Repairing {} on {} ({:.2}h)",
            self.id,
            datetime,
            error.part,
            machine.id(),
            hours
        );
        Some((error.seq, hours_to_secs(hours).max(1)))
    }

    /// Delay from `from` until the next shift start
    fn next_arrival(&self, from: NaiveDateTime, clock: &Clock, rng: &mut SimRng) -> SimTime {
        let mut day = from.date();
        for _ in 0..8 {
            let start = day.and_time(self.schedule.work_start);
            if start >= from && self.schedule.works_on(&start) {
                let arrival = self.jittered(start, rng).max(from);
                return clock.sim_time(arrival) - clock.sim_time(from);
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        // No workdays configured: check again in a week
        7 * SECS_PER_DAY
    }

    fn jittered(&self, at: NaiveDateTime, rng: &mut SimRng) -> NaiveDateTime {
        let minutes = rng.normal(0.0, self.schedule.arrival_jitter_minutes);
        at + Duration::seconds((minutes * 60.0).round() as i64)
    }

    fn set_state(&mut self, to: OperatorState, datetime: NaiveDateTime) {
        if self.state != to {
            info!(
                "[Operator {}] {} {} -> {}",
                self.id,
                datetime,
                self.state.as_str(),
                to.as_str()
            );
            self.state = to;
        }
    }
}
