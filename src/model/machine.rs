use super::bom::{Bom, QualityAccumulator};
use super::container::{ResourceContainer, EPSILON};
use super::failure::{FailureProcess, PartSpec};
use super::maintenance::MaintenanceState;
use super::program::ProgramBook;
use super::resource::Batch;
use crate::core::rng::SimRng;
use crate::core::types::{Clock, ContainerId, ScheduleId, SimTime, SECS_PER_HOUR};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interrupt and error codes exposed through the collector
pub mod codes {
    pub const NONE: i64 = 0;
    pub const MANUAL_SWITCH_OFF: i64 = 1;
    pub const AUTOMATED_STOP: i64 = 3;
    pub const PROGRAM_SWITCH: i64 = 4;
    pub const CONTAINER_MISSING: i64 = 101;
    pub const LOW_CONTAINER_LEVEL: i64 = 102;
    /// Added to a stop cause when the stop was forced
    pub const FORCED: i64 = 900;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MachineState {
    Off,
    On,
    Production,
    Error,
}

impl MachineState {
    pub fn code(&self) -> i64 {
        match self {
            MachineState::Off => 0,
            MachineState::On => 1,
            MachineState::Production => 2,
            MachineState::Error => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Off => "off",
            MachineState::On => "on",
            MachineState::Production => "production",
            MachineState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Operator can repair
    Simple,
    /// Needs scheduled maintenance
    Complex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MachineError {
    pub code: i64,
    pub kind: ErrorKind,
    pub part: String,
    pub repair_hours: f64,
    /// Distinguishes successive errors so late repairs are ignored
    pub seq: u64,
    pub since: SimTime,
}

/// Timings and thresholds of a machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    pub startup_secs: SimTime,
    pub shutdown_secs: SimTime,
    pub program_switch_secs: SimTime,
    /// Minimum run quality for produced batches to pass
    pub quality_threshold: f64,
    pub thermal_threshold: f64,
    pub overheat_failure_proba: f64,
    pub failure_check_secs: SimTime,
    pub ambient_temperature: f64,
    /// Degrees above ambient per unit of program temperature factor
    pub heating_gain: f64,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            startup_secs: 45,
            shutdown_secs: 40,
            program_switch_secs: 90,
            quality_threshold: 0.8,
            thermal_threshold: 10.0,
            overheat_failure_proba: 0.05,
            failure_check_secs: SECS_PER_HOUR,
            ambient_temperature: 20.0,
            heating_gain: 40.0,
        }
    }
}

/// Messages and self-scheduled wakes handled by a machine
#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    /// Operating window opened with this program requested
    SwitchProgram(String),
    PlannedWindowEnded,
    BeginMaintenance,
    EndMaintenance,
    InputsReplenished,
    OperatorPresence(bool),
    Repaired { error_seq: u64 },
    TransitionDone { generation: u64 },
    ProductionStep { generation: u64 },
    PartFailure { generation: u64 },
    FailureCheck,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    PowerOn,
    PowerOff,
    Switch(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransition {
    pub transition: Transition,
    pub done_at: SimTime,
}

/// Progress of the BOM run in flight
#[derive(Debug, Clone, PartialEq)]
pub struct RunProgress {
    pub program: String,
    pub started_at: SimTime,
    pub elapsed_secs: SimTime,
    pub step_secs: SimTime,
    pub quality: QualityAccumulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateChange {
    pub at: SimTime,
    pub from: MachineState,
    pub to: MachineState,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineCounters {
    pub runs_completed: u64,
    pub runs_aborted: u64,
    pub failures: u64,
    pub interrupts: u64,
    pub success_quantity: f64,
    pub failed_quantity: f64,
    /// Effective units drawn per content id
    pub consumption: BTreeMap<String, f64>,
    /// Units deposited per product id
    pub produced: BTreeMap<String, f64>,
    /// Last batch drawn per content id
    pub latest_batch: BTreeMap<String, String>,
}

/// Borrowed view of the rest of the factory while a machine reacts
pub struct MachineCtx<'a> {
    pub now: SimTime,
    pub clock: Clock,
    pub step_secs: SimTime,
    pub book: &'a ProgramBook,
    pub containers: &'a mut [ResourceContainer],
    pub parts: &'a [PartSpec],
    pub rng: &'a mut SimRng,
    /// Events to schedule, with delays
    pub outbox: Vec<(MachineEvent, SimTime)>,
    /// Containers that received material
    pub replenished: Vec<ContainerId>,
}

impl<'a> MachineCtx<'a> {
    fn stamp(&self) -> String {
        self.clock.datetime(self.now).format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[derive(Debug, Clone)]
pub struct Machine {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) state: MachineState,
    pub(crate) programs: Vec<String>,
    pub(crate) current_program: Option<String>,
    pub(crate) requested_program: Option<String>,
    pub(crate) inputs: Vec<ContainerId>,
    pub(crate) outputs: Vec<ContainerId>,
    pub(crate) schedule: Option<ScheduleId>,
    /// `None` when no operator is assigned
    pub(crate) operator_present: Option<bool>,
    pub(crate) planned: bool,
    pub(crate) maintenance: MaintenanceState,
    pub(crate) error: Option<MachineError>,
    error_seq: u64,
    pub(crate) interrupt_code: i64,
    pub(crate) paused: bool,
    pub(crate) transition: Option<PendingTransition>,
    generation: u64,
    pub(crate) run: Option<RunProgress>,
    pub(crate) thermal: f64,
    pub(crate) temperature: f64,
    pub(crate) failure: FailureProcess,
    pub(crate) settings: MachineSettings,
    pub(crate) counters: MachineCounters,
    journal: Vec<StateChange>,
}

impl Machine {
    pub fn new(
        id: impl Into<String>,
        programs: Vec<String>,
        default_program: Option<String>,
        failure: FailureProcess,
        settings: MachineSettings,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            state: MachineState::Off,
            programs,
            current_program: default_program,
            requested_program: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            schedule: None,
            operator_present: None,
            planned: false,
            maintenance: MaintenanceState::default(),
            error: None,
            error_seq: 0,
            interrupt_code: codes::NONE,
            paused: false,
            transition: None,
            generation: 0,
            run: None,
            thermal: 0.0,
            temperature: settings.ambient_temperature,
            failure,
            settings,
            counters: MachineCounters::default(),
            journal: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn current_program(&self) -> Option<&str> {
        self.current_program.as_deref()
    }

    pub fn requested_program(&self) -> Option<&str> {
        self.requested_program.as_deref()
    }

    pub fn programs(&self) -> &[String] {
        &self.programs
    }

    pub fn error(&self) -> Option<&MachineError> {
        self.error.as_ref()
    }

    pub fn error_code(&self) -> i64 {
        self.error.as_ref().map_or(codes::NONE, |e| e.code)
    }

    pub fn interrupt_code(&self) -> i64 {
        self.interrupt_code
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn planned_operating_time(&self) -> bool {
        self.planned
    }

    pub fn under_maintenance(&self) -> bool {
        self.maintenance.active
    }

    pub fn thermal(&self) -> f64 {
        self.thermal
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn counters(&self) -> &MachineCounters {
        &self.counters
    }

    pub fn failure_process(&self) -> &FailureProcess {
        &self.failure
    }

    pub fn maintenance(&self) -> &MaintenanceState {
        &self.maintenance
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn input_containers(&self) -> &[ContainerId] {
        &self.inputs
    }

    pub fn output_containers(&self) -> &[ContainerId] {
        &self.outputs
    }

    /// Fraction of the current run completed
    pub fn run_progress(&self, book: &ProgramBook) -> f64 {
        match &self.run {
            Some(run) => match book.program(&run.program) {
                Some(p) => run.elapsed_secs as f64 / p.duration_secs as f64,
                None => 0.0,
            },
            None => 0.0,
        }
    }

    /// Every state change so far, oldest first
    pub fn journal(&self) -> &[StateChange] {
        &self.journal
    }

    /// Events the machine needs at simulation start
    pub(crate) fn initial_events(&mut self, rng: &mut SimRng) -> Vec<(MachineEvent, SimTime)> {
        let (generation, delay) = self.failure.arm(0, rng);
        vec![
            (MachineEvent::PartFailure { generation }, delay),
            (MachineEvent::FailureCheck, self.settings.failure_check_secs.max(1)),
        ]
    }

    pub(crate) fn handle(&mut self, event: MachineEvent, ctx: &mut MachineCtx<'_>) {
        match event {
            MachineEvent::SwitchProgram(program) => self.handle_switch_program(program, ctx),
            MachineEvent::PlannedWindowEnded => {
                self.planned = false;
                debug!("[Machine {}] {} Operating window closed", self.id, ctx.stamp());
            }
            MachineEvent::BeginMaintenance => self.begin_maintenance(ctx),
            MachineEvent::EndMaintenance => self.end_maintenance(ctx),
            MachineEvent::InputsReplenished => {
                if self.paused {
                    debug!("[Machine {}] {} Inputs replenished", self.id, ctx.stamp());
                }
            }
            MachineEvent::OperatorPresence(present) => {
                self.operator_present = Some(present);
            }
            MachineEvent::Repaired { error_seq } => self.handle_repaired(error_seq, ctx),
            MachineEvent::TransitionDone { generation } => {
                if generation == self.generation {
                    self.finish_transition(ctx);
                }
            }
            MachineEvent::ProductionStep { generation } => {
                if generation == self.generation && self.state == MachineState::Production {
                    self.production_step(ctx);
                }
            }
            MachineEvent::PartFailure { generation } => {
                if self.failure.is_current(generation) {
                    self.handle_part_failure(ctx);
                }
            }
            MachineEvent::FailureCheck => self.handle_failure_check(ctx),
        }
    }

    /// Drive the machine toward its planned window, maintenance and program intents
    pub(crate) fn reconcile(&mut self, ctx: &mut MachineCtx<'_>) {
        if self.transition.is_some() {
            // Re-evaluated once the running transition completes
            return;
        }

        match self.state {
            MachineState::Error => {}
            MachineState::Off => {
                if self.may_start() {
                    self.begin_transition(Transition::PowerOn, self.settings.startup_secs, ctx);
                }
            }
            MachineState::On => {
                if !self.planned || self.maintenance.active {
                    self.begin_transition(Transition::PowerOff, self.settings.shutdown_secs, ctx);
                } else if let Some(program) = self.pending_switch() {
                    self.begin_transition(
                        Transition::Switch(program),
                        self.settings.program_switch_secs,
                        ctx,
                    );
                } else {
                    self.requested_program = None;
                    self.try_start_production(ctx);
                }
            }
            MachineState::Production => {
                if !self.planned || self.maintenance.active {
                    self.stop_production(codes::AUTOMATED_STOP, false, ctx);
                    self.reconcile(ctx);
                } else if self.pending_switch().is_some() {
                    self.stop_production(codes::PROGRAM_SWITCH, true, ctx);
                    self.reconcile(ctx);
                }
            }
        }
    }

    fn may_start(&self) -> bool {
        self.planned
            && !self.maintenance.active
            && self.error.is_none()
            && self.operator_present != Some(false)
    }

    fn pending_switch(&self) -> Option<String> {
        match (&self.requested_program, &self.current_program) {
            (Some(requested), Some(current)) if requested == current => None,
            (Some(requested), _) => Some(requested.clone()),
            (None, _) => None,
        }
    }

    fn handle_switch_program(&mut self, program: String, ctx: &mut MachineCtx<'_>) {
        self.planned = true;
        if !self.programs.iter().any(|p| *p == program) {
            warn!(
                "[Machine {}] {} Program {} is not assigned to this machine, ignoring switch",
                self.id,
                ctx.stamp(),
                program
            );
            return;
        }
        if self.state == MachineState::Error {
            warn!(
                "[Machine {}] {} Cannot switch to {} while in error",
                self.id,
                ctx.stamp(),
                program
            );
            return;
        }
        // Applied by reconcile once the machine is on
        self.requested_program = Some(program);
    }

    fn begin_transition(&mut self, transition: Transition, delay: SimTime, ctx: &mut MachineCtx<'_>) {
        self.generation += 1;
        debug!(
            "[Machine {}] {} Begin {:?} ({}s)",
            self.id,
            ctx.stamp(),
            transition,
            delay
        );
        self.transition = Some(PendingTransition {
            transition,
            done_at: ctx.now + delay,
        });
        ctx.outbox.push((
            MachineEvent::TransitionDone {
                generation: self.generation,
            },
            delay,
        ));
    }

    fn finish_transition(&mut self, ctx: &mut MachineCtx<'_>) {
        let Some(pending) = self.transition.take() else {
            return;
        };
        match pending.transition {
            Transition::PowerOn => {
                self.set_state(MachineState::On, ctx);
                self.apply_pending_failure(ctx);
            }
            Transition::PowerOff => self.set_state(MachineState::Off, ctx),
            Transition::Switch(program) => {
                info!(
                    "[Machine {}] {} Program switched {} -> {}",
                    self.id,
                    ctx.stamp(),
                    self.current_program.as_deref().unwrap_or("-"),
                    program
                );
                if self.requested_program.as_deref() == Some(program.as_str()) {
                    self.requested_program = None;
                }
                self.current_program = Some(program);
            }
        }
    }

    fn cancel_transition(&mut self) {
        self.transition = None;
        self.generation += 1;
    }

    pub(crate) fn set_state(&mut self, to: MachineState, ctx: &MachineCtx<'_>) {
        if self.state == to {
            return;
        }
        info!(
            "[Machine {}] {} {} -> {}",
            self.id,
            ctx.stamp(),
            self.state.as_str(),
            to.as_str()
        );
        self.journal.push(StateChange {
            at: ctx.now,
            from: self.state,
            to,
        });
        self.state = to;
    }

    fn try_start_production(&mut self, ctx: &mut MachineCtx<'_>) {
        let Some(program) = self.current_program.clone() else {
            return;
        };
        let book = ctx.book;
        let Some((recipe, _)) = book.recipe(&program) else {
            return;
        };
        let duration = recipe.duration_secs;

        let run = match self.run.take() {
            // A run interrupted by a pause or window end resumes where it stopped
            Some(run) if run.program == program => run,
            _ => RunProgress {
                program,
                started_at: ctx.now,
                elapsed_secs: 0,
                step_secs: 0,
                quality: QualityAccumulator::default(),
            },
        };
        self.run = Some(run);

        let step = ctx.step_secs.min(duration.saturating_sub(self.elapsed()).max(1));
        if let Err(code) = self.check_inputs(step, ctx) {
            self.interrupt(code, ctx);
            return;
        }

        self.paused = false;
        self.interrupt_code = codes::NONE;
        self.set_state(MachineState::Production, ctx);
        self.schedule_step(step, ctx);
    }

    fn elapsed(&self) -> SimTime {
        self.run.as_ref().map_or(0, |r| r.elapsed_secs)
    }

    fn schedule_step(&mut self, step: SimTime, ctx: &mut MachineCtx<'_>) {
        self.generation += 1;
        if let Some(run) = self.run.as_mut() {
            run.step_secs = step;
        }
        ctx.outbox.push((
            MachineEvent::ProductionStep {
                generation: self.generation,
            },
            step,
        ));
    }

    /// Verify the input containers can feed `step` seconds of the current run
    fn check_inputs(&self, step: SimTime, ctx: &MachineCtx<'_>) -> Result<(), i64> {
        let Some((program, bom)) = self
            .run
            .as_ref()
            .and_then(|run| ctx.book.recipe(&run.program))
        else {
            return Ok(());
        };
        let fraction = step as f64 / program.duration_secs as f64;

        for (content, needed) in bom.requirements_for(fraction) {
            let mut holders = self
                .inputs
                .iter()
                .map(|c| &ctx.containers[c.index()])
                .filter(|c| c.content() == content)
                .peekable();
            if holders.peek().is_none() {
                return Err(codes::CONTAINER_MISSING);
            }
            let available: f64 = holders.map(ResourceContainer::effective_level).sum();
            if available + EPSILON < needed {
                return Err(codes::LOW_CONTAINER_LEVEL);
            }
        }
        Ok(())
    }

    fn production_step(&mut self, ctx: &mut MachineCtx<'_>) {
        let book = ctx.book;
        let Some(run) = self.run.as_ref() else {
            return;
        };
        let step = run.step_secs;
        let Some((program, bom)) = book.recipe(&run.program) else {
            return;
        };
        let duration = program.duration_secs;
        let temperature_factor = program.temperature_factor;

        // Another consumer may have drained a shared container since the step began
        if let Err(code) = self.check_inputs(step, ctx) {
            self.interrupt(code, ctx);
            return;
        }

        let fraction = step as f64 / duration as f64;
        self.consume(bom, fraction, ctx);

        let heat = temperature_factor * step as f64 / SECS_PER_HOUR as f64;
        self.thermal += heat;
        self.update_temperature(temperature_factor);

        let finished = match self.run.as_mut() {
            Some(run) => {
                run.elapsed_secs += step;
                run.elapsed_secs >= duration
            }
            None => false,
        };
        if finished {
            self.complete_run(bom, ctx);
        }

        let next = ctx.step_secs.min(duration.saturating_sub(self.elapsed()).max(1));
        if self.run.is_none() {
            self.start_next_run(ctx);
            if self.run.is_none() {
                return;
            }
        }
        match self.check_inputs(next, ctx) {
            Ok(()) => self.schedule_step(next, ctx),
            Err(code) => self.interrupt(code, ctx),
        }
    }

    fn start_next_run(&mut self, ctx: &MachineCtx<'_>) {
        if let Some(program) = self.current_program.clone() {
            self.run = Some(RunProgress {
                program,
                started_at: ctx.now,
                elapsed_secs: 0,
                step_secs: 0,
                quality: QualityAccumulator::default(),
            });
        }
    }

    fn consume(&mut self, bom: &Bom, fraction: f64, ctx: &mut MachineCtx<'_>) {
        for (content, needed) in bom.requirements_for(fraction) {
            let mut remaining = needed;
            for container in self.inputs.iter() {
                if remaining <= EPSILON {
                    break;
                }
                let container = &mut ctx.containers[container.index()];
                if container.content() != content {
                    continue;
                }
                let take = remaining.min(container.effective_level());
                let portions = container.drain_effective(take);
                remaining -= take;

                if let Some(last) = portions.last() {
                    self.counters
                        .latest_batch
                        .insert(content.to_string(), last.batch_id.clone());
                }
                if bom.is_material(content) {
                    if let Some(run) = self.run.as_mut() {
                        run.quality.add(&portions);
                    }
                }
            }
            *self.counters.consumption.entry(content.to_string()).or_insert(0.0) += needed - remaining.max(0.0);
        }
    }

    fn complete_run(&mut self, bom: &Bom, ctx: &mut MachineCtx<'_>) {
        let Some(run) = self.run.take() else {
            return;
        };
        let quality = run.quality.value();
        let passed = quality >= self.settings.quality_threshold;
        let stamp = ctx.clock.datetime(ctx.now).format("%Y%m%d%H%M%S").to_string();

        for output in &bom.products {
            let Some(target) = self
                .outputs
                .iter()
                .copied()
                .find(|c| ctx.containers[c.index()].content() == output.content)
            else {
                warn!(
                    "[Machine {}] {} No container for product {}, output dropped",
                    self.id,
                    ctx.stamp(),
                    output.content
                );
                continue;
            };
            let batch_id = format!(
                "{}-{}-{}-{}",
                output.content.to_uppercase(),
                self.id.to_uppercase(),
                stamp,
                ctx.rng.batch_tag()
            );
            let batch = Batch::new(batch_id, output.quantity, ctx.now)
                .with_quality(quality)
                .with_verdict(passed);
            let accepted = ctx.containers[target.index()].put_batch(batch);

            *self.counters.produced.entry(output.content.clone()).or_insert(0.0) += accepted;
            if passed {
                self.counters.success_quantity += accepted;
            } else {
                self.counters.failed_quantity += accepted;
            }
            if accepted > 0.0 {
                ctx.replenished.push(target);
            }
        }

        self.counters.runs_completed += 1;
        info!(
            "[Machine {}] {} Completed run of {} (quality {:.3}, {})",
            self.id,
            ctx.stamp(),
            run.program,
            quality,
            if passed { "passed" } else { "failed" }
        );
    }

    /// Pause for lack of input; accumulated progress is kept
    fn interrupt(&mut self, code: i64, ctx: &mut MachineCtx<'_>) {
        if !self.paused || self.interrupt_code != code {
            warn!(
                "[Machine {}] {} Production interrupted (code {})",
                self.id,
                ctx.stamp(),
                code
            );
            self.counters.interrupts += 1;
        }
        self.paused = true;
        self.interrupt_code = code;
        self.generation += 1;
        self.set_state(MachineState::On, ctx);
    }

    /// Leave Production; `abandon` drops the run in flight
    pub(crate) fn stop_production(&mut self, code: i64, abandon: bool, ctx: &mut MachineCtx<'_>) {
        if self.state != MachineState::Production {
            return;
        }
        self.generation += 1;
        self.interrupt_code = code;
        if abandon {
            self.abandon_run();
        }
        self.set_state(MachineState::On, ctx);
    }

    /// Drop the run in flight; its consumed inputs are lost
    fn abandon_run(&mut self) {
        if let Some(run) = self.run.take() {
            if run.elapsed_secs > 0 {
                self.counters.runs_aborted += 1;
            }
        }
    }

    fn update_temperature(&mut self, temperature_factor: f64) {
        let target = if self.state == MachineState::Production {
            self.settings.ambient_temperature + self.settings.heating_gain * temperature_factor
        } else {
            self.settings.ambient_temperature
        };
        self.temperature = 0.5 * self.temperature + 0.5 * target;
    }

    fn handle_part_failure(&mut self, ctx: &mut MachineCtx<'_>) {
        if let Some(part) = FailureProcess::draw_part(ctx.parts, ctx.rng) {
            self.fail_part(part, ctx);
        }
        let (generation, delay) = self.failure.arm(ctx.now, ctx.rng);
        ctx.outbox.push((MachineEvent::PartFailure { generation }, delay));
    }

    fn handle_failure_check(&mut self, ctx: &mut MachineCtx<'_>) {
        if self.state != MachineState::Production {
            self.update_temperature(0.0);
        }
        let running = matches!(self.state, MachineState::On | MachineState::Production);
        if running && !self.maintenance.active {
            let p = FailureProcess::overheat_probability(
                self.thermal,
                self.settings.thermal_threshold,
                self.settings.overheat_failure_proba,
            );
            if p > 0.0 && ctx.rng.chance(p) {
                warn!(
                    "[Machine {}] {} Overheated part failure (thermal {:.2})",
                    self.id,
                    ctx.stamp(),
                    self.thermal
                );
                if let Some(part) = FailureProcess::draw_part(ctx.parts, ctx.rng) {
                    self.enter_error(part, ctx);
                }
            }
        }
        ctx.outbox
            .push((MachineEvent::FailureCheck, self.settings.failure_check_secs.max(1)));
    }

    /// A part broke; it only takes effect while the machine is running
    pub(crate) fn fail_part(&mut self, part: usize, ctx: &mut MachineCtx<'_>) {
        let running = matches!(self.state, MachineState::On | MachineState::Production);
        if !running || self.maintenance.active {
            if self.failure.pending.is_none() {
                debug!(
                    "[Machine {}] {} Part failure deferred until the machine runs",
                    self.id,
                    ctx.stamp()
                );
                self.failure.pending = Some(part);
            }
            return;
        }
        self.enter_error(part, ctx);
    }

    fn apply_pending_failure(&mut self, ctx: &mut MachineCtx<'_>) {
        if let Some(part) = self.failure.pending.take() {
            self.enter_error(part, ctx);
        }
    }

    fn enter_error(&mut self, part: usize, ctx: &mut MachineCtx<'_>) {
        let Some(spec) = ctx.parts.get(part) else {
            return;
        };
        if self.state == MachineState::Production {
            self.interrupt_code = codes::FORCED + codes::AUTOMATED_STOP;
            self.abandon_run();
        }
        self.cancel_transition();
        self.error_seq += 1;
        self.error = Some(MachineError {
            code: spec.code,
            kind: if spec.needs_maintenance {
                ErrorKind::Complex
            } else {
                ErrorKind::Simple
            },
            part: spec.name.clone(),
            repair_hours: spec.repair_hours,
            seq: self.error_seq,
            since: ctx.now,
        });
        self.counters.failures += 1;
        warn!(
            "[Machine {}] {} Failure of {} (code {})",
            self.id,
            ctx.stamp(),
            spec.name,
            spec.code
        );
        self.set_state(MachineState::Error, ctx);
    }

    fn handle_repaired(&mut self, error_seq: u64, ctx: &mut MachineCtx<'_>) {
        let matches = self.error.as_ref().map_or(false, |e| e.seq == error_seq);
        if !matches || self.state != MachineState::Error {
            return;
        }
        self.error = None;
        info!("[Machine {}] {} Repaired by operator", self.id, ctx.stamp());
        self.set_state(MachineState::On, ctx);
        self.apply_pending_failure(ctx);
    }

    /// Clear an error without changing state; used by maintenance
    pub(crate) fn clear_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    /// Abort whatever the machine is doing and switch it off immediately
    pub(crate) fn force_off(&mut self, code: i64, ctx: &mut MachineCtx<'_>) {
        if self.state == MachineState::Production {
            self.interrupt_code = code;
        }
        self.abandon_run();
        self.cancel_transition();
        self.paused = false;
        self.set_state(MachineState::Off, ctx);
    }
}
