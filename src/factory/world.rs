use crate::core::event::{Phase, SimEvent};
use crate::core::rng::SimRng;
use crate::core::types::{Clock, ContainerId, EntityRef, MachineId, OperatorId, ScheduleId, SimTime, SECS_PER_HOUR};
use crate::model::container::{ResourceContainer, EPSILON};
use crate::model::failure::PartSpec;
use crate::model::machine::{Machine, MachineCtx, MachineEvent};
use crate::model::operator::{Operator, OperatorEvent};
use crate::model::program::ProgramBook;
use crate::model::resource::{Batch, ContentDef};
use crate::schedule::action::{Dispatch, ProcurementArgs};
use crate::schedule::scheduler::{ScheduleEvent, Scheduler};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};

/// Seconds between increments of a gradual fill
pub const FILL_STEP_SECS: SimTime = 60;

/// Everything that can happen on the factory timeline
#[derive(Debug, Clone, PartialEq)]
pub enum FactoryEvent {
    Schedule(ScheduleEvent),
    Machine {
        machine: MachineId,
        event: MachineEvent,
    },
    Operator {
        operator: OperatorId,
        event: OperatorEvent,
    },
    Procure(ProcurementArgs),
    Fill {
        container: ContainerId,
        template: Batch,
        remaining: f64,
    },
    Sample,
}

impl SimEvent for FactoryEvent {
    fn phase(&self) -> Phase {
        match self {
            FactoryEvent::Schedule(_) => Phase::Scheduler,
            FactoryEvent::Sample => Phase::Collector,
            _ => Phase::Entity,
        }
    }
}

/// Entity arenas and the shared services they react with
pub struct World {
    pub(crate) clock: Clock,
    pub(crate) now: SimTime,
    pub(crate) step_secs: SimTime,
    pub(crate) contents: Vec<ContentDef>,
    pub(crate) book: ProgramBook,
    pub(crate) parts: Vec<PartSpec>,
    pub(crate) containers: Vec<ResourceContainer>,
    pub(crate) machines: Vec<Machine>,
    pub(crate) operators: Vec<Operator>,
    pub(crate) scheduler: Scheduler,
    pub(crate) rng: SimRng,
    pub(crate) index: HashMap<String, EntityRef>,
    /// Machines that handled a message in the current batch
    dirty: BTreeSet<MachineId>,
}

type Outbox = Vec<(FactoryEvent, SimTime)>;

impl World {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        clock: Clock,
        step_secs: SimTime,
        contents: Vec<ContentDef>,
        book: ProgramBook,
        parts: Vec<PartSpec>,
        containers: Vec<ResourceContainer>,
        machines: Vec<Machine>,
        operators: Vec<Operator>,
        scheduler: Scheduler,
        rng: SimRng,
    ) -> Self {
        let mut index = HashMap::new();
        for (i, c) in containers.iter().enumerate() {
            index.insert(c.id().to_string(), EntityRef::Container(ContainerId(i)));
        }
        for (i, m) in machines.iter().enumerate() {
            index.insert(m.id().to_string(), EntityRef::Machine(MachineId(i)));
        }
        for (i, o) in operators.iter().enumerate() {
            index.insert(o.id().to_string(), EntityRef::Operator(OperatorId(i)));
        }
        for (i, s) in scheduler.schedules().iter().enumerate() {
            index.insert(s.id().to_string(), EntityRef::Schedule(ScheduleId(i)));
        }
        Self {
            clock,
            now: 0,
            step_secs,
            contents,
            book,
            parts,
            containers,
            machines,
            operators,
            scheduler,
            rng,
            index,
            dirty: BTreeSet::new(),
        }
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<EntityRef> {
        self.index.get(id).copied()
    }

    /// Events every entity needs before the clock starts, at absolute times
    pub(crate) fn initial_events(&mut self) -> Outbox {
        let mut events: Outbox = self
            .scheduler
            .initial_events()
            .into_iter()
            .map(|(e, at)| (FactoryEvent::Schedule(e), at))
            .collect();
        for (i, machine) in self.machines.iter_mut().enumerate() {
            for (event, at) in machine.initial_events(&mut self.rng) {
                events.push((
                    FactoryEvent::Machine {
                        machine: MachineId(i),
                        event,
                    },
                    at,
                ));
            }
        }
        for (i, operator) in self.operators.iter_mut().enumerate() {
            for (event, at) in operator.initial_events(&self.clock, &mut self.rng) {
                events.push((
                    FactoryEvent::Operator {
                        operator: OperatorId(i),
                        event,
                    },
                    at,
                ));
            }
        }
        events
    }

    /// React to one batch of Scheduler or Entity events
    pub(crate) fn react(&mut self, now: SimTime, phase: Phase, events: Vec<FactoryEvent>) -> Outbox {
        self.now = now;
        let mut out = Vec::new();
        match phase {
            Phase::Scheduler => {
                let boundaries = events
                    .into_iter()
                    .filter_map(|e| match e {
                        FactoryEvent::Schedule(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                let resolution = self.scheduler.resolve(now, boundaries);
                // Delivered in the Entity phase of this same instant
                for dispatch in resolution.dispatches {
                    out.push((Self::dispatch_event(dispatch), 0));
                }
                out.extend(
                    resolution
                        .events
                        .into_iter()
                        .map(|(e, delay)| (FactoryEvent::Schedule(e), delay)),
                );
            }
            Phase::Entity => {
                for event in events {
                    self.handle(event, &mut out);
                }
                self.settle(&mut out);
            }
            Phase::Collector => {}
        }
        out
    }

    fn dispatch_event(dispatch: Dispatch) -> FactoryEvent {
        match dispatch {
            Dispatch::Machine(machine, event) => FactoryEvent::Machine { machine, event },
            Dispatch::Procure(args) => FactoryEvent::Procure(args),
        }
    }

    fn handle(&mut self, event: FactoryEvent, out: &mut Outbox) {
        match event {
            FactoryEvent::Machine { machine, event } => self.drive_machine(machine, Some(event), out),
            FactoryEvent::Operator { operator, event } => self.handle_operator(operator, event, out),
            FactoryEvent::Procure(args) => self.procure(args, out),
            FactoryEvent::Fill {
                container,
                template,
                remaining,
            } => self.fill_step(container, template, remaining, out),
            FactoryEvent::Schedule(_) | FactoryEvent::Sample => {}
        }
    }

    /// Let every machine touched in this batch act on its new intents
    fn settle(&mut self, out: &mut Outbox) {
        let dirty = std::mem::take(&mut self.dirty);
        for machine in dirty {
            self.drive_machine(machine, None, out);
        }
    }

    /// Deliver `event` to a machine, or reconcile it when `event` is `None`
    fn drive_machine(&mut self, id: MachineId, event: Option<MachineEvent>, out: &mut Outbox) {
        let Some(machine) = self.machines.get_mut(id.index()) else {
            return;
        };
        let mut ctx = MachineCtx {
            now: self.now,
            clock: self.clock,
            step_secs: self.step_secs,
            book: &self.book,
            containers: &mut self.containers,
            parts: &self.parts,
            rng: &mut self.rng,
            outbox: Vec::new(),
            replenished: Vec::new(),
        };
        match event {
            Some(event) => {
                machine.handle(event, &mut ctx);
                self.dirty.insert(id);
            }
            None => machine.reconcile(&mut ctx),
        }

        let MachineCtx {
            outbox, replenished, ..
        } = ctx;
        out.extend(
            outbox
                .into_iter()
                .map(|(event, delay)| (FactoryEvent::Machine { machine: id, event }, delay)),
        );
        for container in replenished {
            self.notify_replenished(container, out);
        }
    }

    fn handle_operator(&mut self, id: OperatorId, event: OperatorEvent, out: &mut Outbox) {
        let Some(operator) = self.operators.get_mut(id.index()) else {
            return;
        };
        let assigned = operator.machine();
        let machine = assigned.and_then(|m| self.machines.get(m.index()));
        let outcome = operator.handle(event, self.now, &self.clock, machine, &mut self.rng);

        out.extend(
            outcome
                .events
                .into_iter()
                .map(|(event, delay)| (FactoryEvent::Operator { operator: id, event }, delay)),
        );
        let Some(machine) = assigned else {
            return;
        };
        if let Some(present) = outcome.presence {
            out.push((
                FactoryEvent::Machine {
                    machine,
                    event: MachineEvent::OperatorPresence(present),
                },
                0,
            ));
        }
        if let Some((error_seq, delay)) = outcome.repair {
            out.push((
                FactoryEvent::Machine {
                    machine,
                    event: MachineEvent::Repaired { error_seq },
                },
                delay,
            ));
        }
    }

    /// Machines reading from `container` may resume
    fn notify_replenished(&mut self, container: ContainerId, out: &mut Outbox) {
        for (i, machine) in self.machines.iter().enumerate() {
            if machine.input_containers().contains(&container) {
                out.push((
                    FactoryEvent::Machine {
                        machine: MachineId(i),
                        event: MachineEvent::InputsReplenished,
                    },
                    0,
                ));
            }
        }
    }

    fn procure(&mut self, args: ProcurementArgs, out: &mut Outbox) {
        let stamp = self.clock.datetime(self.now);
        let target = args.container.or_else(|| {
            self.containers
                .iter()
                .position(|c| c.content() == args.content_id && c.free() > EPSILON)
                .map(ContainerId)
        });
        let Some(target) = target else {
            warn!(
                "[Procurement] {} No container with free space for {}, delivery of {:.3} dropped",
                stamp, args.content_id, args.quantity
            );
            return;
        };

        // Skipped entirely without randomization so the draw sequence is unchanged
        if self.rng.randomize() && self.rng.chance(args.fail_proba) {
            self.containers[target.index()].record_procurement_failure();
            warn!(
                "[Procurement] {} Delivery of {:.3} {} failed",
                stamp, args.quantity, args.content_id
            );
            return;
        }

        let quality = self.rng.normal(args.quality.mean, args.quality.std_dev);
        let factor = self
            .rng
            .normal(args.consumption_factor.mean, args.consumption_factor.std_dev);
        let batch_id = format!(
            "{}-{}-{}",
            args.content_id.to_uppercase(),
            stamp.format("%Y%m%d%H%M%S"),
            self.rng.batch_tag()
        );
        let batch = Batch::new(batch_id, args.quantity, self.now)
            .with_quality(quality)
            .with_consumption_factor(factor);

        let container = &mut self.containers[target.index()];
        info!(
            "[Procurement] {} Delivering {:.3} {} to {} (quality {:.3})",
            stamp,
            args.quantity,
            args.content_id,
            container.id(),
            batch.quality
        );
        if container.fill_rate() > 0.0 {
            container.begin_fill(&batch);
            let remaining = batch.quantity;
            out.push((
                FactoryEvent::Fill {
                    container: target,
                    template: batch,
                    remaining,
                },
                FILL_STEP_SECS,
            ));
        } else if container.put_batch(batch) > 0.0 {
            self.notify_replenished(target, out);
        }
    }

    fn fill_step(&mut self, id: ContainerId, template: Batch, remaining: f64, out: &mut Outbox) {
        let Some(container) = self.containers.get_mut(id.index()) else {
            return;
        };
        let amount = (container.fill_rate() * FILL_STEP_SECS as f64 / SECS_PER_HOUR as f64).min(remaining);
        let accepted = container.grow_batch(&template, amount);
        let remaining = remaining - amount;
        if remaining > EPSILON {
            out.push((
                FactoryEvent::Fill {
                    container: id,
                    template,
                    remaining,
                },
                FILL_STEP_SECS,
            ));
        } else {
            debug!("[Container {}] Fill of {} complete", container.id(), template.batch_id);
        }
        if accepted > 0.0 {
            self.notify_replenished(id, out);
        }
    }
}
