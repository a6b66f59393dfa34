//! Resolution of dotted source paths into typed accessors.
//!
//! A path is `<entity id>.<attribute>` (or `factory.<attribute>`). Counter maps
//! keyed by content take a third segment, e.g. `m1.consumption.steel`. Paths
//! are resolved once at load time; sampling only calls the bound closures.

use super::transform::DATETIME_FORMAT;
use super::value::Value;
use crate::core::types::{EntityRef, SimTime};
use crate::factory::world::World;
use crate::model::container::ResourceContainer;
use crate::model::machine::Machine;
use crate::model::operator::Operator;
use crate::schedule::block::Schedule;
use std::sync::Arc;

pub type Accessor = Arc<dyn Fn(&World) -> Option<Value> + Send + Sync>;

type Attr<T> = fn(&T, &World) -> Option<Value>;
type KeyedAttr<T> = fn(&T, &str) -> Option<Value>;

pub const FACTORY: &str = "factory";

fn stamp(world: &World, time: SimTime) -> Value {
    Value::Str(world.clock.datetime(time).format(DATETIME_FORMAT).to_string())
}

const FACTORY_ATTRS: &[(&str, fn(&World) -> Option<Value>)] = &[
    ("datetime", |w| Some(stamp(w, w.now))),
    ("time", |w| Some(Value::from(w.now))),
    ("day", |w| Some(Value::from(w.now / crate::core::types::SECS_PER_DAY))),
];

const MACHINE_ATTRS: &[(&str, Attr<Machine>)] = &[
    ("name", |m, _| Some(m.name().into())),
    ("state", |m, _| Some(m.state().as_str().into())),
    ("state_code", |m, _| Some(Value::Int(m.state().code()))),
    ("program", |m, _| m.current_program().map(Value::from)),
    ("requested_program", |m, _| m.requested_program().map(Value::from)),
    ("error_code", |m, _| Some(Value::Int(m.error_code()))),
    ("error_part", |m, _| m.error().map(|e| Value::from(e.part.as_str()))),
    ("interrupt_code", |m, _| Some(Value::Int(m.interrupt_code()))),
    ("paused", |m, _| Some(m.is_paused().into())),
    ("planned_operating_time", |m, _| Some(m.planned_operating_time().into())),
    ("under_maintenance", |m, _| Some(m.under_maintenance().into())),
    ("thermal", |m, _| Some(m.thermal().into())),
    ("temperature", |m, _| Some(m.temperature().into())),
    ("progress", |m, w| Some(m.run_progress(&w.book).into())),
    ("next_failure", |m, w| m.failure_process().next_failure_at().map(|t| stamp(w, t))),
    ("runs_completed", |m, _| Some(m.counters().runs_completed.into())),
    ("runs_aborted", |m, _| Some(m.counters().runs_aborted.into())),
    ("failures", |m, _| Some(m.counters().failures.into())),
    ("interrupts", |m, _| Some(m.counters().interrupts.into())),
    ("maintenance_completed", |m, _| Some(m.maintenance().completed.into())),
    ("success_quantity", |m, _| Some(m.counters().success_quantity.into())),
    ("failed_quantity", |m, _| Some(m.counters().failed_quantity.into())),
];

const MACHINE_KEYED: &[(&str, KeyedAttr<Machine>)] = &[
    ("consumption", |m, k| m.counters().consumption.get(k).copied().map(Value::from)),
    ("produced", |m, k| m.counters().produced.get(k).copied().map(Value::from)),
    ("latest_batch_id", |m, k| {
        m.counters().latest_batch.get(k).map(|b| Value::from(b.as_str()))
    }),
];

const CONTAINER_ATTRS: &[(&str, Attr<ResourceContainer>)] = &[
    ("name", |c, _| Some(c.name().into())),
    ("content", |c, _| Some(c.content().into())),
    ("level", |c, _| Some(c.level().into())),
    ("effective_level", |c, _| Some(c.effective_level().into())),
    ("free", |c, _| Some(c.free().into())),
    ("capacity", |c, _| Some(c.capacity().into())),
    ("n_batches", |c, _| Some((c.n_batches() as u64).into())),
    ("average_quality", |c, _| c.average_quality().map(Value::from)),
    ("last_batch_id", |c, _| c.last_batch().map(|b| Value::from(b.batch_id.as_str()))),
    ("last_batch_quality", |c, _| c.last_batch().map(|b| Value::from(b.quality))),
    ("last_batch_time", |c, w| c.arrival_time().map(|t| stamp(w, t))),
    ("received", |c, _| Some(c.stats().received.into())),
    ("drawn", |c, _| Some(c.stats().drawn.into())),
    ("dropped", |c, _| Some(c.stats().dropped.into())),
    ("batches_received", |c, _| Some(c.stats().batches_received.into())),
    ("success_quantity", |c, _| Some(c.stats().success_quantity.into())),
    ("failed_quantity", |c, _| Some(c.stats().failed_quantity.into())),
    ("procurement_failures", |c, _| Some(c.stats().procurement_failures.into())),
];

const OPERATOR_ATTRS: &[(&str, Attr<Operator>)] = &[
    ("name", |o, _| Some(o.name().into())),
    ("state", |o, _| Some(o.state().as_str().into())),
    ("state_code", |o, _| Some(Value::Int(o.state().code()))),
    ("machine", |o, w| {
        o.machine()
            .and_then(|m| w.machines.get(m.index()))
            .map(|m| Value::from(m.id()))
    }),
    ("recovery_attempts", |o, _| Some(o.recovery_attempts().into())),
    ("repairs", |o, _| Some(o.repairs().into())),
];

const SCHEDULE_ATTRS: &[(&str, Attr<Schedule>)] = &[
    ("kind", |s, _| Some(s.kind().into())),
    ("active_block", |s, _| s.active_block().map(|b| Value::from(b.label.as_str()))),
    ("action", |s, _| s.active_block().map(|b| Value::from(b.action.name()))),
    ("priority", |s, _| s.active_block().map(|b| Value::Int(b.priority))),
    ("activations", |s, _| Some(s.stats().activations.into())),
    ("preemptions", |s, _| Some(s.stats().preemptions.into())),
    ("skipped", |s, _| Some(s.stats().skipped.into())),
];

fn find<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

/// Bind `path` to an accessor, or explain why it cannot be resolved
pub fn resolve(world: &World, path: &str) -> Result<Accessor, String> {
    let (entity, attr) = path
        .split_once('.')
        .ok_or_else(|| "expected <entity>.<attribute>".to_string())?;

    if entity == FACTORY {
        let f = find(FACTORY_ATTRS, attr)
            .ok_or_else(|| format!("factory has no attribute '{}'", attr))?;
        return Ok(Arc::new(f));
    }

    let target = world
        .lookup(entity)
        .ok_or_else(|| format!("no entity with id '{}'", entity))?;
    let unknown = || format!("{} '{}' has no attribute '{}'", target.kind(), entity, attr);

    match target {
        EntityRef::Machine(id) => {
            if let Some(f) = find(MACHINE_ATTRS, attr) {
                return Ok(Arc::new(move |w: &World| {
                    w.machines.get(id.index()).and_then(|m| f(m, w))
                }));
            }
            let (name, key) = attr.split_once('.').ok_or_else(unknown)?;
            let f = find(MACHINE_KEYED, name).ok_or_else(unknown)?;
            if !world.contents.iter().any(|c| c.id == key) {
                return Err(format!("unknown content '{}'", key));
            }
            let key = key.to_string();
            Ok(Arc::new(move |w: &World| {
                w.machines.get(id.index()).and_then(|m| f(m, &key))
            }))
        }
        EntityRef::Container(id) => {
            let f = find(CONTAINER_ATTRS, attr).ok_or_else(unknown)?;
            Ok(Arc::new(move |w: &World| {
                w.containers.get(id.index()).and_then(|c| f(c, w))
            }))
        }
        EntityRef::Operator(id) => {
            let f = find(OPERATOR_ATTRS, attr).ok_or_else(unknown)?;
            Ok(Arc::new(move |w: &World| {
                w.operators.get(id.index()).and_then(|o| f(o, w))
            }))
        }
        EntityRef::Schedule(id) => {
            let f = find(SCHEDULE_ATTRS, attr).ok_or_else(unknown)?;
            Ok(Arc::new(move |w: &World| {
                w.scheduler.schedule(id).and_then(|s| f(s, w))
            }))
        }
    }
}

/// Every attribute of every entity that currently has a value
pub fn observe_all(world: &World) -> Vec<(String, String, Value)> {
    fn collect<T>(
        out: &mut Vec<(String, String, Value)>,
        id: &str,
        entity: &T,
        table: &[(&str, Attr<T>)],
        world: &World,
    ) {
        for (name, f) in table {
            if let Some(value) = f(entity, world) {
                out.push((id.to_string(), name.to_string(), value));
            }
        }
    }

    let mut out = Vec::new();
    for (name, f) in FACTORY_ATTRS {
        if let Some(value) = f(world) {
            out.push((FACTORY.to_string(), name.to_string(), value));
        }
    }
    for m in &world.machines {
        collect(&mut out, m.id(), m, MACHINE_ATTRS, world);
        for (name, f) in MACHINE_KEYED {
            for content in &world.contents {
                if let Some(value) = f(m, &content.id) {
                    out.push((m.id().to_string(), format!("{}.{}", name, content.id), value));
                }
            }
        }
    }
    for c in &world.containers {
        collect(&mut out, c.id(), c, CONTAINER_ATTRS, world);
    }
    for o in &world.operators {
        collect(&mut out, o.id(), o, OPERATOR_ATTRS, world);
    }
    for s in world.scheduler.schedules() {
        collect(&mut out, s.id(), s, SCHEDULE_ATTRS, world);
    }
    out
}
