pub mod registry;
pub mod snapshot;
pub mod timeseries;
pub mod transform;
pub mod value;
pub mod variable;

pub use snapshot::{Snapshot, SnapshotHub};
pub use timeseries::{Observation, TimeSeries};
pub use transform::{Transform, TransformSpec};
pub use value::{DeclaredType, Value};
pub use variable::{Variable, VariableDef};

use crate::core::errors::ConfigError;
use crate::factory::world::World;
use log::debug;
use std::sync::Arc;
use variable::BoundVariable;

enum Mode {
    Variables(Vec<BoundVariable>),
    /// No variables configured: keep everything
    TimeSeries {
        series: TimeSeries,
        last_recorded: Option<u64>,
    },
}

/// Samples the factory into snapshots
pub struct Collector {
    mode: Mode,
    hub: SnapshotHub,
    sequence: u64,
}

impl Collector {
    pub(crate) fn bind(
        world: &World,
        variables: Vec<Variable>,
        retention: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let mode = if variables.is_empty() {
            Mode::TimeSeries {
                series: TimeSeries::new(retention),
                last_recorded: None,
            }
        } else {
            let mut bound = Vec::with_capacity(variables.len());
            for variable in variables {
                if bound
                    .iter()
                    .any(|b: &BoundVariable| b.variable.id == variable.id)
                {
                    return Err(ConfigError::DuplicateId {
                        kind: "variable",
                        id: variable.id,
                    });
                }
                bound.push(BoundVariable::bind(variable, world)?);
            }
            Mode::Variables(bound)
        };
        let hub = SnapshotHub::new(Snapshot::empty(world.clock.datetime(world.now)));
        Ok(Self {
            mode,
            hub,
            sequence: 0,
        })
    }

    /// Read the current state, publish it and return it
    pub fn sample(&mut self, world: &World) -> Arc<Snapshot> {
        self.sequence += 1;
        let datetime = world.clock.datetime(world.now);
        let values = match &mut self.mode {
            Mode::Variables(bound) => bound
                .iter()
                .map(|b| (b.variable.id.clone(), b.evaluate(world)))
                .collect(),
            Mode::TimeSeries {
                series,
                last_recorded,
            } => {
                let observed = registry::observe_all(world);
                // A second sample of the same instant adds nothing new
                let record = *last_recorded != Some(world.now);
                if record {
                    for (entity, key, value) in &observed {
                        series.record(world.now, datetime, entity, key, value.clone());
                    }
                    *last_recorded = Some(world.now);
                }
                observed
                    .into_iter()
                    .map(|(entity, key, value)| (format!("{}.{}", entity, key), value))
                    .collect()
            }
        };
        debug!("[Collector] {} Snapshot {} sampled", datetime, self.sequence);
        self.hub.publish(Snapshot {
            sequence: self.sequence,
            sim_time: world.now,
            datetime,
            values,
        });
        self.hub.latest()
    }

    pub fn hub(&self) -> &SnapshotHub {
        &self.hub
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.hub.latest()
    }

    pub fn time_series(&self) -> Option<&TimeSeries> {
        match &self.mode {
            Mode::TimeSeries { series, .. } => Some(series),
            Mode::Variables(_) => None,
        }
    }

    pub fn variables(&self) -> Vec<&Variable> {
        match &self.mode {
            Mode::Variables(bound) => bound.iter().map(|b| &b.variable).collect(),
            Mode::TimeSeries { .. } => Vec::new(),
        }
    }
}
