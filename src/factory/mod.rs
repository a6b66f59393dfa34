pub mod live;
pub mod loader;
pub mod world;

pub use live::{LiveRun, RunPacing};
pub use loader::FactoryConfig;
pub use world::FactoryEvent;

use crate::collector::{Collector, Snapshot, SnapshotHub, TimeSeries, Variable};
use crate::core::config::SimulationConfig;
use crate::core::errors::{ConfigError, FactoryError};
use crate::core::event::Phase;
use crate::core::simulation_engine::{EventHandler, SimulationEngine, SimulationObserver, StopHandle};
use crate::core::types::{days_to_secs, EntityRef, SimTime};
use crate::model::container::ResourceContainer;
use crate::model::machine::Machine;
use crate::model::operator::Operator;
use crate::schedule::block::Schedule;
use chrono::NaiveDateTime;
use log::info;
use std::path::Path;
use std::sync::Arc;
use world::World;

/// World plus its observer, as driven by the engine
pub(crate) struct Floor {
    pub(crate) world: World,
    pub(crate) collector: Collector,
    sample_interval: SimTime,
}

impl EventHandler for Floor {
    type Event = FactoryEvent;

    fn react(&mut self, now: SimTime, phase: Phase, events: Vec<FactoryEvent>) -> Vec<(FactoryEvent, SimTime)> {
        match phase {
            Phase::Collector => {
                self.world.now = now;
                self.collector.sample(&self.world);
                vec![(FactoryEvent::Sample, self.sample_interval)]
            }
            Phase::Scheduler | Phase::Entity => self.world.react(now, phase, events),
        }
    }
}

/// A simulated factory floor and its control surface
pub struct Factory {
    engine: SimulationEngine<FactoryEvent>,
    floor: Floor,
    config: SimulationConfig,
}

impl Factory {
    pub fn from_json_str(document: &str) -> Result<Self, FactoryError> {
        let config: FactoryConfig = serde_json::from_str(document)?;
        Ok(Self::from_config(config)?)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, FactoryError> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json_str(&document)
    }

    pub fn from_config(config: FactoryConfig) -> Result<Self, ConfigError> {
        Self::from_config_with_variables(config, Vec::new())
    }

    /// Load a document and publish extra variables declared in code, e.g. with custom transforms
    pub fn from_config_with_variables(
        config: FactoryConfig,
        variables: Vec<Variable>,
    ) -> Result<Self, ConfigError> {
        let simulation = config.simulation.clone();
        let loaded = loader::build(config, variables)?;
        let mut floor = Floor {
            world: loaded.world,
            collector: loaded.collector,
            sample_interval: simulation.sample_interval_secs,
        };

        let mut engine = SimulationEngine::new(None);
        for (event, at) in floor.world.initial_events() {
            engine.schedule_initial_event(event, at);
        }
        engine.schedule_initial_event(FactoryEvent::Sample, 0);

        Ok(Self {
            engine,
            floor,
            config: simulation,
        })
    }

    /// Advance the simulation by `days` simulated days
    pub fn run(&mut self, days: f64) -> SimTime {
        let until = self.now().saturating_add(days_to_secs(days));
        self.run_until(until)
    }

    /// Advance the simulation up to and including `until`
    pub fn run_until(&mut self, until: SimTime) -> SimTime {
        info!(
            "Running factory from {} to {}",
            self.datetime(),
            self.floor.world.clock.datetime(until)
        );
        self.engine.set_horizon(Some(until));
        self.engine.run(&mut self.floor)
    }

    /// Process one batch of same-instant events within the current horizon
    pub fn step(&mut self) -> bool {
        self.engine.step(&mut self.floor)
    }

    /// Process every batch of the next instant, so the floor is settled on return
    pub fn step_instant(&mut self) -> bool {
        let mut more = self.step();
        while more && self.next_event_time() == Some(self.now()) {
            more = self.step();
        }
        more
    }

    /// Time of the earliest pending event, if any
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.engine.next_event_time()
    }

    pub(crate) fn set_horizon(&mut self, horizon: SimTime) {
        self.engine.set_horizon(Some(horizon));
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.engine.stop_handle()
    }

    pub fn stop(&self) {
        self.engine.stop_handle().stop();
    }

    pub fn now(&self) -> SimTime {
        self.engine.current_time()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.floor.world.clock.datetime(self.now())
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.engine.add_observer(observer);
    }

    /// Sample the current state outside the regular sampling tick
    pub fn sample_now(&mut self) -> Arc<Snapshot> {
        self.floor.world.now = self.now();
        self.floor.collector.sample(&self.floor.world)
    }

    pub fn latest_snapshot(&self) -> Arc<Snapshot> {
        self.floor.collector.latest()
    }

    pub fn snapshot_hub(&self) -> SnapshotHub {
        self.floor.collector.hub().clone()
    }

    /// Recorded attributes when no variables are configured
    pub fn time_series(&self) -> Option<&TimeSeries> {
        self.floor.collector.time_series()
    }

    pub fn variables(&self) -> Vec<&Variable> {
        self.floor.collector.variables()
    }

    pub fn machine(&self, id: &str) -> Option<&Machine> {
        match self.floor.world.lookup(id)? {
            EntityRef::Machine(m) => self.floor.world.machines.get(m.index()),
            _ => None,
        }
    }

    pub fn container(&self, id: &str) -> Option<&ResourceContainer> {
        match self.floor.world.lookup(id)? {
            EntityRef::Container(c) => self.floor.world.containers.get(c.index()),
            _ => None,
        }
    }

    pub fn operator(&self, id: &str) -> Option<&Operator> {
        match self.floor.world.lookup(id)? {
            EntityRef::Operator(o) => self.floor.world.operators.get(o.index()),
            _ => None,
        }
    }

    pub fn schedule(&self, id: &str) -> Option<&Schedule> {
        match self.floor.world.lookup(id)? {
            EntityRef::Schedule(s) => self.floor.world.scheduler.schedule(s),
            _ => None,
        }
    }

    pub fn machines(&self) -> &[Machine] {
        &self.floor.world.machines
    }

    pub fn containers(&self) -> &[ResourceContainer] {
        &self.floor.world.containers
    }

    pub fn operators(&self) -> &[Operator] {
        &self.floor.world.operators
    }

    pub fn schedules(&self) -> &[Schedule] {
        self.floor.world.scheduler.schedules()
    }
}
