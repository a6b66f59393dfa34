pub mod collector;
pub mod core;
pub mod factory;
pub mod model;
pub mod replicate;
pub mod schedule;

// Re-export commonly used types
pub use crate::collector::{DeclaredType, Snapshot, SnapshotHub, Transform, TransformSpec, Value, Variable};
pub use crate::core::config::SimulationConfig;
pub use crate::core::errors::{ConfigError, CronError, FactoryError};
pub use crate::core::simulation_engine::{SimulationObserver, StopHandle};
pub use crate::core::types::SimTime;
pub use crate::factory::{Factory, FactoryConfig, LiveRun, RunPacing};
pub use crate::model::{MachineState, OperatorState};
pub use crate::replicate::{run_replicas, ReplicaSummary};
