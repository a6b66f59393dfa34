pub mod bom;
pub mod container;
pub mod failure;
pub mod machine;
pub mod maintenance;
pub mod operator;
pub mod program;
pub mod resource;

pub use bom::{Bom, Output, Requirement};
pub use container::ResourceContainer;
pub use failure::{FailureProcess, PartSpec};
pub use machine::{ErrorKind, Machine, MachineError, MachineEvent, MachineSettings, MachineState};
pub use maintenance::MaintenanceProfile;
pub use operator::{Operator, OperatorState, WorkSchedule};
pub use program::{Program, ProgramBook};
pub use resource::{Batch, ContentDef, ContentKind};
