pub mod action;
pub mod block;
pub mod scheduler;

pub use action::{Action, Dispatch, ProcurementArgs, Spread};
pub use block::{Block, Schedule};
pub use scheduler::{ScheduleEvent, Scheduler};
