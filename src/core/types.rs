use chrono::{Duration, NaiveDateTime};

/// Simulated time in seconds since the configured start datetime
pub type SimTime = u64;

pub const SECS_PER_MINUTE: SimTime = 60;
pub const SECS_PER_HOUR: SimTime = 3_600;
pub const SECS_PER_DAY: SimTime = 86_400;

// Largest offset `chrono::Duration::seconds` accepts
const MAX_OFFSET_SECS: i64 = i64::MAX / 1_000;

/// Convert a (possibly fractional) number of hours into whole simulated seconds
pub fn hours_to_secs(hours: f64) -> SimTime {
    (hours.max(0.0) * SECS_PER_HOUR as f64).round() as SimTime
}

/// Convert a (possibly fractional) number of days into whole simulated seconds
pub fn days_to_secs(days: f64) -> SimTime {
    (days.max(0.0) * SECS_PER_DAY as f64).round() as SimTime
}

/// Maps simulated seconds onto calendar datetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    start: NaiveDateTime,
}

impl Clock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { start }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Calendar datetime of a simulated instant
    /// Calendar datetime of a simulated instant, clamped to the last representable datetime
    pub fn datetime(&self, time: SimTime) -> NaiveDateTime {
        let secs = i64::try_from(time).unwrap_or(i64::MAX).min(MAX_OFFSET_SECS);
        self.start
            .checked_add_signed(Duration::seconds(secs))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Simulated instant of a calendar datetime, saturating at the start
    pub fn sim_time(&self, datetime: NaiveDateTime) -> SimTime {
        (datetime - self.start).num_seconds().max(0) as SimTime
    }
}

macro_rules! entity_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position of the entity in its arena
            pub fn index(&self) -> usize {
                self.0
            }
        }
    };
}

entity_handle!(
    /// Stable handle of a machine in the factory arena
    MachineId
);
entity_handle!(
    /// Stable handle of a resource container in the factory arena
    ContainerId
);
entity_handle!(
    /// Stable handle of an operator in the factory arena
    OperatorId
);
entity_handle!(
    /// Stable handle of a schedule in the scheduler book
    ScheduleId
);

/// Any addressable entity of the factory graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Machine(MachineId),
    Container(ContainerId),
    Operator(OperatorId),
    Schedule(ScheduleId),
}

impl EntityRef {
    pub fn kind(&self) -> &'static str {
        match self {
            EntityRef::Machine(_) => "machine",
            EntityRef::Container(_) => "container",
            EntityRef::Operator(_) => "operator",
            EntityRef::Schedule(_) => "schedule",
        }
    }
}
