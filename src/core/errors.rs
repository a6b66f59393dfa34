use thiserror::Error;

/// Malformed cron expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CronError {
    #[error("expected 5 fields (minute hour day-of-month month day-of-week), got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} value {value} outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// Problems found while loading a factory description.
///
/// All of these abort start-up before any simulated time has passed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{owner_kind} '{owner}' references unknown {target_kind} '{id}'")]
    UnknownReference {
        owner_kind: &'static str,
        owner: String,
        target_kind: &'static str,
        id: String,
    },

    #[error("schedule '{schedule}' block '{block}': {source}")]
    Cron {
        schedule: String,
        block: String,
        #[source]
        source: CronError,
    },

    #[error("schedule '{schedule}' block '{block}': unknown action '{action}'")]
    UnknownAction {
        schedule: String,
        block: String,
        action: String,
    },

    #[error("schedule '{schedule}' block '{block}': invalid arguments for '{action}': {reason}")]
    InvalidActionArgs {
        schedule: String,
        block: String,
        action: String,
        reason: String,
    },

    #[error("schedule '{schedule}' is assigned to both '{first}' and '{second}'")]
    ScheduleShared {
        schedule: String,
        first: String,
        second: String,
    },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("collector variable '{variable}': cannot resolve '{path}': {reason}")]
    PathResolution {
        variable: String,
        path: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(
        owner_kind: &'static str,
        owner: &str,
        target_kind: &'static str,
        id: &str,
    ) -> Self {
        ConfigError::UnknownReference {
            owner_kind,
            owner: owner.to_string(),
            target_kind,
            id: id.to_string(),
        }
    }
}

/// Top-level error of the public factory API
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("simulation thread panicked")]
    RunnerPanicked,
}
