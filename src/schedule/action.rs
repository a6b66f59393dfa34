//! Actions a schedule block applies while its window is effective.
//!
//! Action names and their keyword arguments are checked once when the
//! document is loaded; afterwards an [`Action`] is a plain typed value.

use crate::core::types::{ContainerId, MachineId};
use crate::model::machine::MachineEvent;
use serde::Deserialize;
use serde_json::Value;

/// `[mean, standard deviation]` of a normal draw
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "[f64; 2]")]
pub struct Spread {
    pub mean: f64,
    pub std_dev: f64,
}

impl From<[f64; 2]> for Spread {
    fn from([mean, std_dev]: [f64; 2]) -> Self {
        Self { mean, std_dev }
    }
}

fn default_spread() -> Spread {
    Spread { mean: 1.0, std_dev: 0.001 }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcurementArgs {
    #[serde(alias = "content-id", alias = "content")]
    pub content_id: String,
    /// Explicit target; otherwise the first container of the content with room
    #[serde(default, alias = "container-id", alias = "container")]
    pub container_id: Option<String>,
    pub quantity: f64,
    #[serde(default = "default_spread")]
    pub quality: Spread,
    #[serde(default = "default_spread", alias = "consumption-factor")]
    pub consumption_factor: Spread,
    #[serde(default, alias = "fail-proba")]
    pub fail_proba: f64,
    #[serde(skip)]
    pub container: Option<ContainerId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct SwitchProgramArgs {
    #[serde(alias = "program-id", alias = "program")]
    program_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
struct MaintenanceArgs {}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SwitchProgram { program_id: String },
    Procurement(ProcurementArgs),
    Maintenance,
}

/// Effect of a block boundary, delivered to its target as a message
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Machine(MachineId, MachineEvent),
    Procure(ProcurementArgs),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    Unknown,
    InvalidArgs(String),
}

type Parser = fn(Value) -> Result<Action, String>;

/// Action names accepted in documents
const ACTIONS: &[(&str, Parser)] = &[
    ("switch-program", parse_switch_program),
    ("switch_program", parse_switch_program),
    ("procurement", parse_procurement),
    ("maintenance", parse_maintenance),
];

fn args<T: for<'de> Deserialize<'de>>(kwargs: Value) -> Result<T, String> {
    let kwargs = match kwargs {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(kwargs).map_err(|e| e.to_string())
}

fn parse_switch_program(kwargs: Value) -> Result<Action, String> {
    let SwitchProgramArgs { program_id } = args(kwargs)?;
    Ok(Action::SwitchProgram { program_id })
}

fn parse_procurement(kwargs: Value) -> Result<Action, String> {
    let parsed: ProcurementArgs = args(kwargs)?;
    if !(parsed.quantity >= 0.0) || !parsed.quantity.is_finite() {
        return Err("quantity must be a non-negative number".into());
    }
    if !(0.0..=1.0).contains(&parsed.fail_proba) {
        return Err("fail_proba must lie in [0, 1]".into());
    }
    if parsed.quality.std_dev < 0.0 || parsed.consumption_factor.std_dev < 0.0 {
        return Err("standard deviations must be non-negative".into());
    }
    Ok(Action::Procurement(parsed))
}

fn parse_maintenance(kwargs: Value) -> Result<Action, String> {
    let MaintenanceArgs {} = args(kwargs)?;
    Ok(Action::Maintenance)
}

impl Action {
    pub fn parse(name: &str, kwargs: Value) -> Result<Action, ActionError> {
        let (_, parser) = ACTIONS
            .iter()
            .find(|(n, _)| *n == name)
            .ok_or(ActionError::Unknown)?;
        parser(kwargs).map_err(ActionError::InvalidArgs)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::SwitchProgram { .. } => "switch-program",
            Action::Procurement(_) => "procurement",
            Action::Maintenance => "maintenance",
        }
    }

    /// Whether the action needs the schedule to be assigned to a machine
    pub fn targets_machine(&self) -> bool {
        !matches!(self, Action::Procurement(_))
    }

    /// Effect when the block becomes effective
    pub fn on_start(&self, machine: Option<MachineId>) -> Option<Dispatch> {
        match self {
            Action::SwitchProgram { program_id } => machine.map(|m| {
                Dispatch::Machine(m, MachineEvent::SwitchProgram(program_id.clone()))
            }),
            Action::Procurement(args) => Some(Dispatch::Procure(args.clone())),
            Action::Maintenance => {
                machine.map(|m| Dispatch::Machine(m, MachineEvent::BeginMaintenance))
            }
        }
    }

    /// Effect when the block's window ends, naturally or by preemption
    pub fn on_end(&self, machine: Option<MachineId>) -> Option<Dispatch> {
        match self {
            Action::SwitchProgram { .. } => {
                machine.map(|m| Dispatch::Machine(m, MachineEvent::PlannedWindowEnded))
            }
            Action::Procurement(_) => None,
            Action::Maintenance => machine.map(|m| Dispatch::Machine(m, MachineEvent::EndMaintenance)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_switch_program_parses() {
        let action = Action::parse("switch-program", json!({"program_id": "p1"})).unwrap();
        assert_eq!(action, Action::SwitchProgram { program_id: "p1".into() });
        assert!(action.targets_machine());
    }

    #[test]
    fn test_procurement_defaults() {
        let action = Action::parse(
            "procurement",
            json!({"content_id": "steel", "quantity": 100.0}),
        )
        .unwrap();
        let Action::Procurement(args) = action else {
            panic!("expected procurement");
        };
        assert_eq!(args.quality, Spread { mean: 1.0, std_dev: 0.001 });
        assert_eq!(args.fail_proba, 0.0);
        assert_eq!(args.container, None);
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(Action::parse("teleport", Value::Null), Err(ActionError::Unknown));
    }

    #[test]
    fn test_malformed_kwargs() {
        assert!(matches!(
            Action::parse("switch-program", json!({})),
            Err(ActionError::InvalidArgs(_))
        ));
        assert!(matches!(
            Action::parse("maintenance", json!({"speed": 2})),
            Err(ActionError::InvalidArgs(_))
        ));
        assert!(matches!(
            Action::parse("procurement", json!({"content_id": "x", "quantity": 1, "fail_proba": 2.0})),
            Err(ActionError::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_effects_pair_up() {
        let m = Some(MachineId(0));
        let maintenance = Action::Maintenance;
        assert_eq!(
            maintenance.on_start(m),
            Some(Dispatch::Machine(MachineId(0), MachineEvent::BeginMaintenance))
        );
        assert_eq!(
            maintenance.on_end(m),
            Some(Dispatch::Machine(MachineId(0), MachineEvent::EndMaintenance))
        );
        assert!(Action::Maintenance.on_start(None).is_none());
    }
}
