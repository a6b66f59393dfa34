//! Factory document: serde model, validation and construction.
//!
//! Every cross-reference is checked here so that a loaded factory can run
//! without ever meeting a dangling id.

use super::world::World;
use crate::collector::{Collector, Variable, VariableDef};
use crate::core::config::SimulationConfig;
use crate::core::cron::CronExpr;
use crate::core::errors::ConfigError;
use crate::core::rng::SimRng;
use crate::core::types::{hours_to_secs, Clock, ContainerId, MachineId, ScheduleId, SimTime, SECS_PER_MINUTE};
use crate::model::bom::{Bom, Output, Requirement};
use crate::model::container::ResourceContainer;
use crate::model::failure::{default_parts, FailureProcess, PartSpec};
use crate::model::machine::{Machine, MachineSettings};
use crate::model::maintenance::MaintenanceProfile;
use crate::model::operator::{Operator, WorkSchedule};
use crate::model::program::{Program, ProgramBook};
use crate::model::resource::{Batch, ContentDef, ContentKind};
use crate::schedule::action::{Action, ActionError};
use crate::schedule::block::{Block, Schedule};
use crate::schedule::scheduler::Scheduler;
use log::{info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FactoryConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub materials: Vec<ContentDoc>,
    #[serde(default)]
    pub consumables: Vec<ContentDoc>,
    #[serde(default)]
    pub products: Vec<ContentDoc>,
    #[serde(default)]
    pub containers: Vec<ContainerDoc>,
    #[serde(default)]
    pub boms: Vec<BomDoc>,
    #[serde(default)]
    pub programs: Vec<ProgramDoc>,
    #[serde(default)]
    pub schedules: Vec<ScheduleDoc>,
    #[serde(default)]
    pub maintenance: Vec<MaintenanceDoc>,
    #[serde(default)]
    pub machines: Vec<MachineDoc>,
    #[serde(default)]
    pub operators: Vec<OperatorDoc>,
    /// Part catalogue; the built-in one when absent
    #[serde(default)]
    pub parts: Option<Vec<PartSpec>>,
    #[serde(default)]
    pub collector: CollectorDoc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "content_id", alias = "content-id")]
    pub content: String,
    pub capacity: f64,
    /// Units per hour; zero delivers instantly
    #[serde(default, alias = "fill-rate")]
    pub fill_rate: f64,
    /// Initial level; inputs start full and products empty when absent
    #[serde(default)]
    pub init: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmountDoc {
    #[serde(alias = "material", alias = "consumable", alias = "product")]
    pub id: String,
    #[serde(alias = "consumption")]
    pub quantity: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BomDoc {
    pub id: String,
    #[serde(default)]
    pub materials: Vec<AmountDoc>,
    #[serde(default)]
    pub consumables: Vec<AmountDoc>,
    #[serde(default)]
    pub products: Vec<AmountDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramDoc {
    pub id: String,
    pub bom: String,
    #[serde(default, alias = "duration-minutes")]
    pub duration_minutes: Option<f64>,
    #[serde(default, alias = "duration-secs")]
    pub duration_secs: Option<SimTime>,
    #[serde(default = "one", alias = "temp_factor", alias = "temp-factor", alias = "temperature-factor")]
    pub temperature_factor: f64,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionDoc {
    pub name: String,
    #[serde(default)]
    pub kwargs: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDoc {
    #[serde(default, alias = "id")]
    pub name: Option<String>,
    pub cron: String,
    #[serde(default, alias = "duration-hours")]
    pub duration_hours: Option<f64>,
    #[serde(default, alias = "duration-secs")]
    pub duration_secs: Option<SimTime>,
    #[serde(default)]
    pub priority: i64,
    pub action: ActionDoc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleDoc {
    pub id: String,
    #[serde(default = "operating", alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub blocks: Vec<BlockDoc>,
}

fn operating() -> String {
    "operating".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceDoc {
    pub id: String,
    #[serde(flatten)]
    pub profile: MaintenanceProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub programs: Vec<String>,
    #[serde(default, alias = "default-program")]
    pub default_program: Option<String>,
    #[serde(default)]
    pub containers: Vec<String>,
    /// Maintenance profile id
    #[serde(default)]
    pub maintenance: Option<String>,
    #[serde(default)]
    pub settings: MachineSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default, alias = "work_schedule", alias = "work-schedule")]
    pub schedule: WorkSchedule,
    #[serde(default = "default_recovery_proba", alias = "recovery-proba")]
    pub recovery_proba: f64,
    #[serde(default = "default_check_interval", alias = "check-interval-secs")]
    pub check_interval_secs: SimTime,
}

fn default_recovery_proba() -> f64 {
    0.8
}

fn default_check_interval() -> SimTime {
    600
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorDoc {
    #[serde(default)]
    pub variables: Vec<VariableDef>,
}

/// A validated factory ready to be driven by the engine
pub(crate) struct Loaded {
    pub(crate) world: World,
    pub(crate) collector: Collector,
}

struct Ids {
    entities: HashSet<String>,
}

impl Ids {
    /// Containers, machines, operators and schedules share one namespace
    fn claim(&mut self, kind: &'static str, id: &str) -> Result<(), ConfigError> {
        if id == crate::collector::registry::FACTORY || !self.entities.insert(id.to_string()) {
            return Err(ConfigError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn build(config: FactoryConfig, variables: Vec<Variable>) -> Result<Loaded, ConfigError> {
    config.simulation.validate()?;
    let sim = &config.simulation;
    let clock = Clock::new(sim.start);
    let mut rng = SimRng::new(sim.seed, sim.randomize);
    let mut ids = Ids {
        entities: HashSet::new(),
    };

    let contents = load_contents(&config)?;
    let kind_of: HashMap<&str, ContentKind> =
        contents.iter().map(|c| (c.id.as_str(), c.kind)).collect();

    let containers = load_containers(&config, &kind_of, &mut ids)?;
    let container_index: HashMap<&str, ContainerId> = containers
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id(), ContainerId(i)))
        .collect();

    let book = load_book(&config, &kind_of)?;

    let parts = config.parts.clone().unwrap_or_else(default_parts);
    for part in &parts {
        if !(part.weight >= 0.0) || !(part.repair_hours >= 0.0) {
            return Err(ConfigError::invalid(
                format!("part {}", part.name),
                "weight and repair_hours must be non-negative",
            ));
        }
    }

    let mut schedules = load_schedules(&config, &book, &kind_of, &containers, &container_index, &mut ids)?;
    let schedule_index: HashMap<String, ScheduleId> = schedules
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id().to_string(), ScheduleId(i)))
        .collect();

    let profiles: HashMap<&str, &MaintenanceProfile> = config
        .maintenance
        .iter()
        .map(|m| (m.id.as_str(), &m.profile))
        .collect();

    let mut machines = Vec::with_capacity(config.machines.len());
    let mut owners: HashMap<ScheduleId, String> = HashMap::new();
    for doc in &config.machines {
        ids.claim("machine", &doc.id)?;
        let machine_id = MachineId(machines.len());
        let machine = load_machine(
            doc,
            machine_id,
            &book,
            &containers,
            &container_index,
            &schedule_index,
            &profiles,
            &mut owners,
            &mut schedules,
        )?;
        machines.push(machine);
    }

    for schedule in &schedules {
        if schedule.machine().is_some() {
            continue;
        }
        if let Some(block) = schedule.blocks().iter().find(|b| b.action.targets_machine()) {
            return Err(ConfigError::InvalidActionArgs {
                schedule: schedule.id().to_string(),
                block: block.label.clone(),
                action: block.action.name().to_string(),
                reason: "schedule is not assigned to any machine".into(),
            });
        }
    }

    let mut operators = Vec::with_capacity(config.operators.len());
    for doc in &config.operators {
        ids.claim("operator", &doc.id)?;
        let machine = match &doc.machine {
            Some(m) => {
                let index = machines
                    .iter()
                    .position(|x: &Machine| x.id() == m)
                    .ok_or_else(|| ConfigError::unknown("operator", &doc.id, "machine", m))?;
                // The machine now waits for its operator before starting
                machines[index].operator_present = Some(false);
                Some(MachineId(index))
            }
            None => None,
        };
        if !(0.0..=1.0).contains(&doc.recovery_proba) {
            return Err(ConfigError::invalid(
                format!("operator {}.recovery_proba", doc.id),
                "must lie in [0, 1]",
            ));
        }
        let mut operator = Operator::new(
            doc.id.clone(),
            machine,
            doc.schedule.clone(),
            doc.recovery_proba,
            doc.check_interval_secs,
        );
        if let Some(name) = &doc.name {
            operator.name = name.clone();
        }
        operators.push(operator);
    }

    // Draws for batch tags of initial content come from the shared source
    let containers = fill_initial(containers, &config, &mut rng);

    let world = World::new(
        clock,
        sim.production_step_secs,
        contents,
        book,
        parts,
        containers,
        machines,
        operators,
        Scheduler::new(schedules, clock),
        rng,
    );

    let mut all_variables = Vec::with_capacity(config.collector.variables.len() + variables.len());
    for def in config.collector.variables.iter().cloned() {
        all_variables.push(Variable::try_from(def)?);
    }
    all_variables.extend(variables);
    let collector = Collector::bind(&world, all_variables, sim.retention)?;

    info!(
        "Factory loaded: {} machines, {} containers, {} operators, {} schedules",
        world.machines.len(),
        world.containers.len(),
        world.operators.len(),
        world.scheduler.schedules().len()
    );
    Ok(Loaded { world, collector })
}

fn load_contents(config: &FactoryConfig) -> Result<Vec<ContentDef>, ConfigError> {
    let mut seen = HashSet::new();
    let mut contents = Vec::new();
    let groups = [
        (&config.materials, ContentKind::Material),
        (&config.consumables, ContentKind::Consumable),
        (&config.products, ContentKind::Product),
    ];
    for (docs, kind) in groups {
        for doc in docs {
            if !seen.insert(doc.id.clone()) {
                return Err(ConfigError::DuplicateId {
                    kind: kind.as_str(),
                    id: doc.id.clone(),
                });
            }
            contents.push(ContentDef {
                id: doc.id.clone(),
                name: doc.name.clone().unwrap_or_else(|| doc.id.clone()),
                kind,
            });
        }
    }
    Ok(contents)
}

fn load_containers(
    config: &FactoryConfig,
    kind_of: &HashMap<&str, ContentKind>,
    ids: &mut Ids,
) -> Result<Vec<ResourceContainer>, ConfigError> {
    let mut containers = Vec::with_capacity(config.containers.len());
    for doc in &config.containers {
        ids.claim("container", &doc.id)?;
        let kind = *kind_of
            .get(doc.content.as_str())
            .ok_or_else(|| ConfigError::unknown("container", &doc.id, "content", &doc.content))?;
        if !(doc.capacity >= 0.0) || !(doc.fill_rate >= 0.0) {
            return Err(ConfigError::invalid(
                format!("container {}", doc.id),
                "capacity and fill_rate must be non-negative",
            ));
        }
        if let Some(init) = doc.init {
            if !(0.0..=doc.capacity).contains(&init) {
                return Err(ConfigError::invalid(
                    format!("container {}.init", doc.id),
                    "must lie between 0 and the capacity",
                ));
            }
        }
        let container =
            ResourceContainer::new(doc.id.clone(), doc.content.clone(), kind, doc.capacity, doc.fill_rate);
        containers.push(match &doc.name {
            Some(name) => container.with_name(name.clone()),
            None => container,
        });
    }
    Ok(containers)
}

fn fill_initial(
    mut containers: Vec<ResourceContainer>,
    config: &FactoryConfig,
    rng: &mut SimRng,
) -> Vec<ResourceContainer> {
    for (container, doc) in containers.iter_mut().zip(&config.containers) {
        let quantity = match (doc.init, container.kind()) {
            (Some(init), _) => init,
            (None, ContentKind::Product) => 0.0,
            (None, _) => container.capacity(),
        };
        if quantity > 0.0 {
            let batch_id = format!("{}-INIT-{}", container.content().to_uppercase(), rng.batch_tag());
            container.put_batch(Batch::new(batch_id, quantity, 0));
        }
    }
    containers
}

fn load_book(
    config: &FactoryConfig,
    kind_of: &HashMap<&str, ContentKind>,
) -> Result<ProgramBook, ConfigError> {
    let mut book = ProgramBook::new();
    for doc in &config.boms {
        let amounts = |list: &[AmountDoc], kind: ContentKind| -> Result<Vec<(String, f64)>, ConfigError> {
            list.iter()
                .map(|a| match kind_of.get(a.id.as_str()) {
                    Some(k) if *k == kind => Ok((a.id.clone(), a.quantity)),
                    _ => Err(ConfigError::unknown("bom", &doc.id, kind.as_str(), &a.id)),
                })
                .collect()
        };
        let requirement = |(content, consumption): (String, f64)| Requirement { content, consumption };
        book.add_bom(Bom {
            id: doc.id.clone(),
            materials: amounts(doc.materials.as_slice(), ContentKind::Material)?
                .into_iter()
                .map(requirement)
                .collect(),
            consumables: amounts(doc.consumables.as_slice(), ContentKind::Consumable)?
                .into_iter()
                .map(requirement)
                .collect(),
            products: amounts(doc.products.as_slice(), ContentKind::Product)?
                .into_iter()
                .map(|(content, quantity)| Output { content, quantity })
                .collect(),
        })?;
    }

    for doc in &config.programs {
        let duration_secs = match (doc.duration_secs, doc.duration_minutes) {
            (Some(secs), None) => secs,
            (None, Some(minutes)) => (minutes.max(0.0) * SECS_PER_MINUTE as f64).round() as SimTime,
            _ => {
                return Err(ConfigError::invalid(
                    format!("program {}", doc.id),
                    "exactly one of duration_minutes or duration_secs is required",
                ))
            }
        };
        book.add_program(Program {
            id: doc.id.clone(),
            bom: doc.bom.clone(),
            duration_secs,
            temperature_factor: doc.temperature_factor,
            params: doc.params.clone(),
        })?;
        if let Some((_, bom)) = book.recipe(&doc.id) {
            for output in &bom.products {
                info!(
                    "[Program {}] Max hourly output of {}: {:.3}",
                    doc.id,
                    output.content,
                    book.max_hourly_output(&doc.id, &output.content)
                );
            }
        }
    }
    Ok(book)
}

fn load_schedules(
    config: &FactoryConfig,
    book: &ProgramBook,
    kind_of: &HashMap<&str, ContentKind>,
    containers: &[ResourceContainer],
    container_index: &HashMap<&str, ContainerId>,
    ids: &mut Ids,
) -> Result<Vec<Schedule>, ConfigError> {
    let mut schedules = Vec::with_capacity(config.schedules.len());
    for doc in &config.schedules {
        ids.claim("schedule", &doc.id)?;
        let mut blocks = Vec::with_capacity(doc.blocks.len());
        for (order, block) in doc.blocks.iter().enumerate() {
            let label = block
                .name
                .clone()
                .unwrap_or_else(|| format!("{}#{}", doc.id, order));
            let cron = CronExpr::parse(&block.cron).map_err(|source| ConfigError::Cron {
                schedule: doc.id.clone(),
                block: label.clone(),
                source,
            })?;
            let duration_secs = match (block.duration_secs, block.duration_hours) {
                (Some(secs), None) => secs,
                (None, Some(hours)) => hours_to_secs(hours),
                _ => {
                    return Err(ConfigError::invalid(
                        format!("schedule {} block {}", doc.id, label),
                        "exactly one of duration_hours or duration_secs is required",
                    ))
                }
            };

            let args_error = |reason: String| ConfigError::InvalidActionArgs {
                schedule: doc.id.clone(),
                block: label.clone(),
                action: block.action.name.clone(),
                reason,
            };
            let mut action = Action::parse(&block.action.name, block.action.kwargs.clone())
                .map_err(|e| match e {
                    ActionError::Unknown => ConfigError::UnknownAction {
                        schedule: doc.id.clone(),
                        block: label.clone(),
                        action: block.action.name.clone(),
                    },
                    ActionError::InvalidArgs(reason) => args_error(reason),
                })?;
            match &mut action {
                Action::SwitchProgram { program_id } => {
                    if book.program(program_id).is_none() {
                        return Err(ConfigError::unknown("schedule", &doc.id, "program", program_id));
                    }
                }
                Action::Procurement(args) => {
                    if !kind_of.contains_key(args.content_id.as_str()) {
                        return Err(ConfigError::unknown("schedule", &doc.id, "content", &args.content_id));
                    }
                    if let Some(container_id) = &args.container_id {
                        let id = *container_index.get(container_id.as_str()).ok_or_else(|| {
                            ConfigError::unknown("schedule", &doc.id, "container", container_id)
                        })?;
                        if containers[id.index()].content() != args.content_id {
                            return Err(args_error(format!(
                                "container {} does not hold {}",
                                container_id, args.content_id
                            )));
                        }
                        args.container = Some(id);
                    }
                }
                Action::Maintenance => {}
            }

            blocks.push(Block {
                label,
                cron,
                duration_secs,
                priority: block.priority,
                action,
                order,
            });
        }
        schedules.push(Schedule::new(doc.id.clone(), doc.kind.clone(), blocks));
    }
    Ok(schedules)
}

#[allow(clippy::too_many_arguments)]
fn load_machine(
    doc: &MachineDoc,
    id: MachineId,
    book: &ProgramBook,
    containers: &[ResourceContainer],
    container_index: &HashMap<&str, ContainerId>,
    schedule_index: &HashMap<String, ScheduleId>,
    profiles: &HashMap<&str, &MaintenanceProfile>,
    owners: &mut HashMap<ScheduleId, String>,
    schedules: &mut [Schedule],
) -> Result<Machine, ConfigError> {
    for program in &doc.programs {
        if book.program(program).is_none() {
            return Err(ConfigError::unknown("machine", &doc.id, "program", program));
        }
    }
    if let Some(default) = &doc.default_program {
        if !doc.programs.contains(default) {
            return Err(ConfigError::invalid(
                format!("machine {}.default_program", doc.id),
                format!("'{}' is not one of the machine's programs", default),
            ));
        }
    }

    let profile = match &doc.maintenance {
        Some(m) => (*profiles
            .get(m.as_str())
            .ok_or_else(|| ConfigError::unknown("machine", &doc.id, "maintenance", m))?)
        .clone(),
        None => MaintenanceProfile::default(),
    };
    let [min_days, max_days] = profile.part_fail_freq_days;
    if !(min_days > 0.0) || !(max_days >= min_days) {
        return Err(ConfigError::invalid(
            format!("machine {}.part_fail_freq_days", doc.id),
            "expected 0 < min <= max",
        ));
    }

    let mut machine = Machine::new(
        doc.id.clone(),
        doc.programs.clone(),
        doc.default_program.clone(),
        FailureProcess::new(min_days, max_days),
        doc.settings.clone(),
    );
    if let Some(name) = &doc.name {
        machine.name = name.clone();
    }

    for container in &doc.containers {
        let cid = *container_index
            .get(container.as_str())
            .ok_or_else(|| ConfigError::unknown("machine", &doc.id, "container", container))?;
        match containers[cid.index()].kind() {
            ContentKind::Product => machine.outputs.push(cid),
            ContentKind::Material | ContentKind::Consumable => machine.inputs.push(cid),
        }
    }

    // Every product a machine can make needs somewhere to go
    for program in &doc.programs {
        if let Some((_, bom)) = book.recipe(program) {
            for output in &bom.products {
                let stored = machine
                    .outputs
                    .iter()
                    .any(|c| containers[c.index()].content() == output.content);
                if !stored {
                    return Err(ConfigError::invalid(
                        format!("machine {}", doc.id),
                        format!("no container for product '{}' of program '{}'", output.content, program),
                    ));
                }
            }
        }
    }

    if let Some(schedule) = &doc.schedule {
        let sid = *schedule_index
            .get(schedule)
            .ok_or_else(|| ConfigError::unknown("machine", &doc.id, "schedule", schedule))?;
        if let Some(first) = owners.get(&sid) {
            return Err(ConfigError::ScheduleShared {
                schedule: schedule.clone(),
                first: first.clone(),
                second: doc.id.clone(),
            });
        }
        owners.insert(sid, doc.id.clone());
        machine.schedule = Some(sid);
        schedules[sid.index()].machine = Some(id);

        for block in schedules[sid.index()].blocks() {
            if let Action::SwitchProgram { program_id } = &block.action {
                if !doc.programs.contains(program_id) {
                    warn!(
                        "[Machine {}] Block {} switches to {}, which is not assigned to this machine",
                        doc.id,
                        block.label,
                        program_id
                    );
                }
            }
        }
    }

    Ok(machine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as Json};

    fn shop() -> Json {
        json!({
            "simulation": { "randomize": false },
            "materials": [{ "id": "steel" }],
            "products": [{ "id": "gear" }],
            "containers": [
                { "id": "rack", "content": "steel", "capacity": 50.0 },
                { "id": "bin", "content": "gear", "capacity": 20.0 }
            ],
            "boms": [{
                "id": "b1",
                "materials": [{ "material": "steel", "consumption": 3.0 }],
                "products": [{ "product": "gear", "quantity": 1.0 }]
            }],
            "programs": [{ "id": "p1", "bom": "b1", "duration_minutes": 10.0 }],
            "schedules": [{
                "id": "plan",
                "blocks": [{
                    "cron": "0 8 * * *",
                    "duration_hours": 8.0,
                    "action": { "name": "switch-program", "kwargs": { "program_id": "p1" } }
                }]
            }],
            "machines": [{
                "id": "m1",
                "schedule": "plan",
                "programs": ["p1"],
                "containers": ["rack", "bin"]
            }]
        })
    }

    fn load(document: Json) -> Result<Loaded, ConfigError> {
        let config: FactoryConfig = serde_json::from_value(document).unwrap();
        build(config, Vec::new())
    }

    #[test]
    fn test_valid_document_loads() {
        let loaded = load(shop()).unwrap();
        let world = &loaded.world;
        assert_eq!(world.machines[0].input_containers(), &[ContainerId(0)]);
        assert_eq!(world.machines[0].output_containers(), &[ContainerId(1)]);
        // Inputs start full, products empty
        assert_eq!(world.containers[0].level(), 50.0);
        assert_eq!(world.containers[1].level(), 0.0);
        assert_eq!(world.scheduler.schedules()[0].machine(), Some(MachineId(0)));
        assert!(loaded.collector.time_series().is_some());
    }

    #[test]
    fn test_ids_share_one_namespace() {
        let mut doc = shop();
        doc["machines"][0]["id"] = json!("rack");
        assert!(matches!(
            load(doc),
            Err(ConfigError::DuplicateId { kind: "machine", .. })
        ));

        let mut doc = shop();
        doc["containers"][0]["id"] = json!("factory");
        doc["machines"][0]["containers"] = json!(["factory", "bin"]);
        assert!(matches!(load(doc), Err(ConfigError::DuplicateId { .. })));
    }

    #[test]
    fn test_dangling_references_rejected() {
        let mut doc = shop();
        doc["machines"][0]["programs"] = json!(["p1", "p2"]);
        assert!(matches!(load(doc), Err(ConfigError::UnknownReference { .. })));

        let mut doc = shop();
        doc["programs"][0]["bom"] = json!("nope");
        assert!(matches!(load(doc), Err(ConfigError::UnknownReference { .. })));

        let mut doc = shop();
        doc["machines"][0]["schedule"] = json!("elsewhere");
        assert!(matches!(load(doc), Err(ConfigError::UnknownReference { .. })));
    }

    #[test]
    fn test_bad_cron_names_block() {
        let mut doc = shop();
        doc["schedules"][0]["blocks"][0]["cron"] = json!("0 25 * * *");
        match load(doc) {
            Err(ConfigError::Cron { schedule, block, .. }) => {
                assert_eq!(schedule, "plan");
                assert_eq!(block, "plan#0");
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_schedule_cannot_drive_two_machines() {
        let mut doc = shop();
        let mut second = doc["machines"][0].clone();
        second["id"] = json!("m2");
        doc["machines"].as_array_mut().unwrap().push(second);
        assert!(matches!(load(doc), Err(ConfigError::ScheduleShared { .. })));
    }

    #[test]
    fn test_machine_action_needs_a_machine() {
        let mut doc = shop();
        doc["machines"][0]["schedule"] = Json::Null;
        assert!(matches!(load(doc), Err(ConfigError::InvalidActionArgs { .. })));
    }

    #[test]
    fn test_product_needs_output_container() {
        let mut doc = shop();
        doc["machines"][0]["containers"] = json!(["rack"]);
        assert!(matches!(load(doc), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_procurement_target_must_hold_content() {
        let mut doc = shop();
        doc["schedules"].as_array_mut().unwrap().push(json!({
            "id": "deliveries",
            "blocks": [{
                "cron": "0 6 * * *",
                "duration_secs": 60,
                "action": {
                    "name": "procurement",
                    "kwargs": { "content": "steel", "container": "bin", "quantity": 5.0 }
                }
            }]
        }));
        assert!(matches!(load(doc), Err(ConfigError::InvalidActionArgs { .. })));
    }

    #[test]
    fn test_block_needs_exactly_one_duration() {
        let mut doc = shop();
        doc["schedules"][0]["blocks"][0]["duration_secs"] = json!(60);
        assert!(matches!(load(doc), Err(ConfigError::InvalidValue { .. })));
    }
}
