use factory_sim::{Factory, FactoryConfig, MachineState, Value};
use serde_json::{json, Value as Json};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

const EPS: f64 = 1e-6;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One machine making gears from steel, deterministic, no operator
fn gear_shop(blocks: Json) -> Json {
    json!({
        "simulation": {
            "seed": 7,
            "randomize": false,
            "start": "2024-01-01T00:00:00",
            "production_step_secs": 60,
            "sample_interval_secs": 60
        },
        "materials": [{ "id": "steel" }],
        "products": [{ "id": "gear" }],
        "containers": [
            { "id": "steel_rack", "content": "steel", "capacity": 1000.0 },
            { "id": "gear_bin", "content": "gear", "capacity": 100.0 }
        ],
        "boms": [{
            "id": "gear_bom",
            "materials": [{ "id": "steel", "quantity": 6.0 }],
            "products": [{ "id": "gear", "quantity": 2.0 }]
        }],
        "programs": [
            { "id": "p_low", "bom": "gear_bom", "duration_minutes": 60.0 },
            { "id": "p_high", "bom": "gear_bom", "duration_minutes": 30.0 }
        ],
        "schedules": [{ "id": "press_plan", "blocks": blocks }],
        "machines": [{
            "id": "press",
            "schedule": "press_plan",
            "programs": ["p_low", "p_high"],
            "default_program": "p_low",
            "containers": ["steel_rack", "gear_bin"]
        }],
        "collector": {
            "variables": [
                {
                    "id": "Machine.State",
                    "source": "press.state",
                    "dtype": "Int64",
                    "transform": {
                        "kind": "map",
                        "table": { "off": 0, "on": 1, "production": 2, "error": 3 }
                    }
                },
                { "id": "Machine.ErrorCode", "source": "press.error_code", "dtype": "Int64" },
                { "id": "Machine.Program", "source": "press.program", "dtype": "String", "default": "" },
                { "id": "Gears.Level", "source": "gear_bin.level", "dtype": "Double" }
            ]
        }
    })
}

fn load(document: Json) -> Factory {
    let config: FactoryConfig = serde_json::from_value(document).unwrap();
    Factory::from_config(config).unwrap()
}

fn window(cron: &str, hours: f64, priority: i64, program: &str) -> Json {
    json!({
        "name": program,
        "cron": cron,
        "duration_hours": hours,
        "priority": priority,
        "action": { "name": "switch-program", "kwargs": { "program_id": program } }
    })
}

fn observed_states(rx: &Receiver<Arc<factory_sim::Snapshot>>) -> Vec<i64> {
    let mut states: Vec<i64> = Vec::new();
    for snapshot in rx.try_iter() {
        if let Some(Value::Int(code)) = snapshot.get("Machine.State") {
            if states.last() != Some(code) {
                states.push(*code);
            }
        }
    }
    states
}

#[test]
fn test_operating_window_drives_state_sequence() {
    init_logger();
    let mut factory = load(gear_shop(json!([window("30 7 * * *", 4.0, 0, "p_low")])));
    let rx = factory.snapshot_hub().subscribe();

    factory.run(1.0);

    let press = factory.machine("press").unwrap();
    let transitions: Vec<(u64, i64, i64)> = press
        .journal()
        .iter()
        .map(|c| (c.at, c.from.code(), c.to.code()))
        .collect();
    // 07:30 + 45s startup, 11:30 window end, 40s shutdown
    assert_eq!(
        transitions,
        vec![(27_045, 0, 1), (27_045, 1, 2), (41_400, 2, 1), (41_400 + 40, 1, 0)]
    );
    assert_eq!(press.state(), MachineState::Off);

    // On lasts zero seconds at startup, so sampling sees it only on the way down
    assert_eq!(observed_states(&rx), vec![0, 2, 1, 0]);
    assert_eq!(factory.now(), 86_400);
}

#[test]
fn test_window_end_keeps_completed_output_and_conserves_material() {
    init_logger();
    let mut factory = load(gear_shop(json!([window("30 7 * * *", 4.0, 0, "p_low")])));
    factory.run(1.0);

    let press = factory.machine("press").unwrap();
    // Runs end at 08:30:45, 09:30:45 and 10:30:45; the fourth is cut off at 11:30
    assert_eq!(press.counters().runs_completed, 3);
    assert_eq!(press.interrupt_code(), 3);

    let gears = factory.container("gear_bin").unwrap();
    assert!((gears.level() - 6.0).abs() < EPS);
    assert!((press.counters().success_quantity - 6.0).abs() < EPS);

    let steel = factory.container("steel_rack").unwrap();
    let used = press.counters().consumption["steel"];
    // Three full runs plus 59 of 60 steps of the interrupted one
    assert!((used - (18.0 + 6.0 * 59.0 / 60.0)).abs() < EPS);
    assert!((1000.0 - steel.level() - used).abs() < EPS);
    assert!((steel.stats().drawn - used).abs() < EPS);
}

#[test]
fn test_failed_procurement_leaves_container_untouched() {
    init_logger();
    let procure = |fail_proba: f64| {
        json!({
            "simulation": { "seed": 3, "randomize": true, "start": "2024-01-01T00:00:00" },
            "materials": [{ "id": "flour" }],
            "containers": [{ "id": "silo", "content": "flour", "capacity": 100.0, "init": 20.0 }],
            "schedules": [{
                "id": "deliveries",
                "kind": "procurement",
                "blocks": [{
                    "cron": "0 6 * * *",
                    "duration_secs": 60,
                    "action": {
                        "name": "procurement",
                        "kwargs": { "content_id": "flour", "quantity": 50.0, "fail_proba": fail_proba }
                    }
                }]
            }]
        })
    };

    let mut factory = load(procure(1.0));
    factory.run(0.5);
    let silo = factory.container("silo").unwrap();
    assert!((silo.level() - 20.0).abs() < EPS);
    assert_eq!(silo.n_batches(), 1);
    assert_eq!(silo.stats().procurement_failures, 1);
    assert_eq!(silo.stats().batches_received, 1);
    assert!(silo.last_batch().unwrap().batch_id.starts_with("FLOUR-INIT-"));

    let mut factory = load(procure(0.0));
    factory.run(0.5);
    let silo = factory.container("silo").unwrap();
    assert!((silo.level() - 70.0).abs() < EPS);
    assert_eq!(silo.n_batches(), 2);
    assert!(silo
        .last_batch()
        .unwrap()
        .batch_id
        .starts_with("FLOUR-20240101060000-"));
}

#[test]
fn test_part_failure_halts_production_mid_run() {
    init_logger();
    let mut document = gear_shop(json!([window("30 7 * * *", 4.0, 0, "p_low")]));
    document["maintenance"] = json!([{ "id": "fragile", "part_fail_freq_days": [0.4, 0.4] }]);
    document["machines"][0]["maintenance"] = json!("fragile");
    let mut factory = load(document);

    factory.run(0.5);

    let press = factory.machine("press").unwrap();
    assert_eq!(press.state(), MachineState::Error);
    assert_eq!(press.error_code(), 201);
    let last = press.journal().last().unwrap();
    // 0.4 days after start: 09:36
    assert_eq!((last.at, last.from, last.to), (34_560, MachineState::Production, MachineState::Error));

    // Two runs finished before the failure, the third is lost
    assert_eq!(press.counters().runs_completed, 2);
    assert_eq!(press.counters().runs_aborted, 1);
    assert_eq!(press.counters().failures, 1);
    let gears = factory.container("gear_bin").unwrap();
    assert!((gears.level() - 4.0).abs() < EPS);

    let snapshot = factory.latest_snapshot();
    assert_eq!(snapshot.get("Machine.State"), Some(&Value::Int(3)));
    assert_eq!(snapshot.get("Machine.ErrorCode"), Some(&Value::Int(201)));
}

#[test]
fn test_higher_priority_block_applies_during_overlap() {
    init_logger();
    let blocks = json!([
        window("0 7 * * *", 6.0, -1, "p_low"),
        window("0 9 * * *", 2.0, 1, "p_high")
    ]);
    let mut factory = load(gear_shop(blocks));

    factory.run_until(10 * 3_600);
    let press = factory.machine("press").unwrap();
    assert_eq!(press.current_program(), Some("p_high"));
    assert_eq!(press.state(), MachineState::Production);
    let plan = factory.schedule("press_plan").unwrap();
    assert_eq!(plan.active_block().map(|b| b.label.as_str()), Some("p_high"));
    assert_eq!(plan.stats().preemptions, 1);
    assert_eq!(
        factory.latest_snapshot().get("Machine.Program"),
        Some(&Value::from("p_high"))
    );

    // The preempted block does not come back once the winner ends at 11:00
    factory.run_until(12 * 3_600);
    assert_eq!(factory.machine("press").unwrap().state(), MachineState::Off);
}

#[test]
fn test_floor_is_settled_after_every_instant() {
    init_logger();
    let blocks = json!([
        window("0 7 * * *", 6.0, -1, "p_low"),
        window("0 9 * * *", 2.0, 1, "p_high")
    ]);
    let mut factory = load(gear_shop(blocks));

    let mut at_seven = Vec::new();
    while factory.now() < 86_400 && factory.step_instant() {
        // Nothing of the instant just processed is left in the queue
        assert!(factory.next_event_time().map_or(true, |t| t > factory.now()));

        let open = factory.schedule("press_plan").unwrap().active_block().is_some();
        let press = factory.machine("press").unwrap();
        assert_eq!(press.planned_operating_time(), open, "at t={}", factory.now());
        if factory.now() == 7 * 3_600 {
            at_seven.push((press.planned_operating_time(), press.state()));
        }
    }
    // The window opening and the machine reacting to it are one observation
    assert_eq!(at_seven, vec![(true, MachineState::Off)]);
}

#[test]
fn test_lower_priority_block_is_skipped_while_higher_runs() {
    init_logger();
    let blocks = json!([
        window("0 7 * * *", 6.0, 1, "p_high"),
        window("0 9 * * *", 2.0, -1, "p_low")
    ]);
    let mut factory = load(gear_shop(blocks));

    factory.run_until(10 * 3_600);
    let press = factory.machine("press").unwrap();
    assert_eq!(press.current_program(), Some("p_high"));
    let plan = factory.schedule("press_plan").unwrap();
    assert_eq!(plan.stats().skipped, 1);
    assert_eq!(plan.stats().preemptions, 0);
}

#[test]
fn test_container_levels_stay_within_bounds() {
    init_logger();
    let document: Json = serde_json::from_str(include_str!("../demos/factory.json")).unwrap();
    let mut factory = load(document);

    for _ in 0..7 {
        factory.run(1.0);
        for container in factory.containers() {
            assert!(container.level() >= -EPS, "{} below zero", container.id());
            assert!(
                container.level() <= container.capacity() + EPS,
                "{} above capacity",
                container.id()
            );
            let stats = container.stats();
            assert!((stats.received - stats.drawn - container.level()).abs() < 1e-6);
        }
    }
    assert_eq!(factory.now(), 7 * 86_400);
}

#[test]
fn test_gradual_fill_arrives_in_steps() {
    init_logger();
    let mut factory = load(json!({
        "simulation": { "randomize": false, "start": "2024-01-01T00:00:00" },
        "consumables": [{ "id": "water" }],
        "containers": [{ "id": "tank", "content": "water", "capacity": 10.0, "fill_rate": 30.0, "init": 0.0 }],
        "schedules": [{
            "id": "refill",
            "blocks": [{
                "cron": "0 6 * * *",
                "duration_secs": 60,
                "action": { "name": "procurement", "kwargs": { "content_id": "water", "quantity": 2.0 } }
            }]
        }]
    }));

    // Half a unit per minute from 06:00
    factory.run_until(6 * 3_600 + 120);
    let tank = factory.container("tank").unwrap();
    assert!((tank.level() - 1.0).abs() < EPS);
    assert_eq!(tank.n_batches(), 1);

    factory.run_until(7 * 3_600);
    let tank = factory.container("tank").unwrap();
    assert!((tank.level() - 2.0).abs() < EPS);
    assert_eq!(tank.stats().batches_received, 1);
    assert!(tank.last_batch().unwrap().batch_id.starts_with("WATER-20240101060000-"));
}
