use factory_sim::{
    ConfigError, DeclaredType, Factory, FactoryConfig, FactoryError, RunPacing, SimTime, Transform, Value,
    Variable,
};
use serde_json::json;
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn demo_config() -> FactoryConfig {
    serde_json::from_str(include_str!("../demos/factory.json")).unwrap()
}

#[test]
fn test_live_run_publishes_and_finishes() {
    init_logger();
    let factory = Factory::from_config(demo_config()).unwrap();
    let live = factory.spawn(2.0, RunPacing::default().with_sample_every(Duration::from_millis(5)));

    let hub = live.snapshot_hub().clone();
    let first = hub.wait_newer(0, Duration::from_secs(10)).expect("no snapshot published");
    assert!(first.sequence > 0);
    assert!(first.get("Oven.State").is_some());

    let factory = live.join().unwrap();
    assert_eq!(factory.now(), 2 * 86_400);
    let last = hub.latest();
    assert_eq!(last.sim_time, factory.now());
    assert!(last.sequence >= first.sequence);
}

#[test]
fn test_live_run_stops_on_request() {
    init_logger();
    let factory = Factory::from_config(demo_config()).unwrap();
    // One simulated minute per wall-clock second: thirty days would take weeks
    let live = factory.spawn(30.0, RunPacing::default().with_speed(60.0));

    let hub = live.snapshot_hub().clone();
    assert!(hub.wait_newer(0, Duration::from_secs(10)).is_some());
    live.stop();

    let factory = live.join().unwrap();
    assert!(factory.now() < 30 * 86_400);
}

#[test]
fn test_huge_day_counts_saturate() {
    init_logger();
    let mut factory = Factory::from_config(demo_config()).unwrap();
    factory.run(0.5);
    factory.stop();
    assert_eq!(factory.run(1e15), 43_200);
    assert_eq!(factory.run(f64::MAX), 43_200);

    let factory = Factory::from_config(demo_config()).unwrap();
    let live = factory.spawn(1e15, RunPacing::default().with_sample_every(Duration::from_millis(5)));
    assert!(live.snapshot_hub().wait_newer(0, Duration::from_secs(10)).is_some());
    live.stop();
    let factory = live.join().unwrap();
    assert!(factory.now() < SimTime::MAX);
}

#[test]
fn test_subscribers_receive_every_sample() {
    init_logger();
    let mut factory = Factory::from_config(demo_config()).unwrap();
    let rx = factory.snapshot_hub().subscribe();

    factory.run_until(4 * 3_600);

    let received: Vec<_> = rx.try_iter().collect();
    // Every 15 minutes from midnight, both ends included
    assert_eq!(received.len(), 17);
    assert!(received.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(received.last().unwrap().sim_time, 4 * 3_600);
    assert_eq!(
        received[4].get("Clock"),
        Some(&Value::from("2024-01-01T01:00:00"))
    );
}

#[test]
fn test_sampling_twice_at_same_instant_is_idempotent() {
    init_logger();
    let mut config = demo_config();
    config.collector.variables.clear();
    let mut factory = Factory::from_config(config).unwrap();
    factory.run(0.5);

    let first = factory.sample_now();
    let recorded = factory.time_series().unwrap().len();
    let second = factory.sample_now();

    assert_eq!(first.values, second.values);
    assert!(second.sequence > first.sequence);
    assert_eq!(factory.time_series().unwrap().len(), recorded);
    assert!(first.get("oven.state").is_some());
    assert!(factory
        .time_series()
        .unwrap()
        .latest("flour_silo", "level")
        .is_some());
}

#[test]
fn test_unknown_path_is_a_load_error() {
    init_logger();
    for source in ["oven.colour", "ghost.state", "oven", "factory.weather", "oven.consumption.cocoa"] {
        let mut config = demo_config();
        config.collector.variables = vec![serde_json::from_value(json!({
            "id": "Broken",
            "source": source,
            "dtype": "Double"
        }))
        .unwrap()];
        match Factory::from_config(config) {
            Err(ConfigError::PathResolution { variable, path, .. }) => {
                assert_eq!(variable, "Broken");
                assert_eq!(path, source);
            }
            other => panic!("{} resolved: {:?}", source, other.err()),
        }
    }
}

#[test]
fn test_custom_transform_variable() {
    init_logger();
    let hot = Variable::new("Oven.Hot", "oven.temperature", DeclaredType::Boolean).with_transform(Transform::custom(
        |raw| raw.and_then(|v| v.as_f64()).map(|t| Value::Bool(t > 30.0)),
    ));
    let mut factory = Factory::from_config_with_variables(demo_config(), vec![hot]).unwrap();

    // Monday 00:00, the oven is cold
    let cold = factory.sample_now();
    assert_eq!(cold.get("Oven.Hot"), Some(&Value::Bool(false)));
    assert!(factory.variables().iter().any(|v| v.id == "Oven.Hot"));
}

#[test]
fn test_duplicate_variable_rejected() {
    init_logger();
    let extra = Variable::new("Oven.State", "oven.state", DeclaredType::String);
    let err = Factory::from_config_with_variables(demo_config(), vec![extra]).err();
    assert!(matches!(err, Some(ConfigError::DuplicateId { kind: "variable", .. })));
}

#[test]
fn test_json_errors_surface_through_factory_error() {
    init_logger();
    assert!(matches!(Factory::from_json_str("{ not json"), Err(FactoryError::Json(_))));
    assert!(matches!(
        Factory::from_json_path("/nonexistent/factory.json"),
        Err(FactoryError::Io(_))
    ));
    let unknown_action = json!({
        "machines": [],
        "schedules": [{
            "id": "s",
            "blocks": [{ "cron": "0 6 * * *", "duration_hours": 1.0, "action": { "name": "dance" } }]
        }]
    });
    assert!(matches!(
        Factory::from_json_str(&unknown_action.to_string()),
        Err(FactoryError::Config(ConfigError::UnknownAction { .. }))
    ));
}
