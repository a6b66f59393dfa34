use factory_sim::{Factory, RunPacing};
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp(None)
        .init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/demos/factory.json").to_string());
    let days: f64 = match args.next() {
        Some(days) => days.parse()?,
        None => 7.0,
    };

    println!("Loading factory from {}", path);
    let factory = Factory::from_json_path(&path)?;
    println!("  Start: {}", factory.datetime());
    println!("  Seed: {}", factory.config().seed);
    for machine in factory.machines() {
        println!("  Machine {} ({}): programs {:?}", machine.id(), machine.name(), machine.programs());
    }
    println!();

    // Flat out, with a sampler publishing every 50ms of wall time
    let live = factory.spawn(days, RunPacing::default().with_sample_every(Duration::from_millis(50)));
    let hub = live.snapshot_hub().clone();
    let mut seen = hub.sequence();
    while !live.is_finished() {
        if let Some(snapshot) = hub.wait_newer(seen, Duration::from_millis(200)) {
            seen = snapshot.sequence;
            if let Some(state) = snapshot.get("Oven.State") {
                println!("[{}] oven {}", snapshot.datetime, state);
            }
        }
    }
    let mut factory = live.join()?;

    println!();
    println!("Finished at {}", factory.datetime());
    let last = factory.sample_now();
    for (id, value) in &last.values {
        println!("  {:<20} {}", id, value);
    }
    for machine in factory.machines() {
        let c = machine.counters();
        println!(
            "  {}: {} runs, {} aborted, {} failures, good {:.1}, scrap {:.1}",
            machine.id(),
            c.runs_completed,
            c.runs_aborted,
            c.failures,
            c.success_quantity,
            c.failed_quantity
        );
    }
    Ok(())
}
