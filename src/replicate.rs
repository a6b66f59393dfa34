//! Independent replicas of one factory document, run in parallel.
//!
//! Each replica owns its own world and random source, so results depend only
//! on the document and the seed.

use crate::collector::Snapshot;
use crate::core::errors::ConfigError;
use crate::factory::{Factory, FactoryConfig};
use log::info;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Production totals of one machine at the end of a replica
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSummary {
    pub runs_completed: u64,
    pub runs_aborted: u64,
    pub failures: u64,
    pub interrupts: u64,
    pub success_quantity: f64,
    pub failed_quantity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicaSummary {
    pub seed: u64,
    pub snapshot: Snapshot,
    pub machines: BTreeMap<String, MachineSummary>,
}

impl ReplicaSummary {
    fn collect(seed: u64, factory: &mut Factory) -> Self {
        let snapshot = Snapshot::clone(&factory.sample_now());
        let machines = factory
            .machines()
            .iter()
            .map(|m| {
                let c = m.counters();
                (
                    m.id().to_string(),
                    MachineSummary {
                        runs_completed: c.runs_completed,
                        runs_aborted: c.runs_aborted,
                        failures: c.failures,
                        interrupts: c.interrupts,
                        success_quantity: c.success_quantity,
                        failed_quantity: c.failed_quantity,
                    },
                )
            })
            .collect();
        Self {
            seed,
            snapshot,
            machines,
        }
    }
}

/// Run `config` once per seed for `days` simulated days.
///
/// Summaries come back in the order of `seeds`. Configuration errors are
/// reported before any replica runs.
pub fn run_replicas(
    config: &FactoryConfig,
    seeds: &[u64],
    days: f64,
) -> Result<Vec<ReplicaSummary>, ConfigError> {
    let factories = seeds
        .iter()
        .map(|&seed| {
            let mut replica = config.clone();
            replica.simulation.seed = seed;
            Factory::from_config(replica).map(|f| (seed, f))
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!("Running {} replicas for {} days", factories.len(), days);
    Ok(factories
        .into_par_iter()
        .map(|(seed, mut factory)| {
            factory.run(days);
            ReplicaSummary::collect(seed, &mut factory)
        })
        .collect())
}
