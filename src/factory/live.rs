use super::Factory;
use crate::collector::SnapshotHub;
use crate::core::errors::FactoryError;
use crate::core::simulation_engine::StopHandle;
use crate::core::types::days_to_secs;
use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PACE_SLICE: Duration = Duration::from_millis(20);

/// Wall-clock behaviour of a live run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunPacing {
    /// Simulated seconds per wall-clock second; `None` runs flat out
    pub speed: Option<f64>,
    /// Wall-clock period of the sampler thread
    pub sample_every: Duration,
}

impl Default for RunPacing {
    fn default() -> Self {
        Self {
            speed: None,
            sample_every: Duration::from_millis(500),
        }
    }
}

impl RunPacing {
    pub fn real_time() -> Self {
        Self {
            speed: Some(1.0),
            ..Self::default()
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed).filter(|s| *s > 0.0);
        self
    }

    pub fn with_sample_every(mut self, period: Duration) -> Self {
        self.sample_every = period;
        self
    }
}

fn lock(factory: &Mutex<Factory>) -> Option<MutexGuard<'_, Factory>> {
    match factory.lock() {
        Ok(guard) => Some(guard),
        Err(_) => {
            error!("Factory lock poisoned, live run terminated");
            None
        }
    }
}

/// Sleep for `duration` unless a stop is requested first
fn pace(duration: Duration, stop: &StopHandle) {
    let deadline = Instant::now() + duration;
    while !stop.is_stopped() {
        let Some(left) = deadline.checked_duration_since(Instant::now()) else {
            return;
        };
        thread::sleep(left.min(PACE_SLICE));
    }
}

/// Factory advancing on a worker thread while a sampler publishes snapshots.
///
/// The engine thread holds the lock for a whole instant, so a sample only ever
/// observes a settled floor.
pub struct LiveRun {
    factory: Arc<Mutex<Factory>>,
    stop: StopHandle,
    hub: SnapshotHub,
    finished: Arc<AtomicBool>,
    engine: Option<JoinHandle<()>>,
    sampler: Option<JoinHandle<()>>,
}

impl Factory {
    /// Run for `days` simulated days on background threads
    pub fn spawn(mut self, days: f64, pacing: RunPacing) -> LiveRun {
        let horizon = self.now().saturating_add(days_to_secs(days));
        self.set_horizon(horizon);
        let stop = self.stop_handle();
        let hub = self.snapshot_hub();
        let factory = Arc::new(Mutex::new(self));
        let finished = Arc::new(AtomicBool::new(false));

        let engine = {
            let factory = Arc::clone(&factory);
            let finished = Arc::clone(&finished);
            let stop = stop.clone();
            thread::spawn(move || {
                info!("Live run started, horizon t={}", horizon);
                loop {
                    let started = Instant::now();
                    let (more, advanced) = {
                        let Some(mut f) = lock(&factory) else {
                            break;
                        };
                        let before = f.now();
                        let more = f.step_instant();
                        (more, f.now() - before)
                    };
                    if !more {
                        break;
                    }
                    if let Some(speed) = pacing.speed {
                        let target = Duration::from_secs_f64(advanced as f64 / speed);
                        pace(target.saturating_sub(started.elapsed()), &stop);
                    }
                }
                finished.store(true, Ordering::SeqCst);
                info!("Live run finished");
            })
        };

        let sampler = {
            let factory = Arc::clone(&factory);
            let finished = Arc::clone(&finished);
            let stop = stop.clone();
            thread::spawn(move || {
                while !finished.load(Ordering::SeqCst) && !stop.is_stopped() {
                    pace(pacing.sample_every, &stop);
                    let Some(mut f) = lock(&factory) else {
                        return;
                    };
                    f.sample_now();
                }
                // Final state is always published
                if let Some(mut f) = lock(&factory) {
                    f.sample_now();
                }
            })
        };

        LiveRun {
            factory,
            stop,
            hub,
            finished,
            engine: Some(engine),
            sampler: Some(sampler),
        }
    }
}

impl LiveRun {
    pub fn snapshot_hub(&self) -> &SnapshotHub {
        &self.hub
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Read the factory between two steps
    pub fn inspect<R>(&self, f: impl FnOnce(&Factory) -> R) -> Option<R> {
        lock(&self.factory).map(|factory| f(&*factory))
    }

    /// Wait for both threads and take the factory back
    pub fn join(mut self) -> Result<Factory, FactoryError> {
        for handle in [self.engine.take(), self.sampler.take()].into_iter().flatten() {
            handle.join().map_err(|_| FactoryError::RunnerPanicked)?;
        }
        let factory = Arc::try_unwrap(self.factory).map_err(|_| FactoryError::RunnerPanicked)?;
        factory.into_inner().map_err(|_| FactoryError::RunnerPanicked)
    }
}
