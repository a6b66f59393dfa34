use super::event::{Phase, SimEvent};
use super::event_scheduler::EventScheduler;
use super::types::SimTime;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observer trait for simulation events
pub trait SimulationObserver: Send {
    /// Called when the simulated clock advances
    fn on_time_advance(&mut self, old_time: SimTime, new_time: SimTime);

    /// Called when a batch of same-instant events has been processed
    fn on_step_complete(&mut self, time: SimTime, events_processed: usize);
}

/// Receives event batches from the engine and reacts with new events.
///
/// Returned events carry a delay relative to the batch time.
pub trait EventHandler {
    type Event: SimEvent;

    fn react(
        &mut self,
        now: SimTime,
        phase: Phase,
        events: Vec<Self::Event>,
    ) -> Vec<(Self::Event, SimTime)>;
}

/// Cloneable external cancellation flag
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the engine to stop before its next step
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct SimulationEngine<E: SimEvent> {
    scheduler: EventScheduler<E>,
    current_time: SimTime,
    horizon: Option<SimTime>,
    stop: StopHandle,
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl<E: SimEvent> SimulationEngine<E> {
    /// Create a new SimulationEngine with an optional time horizon
    pub fn new(horizon: Option<SimTime>) -> Self {
        Self {
            scheduler: EventScheduler::new(),
            current_time: 0,
            horizon,
            stop: StopHandle::new(),
            observers: Vec::new(),
        }
    }

    /// Add an observer to the simulation
    pub fn add_observer(&mut self, observer: Box<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Notify all observers of a clock advance
    fn notify_time_advance(&mut self, old_time: SimTime, new_time: SimTime) {
        for observer in &mut self.observers {
            observer.on_time_advance(old_time, new_time);
        }
    }

    /// Notify all observers of step completion
    fn notify_step_complete(&mut self, time: SimTime, events_processed: usize) {
        for observer in &mut self.observers {
            observer.on_step_complete(time, events_processed);
        }
    }

    /// Schedule an event at an absolute time, never earlier than the current time
    pub fn schedule_initial_event(&mut self, event: E, at: SimTime) {
        self.scheduler.schedule_at(event, at.max(self.current_time));
    }

    pub fn set_horizon(&mut self, horizon: Option<SimTime>) {
        self.horizon = horizon;
    }

    pub fn horizon(&self) -> Option<SimTime> {
        self.horizon
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run until the horizon, an empty queue, or a stop request; returns the final time
    pub fn run<H>(&mut self, handler: &mut H) -> SimTime
    where
        H: EventHandler<Event = E>,
    {
        while self.step(handler) {}
        self.current_time
    }

    /// Process one `(time, phase)` batch, returns true if more work remains
    pub fn step<H>(&mut self, handler: &mut H) -> bool
    where
        H: EventHandler<Event = E>,
    {
        if self.stop.is_stopped() {
            return false;
        }

        let (next_time, _) = match self.scheduler.peek_next() {
            Some(key) => key,
            None => return false,
        };

        if let Some(horizon) = self.horizon {
            if next_time > horizon {
                // Anything still queued past the horizon is abandoned work
                self.advance_to(horizon);
                return false;
            }
        }

        let (time, phase, events) = match self.scheduler.pop_next_batch() {
            Some(batch) => batch,
            None => return false,
        };
        self.advance_to(time);

        debug!("=== t={} {:?} ({} events) ===", time, phase, events.len());

        let events_count = events.len();
        for (event, delay) in handler.react(time, phase, events) {
            self.scheduler.schedule_at(event, time.saturating_add(delay));
        }

        self.notify_step_complete(time, events_count);

        self.has_pending_events()
    }

    fn advance_to(&mut self, time: SimTime) {
        if time > self.current_time {
            let old_time = self.current_time;
            self.current_time = time;
            self.notify_time_advance(old_time, time);
        }
    }

    /// Get current simulation time
    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Time of the earliest queued event
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.scheduler.peek_next().map(|(time, _)| time)
    }

    /// Check if there are pending events in the scheduler
    pub fn has_pending_events(&self) -> bool {
        self.scheduler.has_events()
    }

    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Tick {
        Wake(u32),
        Observe,
    }

    impl SimEvent for Tick {
        fn phase(&self) -> Phase {
            match self {
                Tick::Wake(_) => Phase::Entity,
                Tick::Observe => Phase::Collector,
            }
        }
    }

    /// Re-arms itself every 10 seconds and records what it saw
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(SimTime, Phase, usize)>,
    }

    impl EventHandler for Recorder {
        type Event = Tick;

        fn react(&mut self, now: SimTime, phase: Phase, events: Vec<Tick>) -> Vec<(Tick, SimTime)> {
            self.seen.push((now, phase, events.len()));
            events
                .into_iter()
                .filter_map(|event| match event {
                    Tick::Wake(n) => Some((Tick::Wake(n + 1), 10)),
                    Tick::Observe => None,
                })
                .collect()
        }
    }

    struct CountingObserver(Arc<Mutex<Vec<SimTime>>>);

    impl SimulationObserver for CountingObserver {
        fn on_time_advance(&mut self, _old_time: SimTime, new_time: SimTime) {
            self.0.lock().unwrap().push(new_time);
        }

        fn on_step_complete(&mut self, _time: SimTime, _events_processed: usize) {}
    }

    #[test]
    fn test_run_stops_at_horizon() {
        let mut engine = SimulationEngine::new(Some(35));
        engine.schedule_initial_event(Tick::Wake(0), 0);
        let mut recorder = Recorder::default();

        let final_time = engine.run(&mut recorder);

        assert_eq!(final_time, 35);
        let times: Vec<SimTime> = recorder.seen.iter().map(|s| s.0).collect();
        assert_eq!(times, vec![0, 10, 20, 30]);
        // The wake at t=40 stays queued and is abandoned
        assert!(engine.has_pending_events());
    }

    #[test]
    fn test_entity_phase_before_collector() {
        let mut engine = SimulationEngine::new(None);
        engine.schedule_initial_event(Tick::Observe, 0);
        engine.schedule_initial_event(Tick::Wake(0), 0);
        let mut recorder = Recorder::default();

        assert!(engine.step(&mut recorder));
        assert!(engine.step(&mut recorder));

        assert_eq!(recorder.seen[0].1, Phase::Entity);
        assert_eq!(recorder.seen[1].1, Phase::Collector);
    }

    #[test]
    fn test_stop_handle_halts_run() {
        let mut engine = SimulationEngine::new(None);
        engine.schedule_initial_event(Tick::Wake(0), 0);
        let stop = engine.stop_handle();
        let mut recorder = Recorder::default();

        assert!(engine.step(&mut recorder));
        stop.stop();
        assert!(!engine.step(&mut recorder));
        assert_eq!(recorder.seen.len(), 1);
    }

    #[test]
    fn test_observers_see_time_advances() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut engine = SimulationEngine::new(Some(20));
        engine.add_observer(Box::new(CountingObserver(log.clone())));
        engine.schedule_initial_event(Tick::Wake(0), 0);

        engine.run(&mut Recorder::default());

        assert_eq!(*log.lock().unwrap(), vec![10, 20]);
    }
}
