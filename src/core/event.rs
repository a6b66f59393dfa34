/// Processing phase of an event within one simulated instant.
///
/// Events sharing a timestamp are handled phase by phase in declaration
/// order, so schedule changes are applied before entities react to them and
/// entities settle before the collector observes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Scheduler,
    Entity,
    Collector,
}

/// Anything that can be queued on the simulation timeline
pub trait SimEvent {
    fn phase(&self) -> Phase;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert!(Phase::Scheduler < Phase::Entity);
        assert!(Phase::Entity < Phase::Collector);
    }
}
