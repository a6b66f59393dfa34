use super::event::{Phase, SimEvent};
use super::types::SimTime;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
pub struct ScheduledEvent<E> {
    pub time: SimTime,
    pub phase: Phase,
    pub sequence_num: u64,
    pub event: E,
}

impl<E> PartialEq for ScheduledEvent<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.phase == other.phase && self.sequence_num == other.sequence_num
    }
}

impl<E> Eq for ScheduledEvent<E> {}

impl<E> PartialOrd for ScheduledEvent<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for ScheduledEvent<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.phase.cmp(&self.phase))
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

/// Wake queue keyed by `(time, phase, insertion order)`
pub struct EventScheduler<E> {
    event_queue: BinaryHeap<ScheduledEvent<E>>,
    sequence_counter: u64,
}

impl<E: SimEvent> EventScheduler<E> {
    /// Create a new EventScheduler
    pub fn new() -> Self {
        Self {
            event_queue: BinaryHeap::new(),
            sequence_counter: 0,
        }
    }

    /// Schedule an event at an absolute simulated time
    pub fn schedule_at(&mut self, event: E, time: SimTime) {
        let scheduled_event = ScheduledEvent {
            time,
            phase: event.phase(),
            sequence_num: self.sequence_counter,
            event,
        };

        self.event_queue.push(scheduled_event);
        self.sequence_counter += 1;
    }

    /// Pop every event sharing the earliest `(time, phase)` key, in insertion order
    pub fn pop_next_batch(&mut self) -> Option<(SimTime, Phase, Vec<E>)> {
        let (time, phase) = self.peek_next()?;
        let mut events = Vec::new();

        while let Some(scheduled_event) = self.event_queue.peek() {
            if scheduled_event.time != time || scheduled_event.phase != phase {
                break;
            }
            match self.event_queue.pop() {
                Some(scheduled_event) => events.push(scheduled_event.event),
                None => break,
            }
        }

        Some((time, phase, events))
    }

    /// Check if there are any events remaining in the queue
    pub fn has_events(&self) -> bool {
        !self.event_queue.is_empty()
    }

    /// Key of the next batch without removing events
    pub fn peek_next(&self) -> Option<(SimTime, Phase)> {
        self.event_queue.peek().map(|event| (event.time, event.phase))
    }

    pub fn len(&self) -> usize {
        self.event_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_queue.is_empty()
    }
}

impl<E: SimEvent> Default for EventScheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}
