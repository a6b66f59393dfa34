use super::resource::{Batch, ContentKind, DrawnPortion};
use crate::core::types::SimTime;
use log::{debug, warn};
use std::collections::VecDeque;

/// Quantities below this are treated as empty
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStats {
    pub received: f64,
    pub drawn: f64,
    /// Overflow that did not fit and was discarded
    pub dropped: f64,
    pub batches_received: u64,
    pub success_quantity: f64,
    pub failed_quantity: f64,
    pub procurement_failures: u64,
}

/// Bounded FIFO store of batches of a single content.
///
/// Every mutation keeps `0 <= level <= capacity`.
#[derive(Debug, Clone)]
pub struct ResourceContainer {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) content: String,
    pub(crate) kind: ContentKind,
    pub(crate) capacity: f64,
    /// Units per hour for gradual fills, zero fills instantly
    pub(crate) fill_rate: f64,
    batches: VecDeque<Batch>,
    last_batch: Option<Batch>,
    stats: ContainerStats,
}

impl ResourceContainer {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        kind: ContentKind,
        capacity: f64,
        fill_rate: f64,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            content: content.into(),
            kind,
            capacity: capacity.max(0.0),
            fill_rate: fill_rate.max(0.0),
            batches: VecDeque::new(),
            last_batch: None,
            stats: ContainerStats::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn fill_rate(&self) -> f64 {
        self.fill_rate
    }

    pub fn level(&self) -> f64 {
        self.batches.iter().map(|b| b.quantity).sum()
    }

    pub fn free(&self) -> f64 {
        (self.capacity - self.level()).max(0.0)
    }

    pub fn effective_level(&self) -> f64 {
        self.batches.iter().map(Batch::effective_quantity).sum()
    }

    pub fn n_batches(&self) -> usize {
        self.batches.len()
    }

    /// Batches currently stored, oldest first
    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }

    /// Most recently received batch, as it arrived
    pub fn last_batch(&self) -> Option<&Batch> {
        self.last_batch.as_ref()
    }

    /// Quantity-weighted quality of the current contents
    pub fn average_quality(&self) -> Option<f64> {
        let level = self.level();
        if level <= EPSILON {
            return None;
        }
        let weighted: f64 = self.batches.iter().map(|b| b.quantity * b.quality).sum();
        Some(weighted / level)
    }

    pub fn stats(&self) -> &ContainerStats {
        &self.stats
    }

    pub fn can_supply(&self, effective: f64) -> bool {
        self.effective_level() + EPSILON >= effective
    }

    /// Store a whole batch, clipping it to the free space; returns the accepted quantity
    pub fn put_batch(&mut self, mut batch: Batch) -> f64 {
        let accepted = self.clip(batch.quantity, &batch.batch_id);
        self.record_arrival(&batch);
        if accepted <= EPSILON {
            return 0.0;
        }
        match batch.passed {
            Some(true) => self.stats.success_quantity += accepted,
            Some(false) => self.stats.failed_quantity += accepted,
            None => {}
        }
        batch.quantity = accepted;
        self.stats.received += accepted;
        self.batches.push_back(batch);
        accepted
    }

    /// Register a batch that will arrive gradually through [`grow_batch`](Self::grow_batch)
    pub fn begin_fill(&mut self, template: &Batch) {
        let mut arrival = template.clone();
        arrival.quantity = 0.0;
        self.record_arrival(&arrival);
    }

    /// Add `amount` to a gradually arriving batch; returns the accepted quantity
    pub fn grow_batch(&mut self, template: &Batch, amount: f64) -> f64 {
        let accepted = self.clip(amount, &template.batch_id);
        if accepted <= EPSILON {
            return 0.0;
        }
        self.stats.received += accepted;
        if let Some(last) = self.last_batch.as_mut() {
            if last.batch_id == template.batch_id {
                last.quantity += accepted;
            }
        }
        // Overlapping fills interleave, so the arriving batch is not always at the back
        match self
            .batches
            .iter_mut()
            .rev()
            .find(|b| b.batch_id == template.batch_id)
        {
            Some(arriving) => arriving.quantity += accepted,
            None => {
                // The batch was fully consumed while still arriving, or is new
                let mut batch = template.clone();
                batch.quantity = accepted;
                self.batches.push_back(batch);
            }
        }
        accepted
    }

    /// Take `effective` units out, oldest batch first.
    ///
    /// Returns the portions taken; takes everything available when short.
    pub fn drain_effective(&mut self, effective: f64) -> Vec<DrawnPortion> {
        let mut remaining = effective.max(0.0);
        let mut portions = Vec::new();

        while remaining > EPSILON {
            let Some(front) = self.batches.front_mut() else {
                break;
            };
            let available = front.effective_quantity();
            let take_effective = remaining.min(available);
            let take_raw = (take_effective * front.consumption_factor).min(front.quantity);

            front.quantity -= take_raw;
            remaining -= take_effective;
            self.stats.drawn += take_raw;
            portions.push(DrawnPortion {
                batch_id: front.batch_id.clone(),
                quantity: take_raw,
                effective: take_effective,
                quality: front.quality,
            });

            if front.quantity <= EPSILON {
                self.batches.pop_front();
            }
        }

        portions
    }

    pub fn record_procurement_failure(&mut self) {
        self.stats.procurement_failures += 1;
    }

    fn clip(&mut self, quantity: f64, batch_id: &str) -> f64 {
        let quantity = quantity.max(0.0);
        let accepted = quantity.min(self.free());
        if quantity - accepted > EPSILON {
            self.stats.dropped += quantity - accepted;
            warn!(
                "[Container {}] Dropped {:.3} of batch {} (capacity {:.3} reached)",
                self.id,
                quantity - accepted,
                batch_id,
                self.capacity
            );
        }
        accepted
    }

    fn record_arrival(&mut self, batch: &Batch) {
        self.stats.batches_received += 1;
        self.last_batch = Some(batch.clone());
        debug!(
            "[Container {}] Batch {} quality {:.3} factor {:.3}",
            self.id, batch.batch_id, batch.quality, batch.consumption_factor
        );
    }

    pub(crate) fn arrival_time(&self) -> Option<SimTime> {
        self.last_batch.as_ref().map(|b| b.created_at)
    }
}
