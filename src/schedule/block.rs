use super::action::Action;
use crate::core::cron::CronExpr;
use crate::core::types::{MachineId, SimTime};
use std::cmp::Ordering;

/// Cron-timed window applying an action
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub cron: CronExpr,
    pub duration_secs: SimTime,
    /// Higher wins
    pub priority: i64,
    pub action: Action,
    /// Declaration index within the schedule
    pub order: usize,
}

impl Block {
    /// Ranking of blocks starting in the same instant: priority, then the more
    /// specific cron, then the earlier declaration.
    pub fn cmp_same_instant(&self, other: &Block) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.cron.specificity().cmp(&other.cron.specificity()))
            .then_with(|| other.order.cmp(&self.order))
    }

    /// Whether this block, starting now, takes over from an earlier effective block.
    ///
    /// On equal priority the newer activation wins.
    pub fn preempts(&self, effective: &Block) -> bool {
        self.priority >= effective.priority
    }
}

/// Occurrence of a block that currently holds the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveBlock {
    pub block: usize,
    pub activation: u64,
    pub started_at: SimTime,
    pub ends_at: SimTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    pub activations: u64,
    pub preemptions: u64,
    /// Occurrences that lost to a higher-ranked block
    pub skipped: u64,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub(crate) id: String,
    pub(crate) kind: String,
    pub(crate) blocks: Vec<Block>,
    pub(crate) machine: Option<MachineId>,
    pub(crate) effective: Option<ActiveBlock>,
    pub(crate) stats: ScheduleStats,
}

impl Schedule {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            blocks,
            machine: None,
            effective: None,
            stats: ScheduleStats::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn machine(&self) -> Option<MachineId> {
        self.machine
    }

    /// Block currently in effect
    pub fn active_block(&self) -> Option<&Block> {
        self.effective.and_then(|a| self.blocks.get(a.block))
    }

    pub fn effective(&self) -> Option<ActiveBlock> {
        self.effective
    }

    pub fn stats(&self) -> &ScheduleStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(cron: &str, priority: i64, order: usize) -> Block {
        Block {
            label: format!("b{}", order),
            cron: CronExpr::parse(cron).unwrap(),
            duration_secs: 3_600,
            priority,
            action: Action::Maintenance,
            order,
        }
    }

    #[test]
    fn test_priority_dominates() {
        let low = block("0 7 * * 1-5", -1, 0);
        let high = block("* * * * *", 1, 1);
        assert_eq!(high.cmp_same_instant(&low), Ordering::Greater);
        assert!(high.preempts(&low));
        assert!(!low.preempts(&high));
    }

    #[test]
    fn test_specificity_then_declaration() {
        let broad = block("0 7 * * *", 0, 0);
        let narrow = block("0 7 * * 1", 0, 1);
        assert_eq!(narrow.cmp_same_instant(&broad), Ordering::Greater);

        let first = block("0 7 * * *", 0, 0);
        let second = block("0 7 * * *", 0, 1);
        assert_eq!(first.cmp_same_instant(&second), Ordering::Greater);
    }

    #[test]
    fn test_newer_equal_priority_takes_over() {
        let running = block("0 7 * * *", 2, 0);
        let arriving = block("0 9 * * *", 2, 1);
        assert!(arriving.preempts(&running));
    }
}
