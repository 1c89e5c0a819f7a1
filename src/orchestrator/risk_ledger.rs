//! Append-only risk accumulator for one session.
//!
//! The ledger is owned by the session actor, so `accumulate` takes
//! `&mut self`: the event append and the total increment happen in the
//! same call and no reader can see one without the other. Readers take a
//! [`LedgerSnapshot`], which shares the event history copy-on-write.

use std::sync::Arc;

use serde::Serialize;

use crate::models::violation::ViolationEvent;

/// Running risk total and the events that produced it.
#[derive(Debug, Clone, Default)]
pub struct RiskLedger {
    total: u32,
    events: Arc<Vec<ViolationEvent>>,
}

impl RiskLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted events.
    #[must_use]
    pub fn from_events(events: Vec<ViolationEvent>) -> Self {
        let total = events
            .iter()
            .fold(0_u32, |acc, event| acc.saturating_add(event.weight));
        Self {
            total,
            events: Arc::new(events),
        }
    }

    /// Append an event and return the new total.
    pub fn accumulate(&mut self, event: ViolationEvent) -> u32 {
        self.total = self.total.saturating_add(event.weight);
        Arc::make_mut(&mut self.events).push(event);
        self.total
    }

    /// Total the ledger would hold after adding `weight`.
    #[must_use]
    pub fn projected(&self, weight: u32) -> u32 {
        self.total.saturating_add(weight)
    }

    /// Current total.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consistent point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            total: self.total,
            events: Arc::clone(&self.events),
        }
    }
}

/// Immutable view of a ledger at one instant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSnapshot {
    total: u32,
    events: Arc<Vec<ViolationEvent>>,
}

impl LedgerSnapshot {
    /// Total at snapshot time.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Events at snapshot time, oldest first.
    #[must_use]
    pub fn events(&self) -> &[ViolationEvent] {
        &self.events
    }

    /// Number of events at snapshot time.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the snapshot holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
