//! In-memory, append-only tick log for one world.

use sim_core::{ChainError, HashChain, SimEvent, TickIndex, TickRecord, verify_record_links};

use crate::error::Result;
use crate::replay::verify_event_log;

/// Ordered tick records plus the event batches they commit to.
///
/// Appends are rejected unless the record links to the current tail, so the
/// log is a valid chain segment at all times.
#[derive(Clone, Debug)]
pub struct TickLog {
    start: HashChain,
    tail: HashChain,
    records: Vec<TickRecord>,
    batches: Vec<Vec<SimEvent>>,
}

impl TickLog {
    /// Empty log continuing from `start` (the genesis chain for a new world).
    pub fn new(start: HashChain) -> Self {
        Self {
            tail: start.clone(),
            start,
            records: Vec::new(),
            batches: Vec::new(),
        }
    }

    /// Appends one tick. Fails without modifying the log if the record does
    /// not extend the current tail.
    pub fn append(
        &mut self,
        record: TickRecord,
        events: Vec<SimEvent>,
    ) -> std::result::Result<(), ChainError> {
        let tail = verify_record_links(&self.tail, std::slice::from_ref(&record))?;
        self.tail = tail;
        self.records.push(record);
        self.batches.push(events);
        Ok(())
    }

    pub fn start(&self) -> &HashChain {
        &self.start
    }

    /// Current chain head and length.
    pub fn tail(&self) -> &HashChain {
        &self.tail
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    /// Events applied in `tick_index`, if that tick is in this log.
    pub fn events_at(&self, tick_index: TickIndex) -> Option<&[SimEvent]> {
        let offset = tick_index.checked_sub(self.start.length)?;
        let offset = usize::try_from(offset).ok()?;
        self.batches.get(offset).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Re-checks linkage and recomputes every batch hash from the stored
    /// events.
    pub fn verify(&self) -> Result<HashChain> {
        verify_event_log(&self.start, &self.records, &self.batches)
    }
}
