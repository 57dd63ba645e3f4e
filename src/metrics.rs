//! Receive-side counters.
//!
//! One [`Stats`] lives inside each receiver; there is no process-wide state.
use crate::transfer::RejectReason;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Non-empty frames produced by the SLIP decoder.
    pub frames_decoded: u64,
    /// Frames with an unknown type byte.
    pub frames_ignored: u64,
    pub meta_accepted: u64,
    pub data_accepted: u64,
    pub transfers_completed: u64,
    /// Payload bytes of completed transfers.
    pub payload_bytes: u64,
    /// Rejected frames keyed by [`RejectReason::label`].
    pub rejects: BTreeMap<&'static str, u64>,
}

impl Stats {
    pub fn record_reject(&mut self, reason: &RejectReason) {
        let slot = self.rejects.entry(reason.label()).or_default();
        *slot = slot.saturating_add(1);
    }

    pub fn rejects_for(&self, label: &str) -> u64 {
        self.rejects.get(label).copied().unwrap_or(0)
    }

    pub fn total_rejects(&self) -> u64 {
        self.rejects.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_are_counted_per_reason() {
        let mut stats = Stats::default();
        stats.record_reject(&RejectReason::NoActiveSession);
        stats.record_reject(&RejectReason::NoActiveSession);
        stats.record_reject(&RejectReason::OutOfOrder {
            expected: 0,
            got: 1,
        });
        assert_eq!(stats.rejects_for("no_active_session"), 2);
        assert_eq!(stats.rejects_for("out_of_order"), 1);
        assert_eq!(stats.rejects_for("storage"), 0);
        assert_eq!(stats.total_rejects(), 3);
    }
}
