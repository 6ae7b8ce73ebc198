//! Accept/drop accounting for header-check stages
//!
//! Counters are per-stage-instance 64-bit atomics so an introspection handler
//! on a control thread can read them while the forwarding thread counts.
//! Per-counter atomicity is all that is promised; the set is not snapshot
//! consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Why a validator refused a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DropReason {
    NotProtocol = 0,
    BadLength = 1,
    BadChecksum = 2,
}

impl DropReason {
    pub const COUNT: usize = 3;

    pub const ALL: [DropReason; DropReason::COUNT] =
        [DropReason::NotProtocol, DropReason::BadLength, DropReason::BadChecksum];
}

/// Accepted/dropped tallies for one stage instance.
///
/// The per-reason breakdown is only allocated when the stage was configured
/// with `details`; the reason texts come from the stage, since "not TCP" and
/// "not UDP" differ.
pub struct StageCounters {
    count: AtomicU64,
    drops: AtomicU64,
    details: Option<[AtomicU64; DropReason::COUNT]>,
    reason_texts: [&'static str; DropReason::COUNT],
}

impl StageCounters {
    pub fn new(reason_texts: [&'static str; DropReason::COUNT], details: bool) -> Self {
        StageCounters {
            count: AtomicU64::new(0),
            drops: AtomicU64::new(0),
            details: details.then(|| [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)]),
            reason_texts,
        }
    }

    #[inline]
    pub fn record_accept(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one drop; returns the previous total so the caller can log only
    /// the first one.
    #[inline]
    pub fn record_drop(&self, reason: DropReason) -> u64 {
        if let Some(details) = &self.details {
            details[reason as usize].fetch_add(1, Ordering::Relaxed);
        }
        self.drops.fetch_add(1, Ordering::Relaxed)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn drops(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    pub fn reason_drops(&self, reason: DropReason) -> Option<u64> {
        self.details.as_ref().map(|d| d[reason as usize].load(Ordering::Relaxed))
    }

    pub fn reason_text(&self, reason: DropReason) -> &'static str {
        self.reason_texts[reason as usize]
    }

    /// One line per reason, `None` unless the breakdown was enabled.
    pub fn drop_details(&self) -> Option<String> {
        self.details.as_ref().map(|details| {
            let mut out = String::new();
            for reason in DropReason::ALL {
                out.push_str(&format!(
                    "{:>15} packets due to: {:<24}\n",
                    details[reason as usize].load(Ordering::Relaxed),
                    self.reason_texts[reason as usize],
                ));
            }
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXTS: [&str; 3] = ["not TCP", "bad packet length", "bad TCP checksum"];

    #[test]
    fn test_accept_and_drop_tallies() {
        let counters = StageCounters::new(TEXTS, true);
        counters.record_accept();
        counters.record_accept();
        assert_eq!(counters.record_drop(DropReason::BadLength), 0);
        assert_eq!(counters.record_drop(DropReason::BadLength), 1);
        assert_eq!(counters.record_drop(DropReason::BadChecksum), 2);

        assert_eq!(counters.count(), 2);
        assert_eq!(counters.drops(), 3);
        assert_eq!(counters.reason_drops(DropReason::NotProtocol), Some(0));
        assert_eq!(counters.reason_drops(DropReason::BadLength), Some(2));
        assert_eq!(counters.reason_drops(DropReason::BadChecksum), Some(1));
    }

    #[test]
    fn test_details_disabled() {
        let counters = StageCounters::new(TEXTS, false);
        counters.record_drop(DropReason::NotProtocol);
        assert_eq!(counters.drops(), 1);
        assert_eq!(counters.reason_drops(DropReason::NotProtocol), None);
        assert_eq!(counters.drop_details(), None);
    }

    #[test]
    fn test_drop_details_format() {
        let counters = StageCounters::new(TEXTS, true);
        counters.record_drop(DropReason::BadLength);
        let details = counters.drop_details().unwrap();
        let lines: Vec<&str> = details.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], format!("{:>15} packets due to: {:<24}", 0, "not TCP"));
        assert_eq!(lines[1], format!("{:>15} packets due to: {:<24}", 1, "bad packet length"));
    }
}
