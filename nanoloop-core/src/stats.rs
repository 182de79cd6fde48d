//! Per-socket fast-path / slow-path counters.

use std::cell::Cell;

/// Operation counters of one socket.
///
/// Foreground operations completed on the caller's stack; background ones
/// completed inside a readiness callback.
#[derive(Debug, Default)]
pub struct SocketStats {
    foreground_sends: Cell<u64>,
    background_sends: Cell<u64>,
    batched_sends: Cell<u64>,
    foreground_recvs: Cell<u64>,
    background_recvs: Cell<u64>,
    send_overflows: Cell<u64>,
}

/// Copy of [`SocketStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub foreground_sends: u64,
    pub background_sends: u64,
    /// Background sends after the first within one callback.
    pub batched_sends: u64,
    pub foreground_recvs: u64,
    pub background_recvs: u64,
    pub send_overflows: u64,
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

impl SocketStats {
    pub(crate) fn foreground_send(&self) {
        bump(&self.foreground_sends);
    }

    pub(crate) fn background_send(&self, batched: bool) {
        bump(&self.background_sends);
        if batched {
            bump(&self.batched_sends);
        }
    }

    pub(crate) fn foreground_recv(&self) {
        bump(&self.foreground_recvs);
    }

    pub(crate) fn background_recv(&self) {
        bump(&self.background_recvs);
    }

    pub(crate) fn send_overflow(&self) {
        bump(&self.send_overflows);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            foreground_sends: self.foreground_sends.get(),
            background_sends: self.background_sends.get(),
            batched_sends: self.batched_sends.get(),
            foreground_recvs: self.foreground_recvs.get(),
            background_recvs: self.background_recvs.get(),
            send_overflows: self.send_overflows.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batched_sends_count_separately() {
        let stats = SocketStats::default();
        stats.background_send(false);
        stats.background_send(true);
        stats.foreground_send();

        let snap = stats.snapshot();
        assert_eq!(snap.background_sends, 2);
        assert_eq!(snap.batched_sends, 1);
        assert_eq!(snap.foreground_sends, 1);
    }
}
