//! Channel Statistics
//!
//! Per-channel traffic counters. Counters only grow, except through
//! [`ChannelStatistics::reset`], which zeros them without touching the
//! channel's connection state.
//!
//! Uses atomic counters so readers never block the receive loop or senders.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct ChannelStatistics {
    /// Bytes consumed by decoded packets
    bytes_received: AtomicU64,
    /// Bytes written for successfully sent packets
    bytes_sent: AtomicU64,
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
}

impl ChannelStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decoded packet that consumed `byte_count` bytes
    pub fn packet_received(&self, byte_count: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a packet of `byte_count` encoded bytes written to the transport
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.bytes_received.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.packets_received.store(0, Ordering::Relaxed);
        self.packets_sent.store(0, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
        }
    }

    /// Log current statistics as one structured event
    pub fn log_statistics(&self) {
        let snapshot = self.snapshot();
        info!(
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            packets_received = snapshot.packets_received,
            packets_sent = snapshot.packets_sent,
            "Channel statistics snapshot"
        );
    }
}

/// Snapshot of statistics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = ChannelStatistics::new();
        stats.packet_received(5);
        stats.packet_received(7);
        stats.packet_sent(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.bytes_received, 12);
        assert_eq!(snapshot.packets_received, 2);
        assert_eq!(snapshot.bytes_sent, 3);
        assert_eq!(snapshot.packets_sent, 1);
    }

    #[test]
    fn reset_zeros_everything() {
        let stats = ChannelStatistics::new();
        stats.packet_received(5);
        stats.packet_sent(9);
        stats.reset();
        assert_eq!(stats.snapshot(), StatisticsSnapshot::default());

        stats.packet_sent(1);
        assert_eq!(stats.bytes_sent(), 1);
    }
}
