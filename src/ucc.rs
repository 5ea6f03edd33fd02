//! UC Channel (§4.7).
//!
//! Two fixed-capacity, overwrite-oldest ring buffers coexist with the
//! real-time frames inside the `[t6, t7]` window. Sized with `heapless` the
//! way the pack favors const-generic fixed-capacity collections over heap
//! churn on a cyclic hot path.

use heapless::Deque;
use smallvec::SmallVec;

use crate::descriptor::Port;
use crate::limits::{MAC_OVERHEAD_BYTES, UCC_PACKET_MAX_LEN, UCC_RX_RING_CAPACITY, UCC_TX_RING_CAPACITY};

/// One UC (standard Ethernet) packet queued for transmit or just received.
#[derive(Debug, Clone)]
pub struct UcPacket {
    pub port: Port,
    pub bytes: SmallVec<[u8; 128]>,
}

impl UcPacket {
    pub fn new(port: Port, bytes: &[u8]) -> Self {
        Self {
            port,
            bytes: SmallVec::from_slice(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Per-cycle accounting the UC Channel exposes for the `IPDISCOLB`/
/// `IPDISRXB` controller counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardCounters {
    /// TX packets dropped because the ring was full (`IPDISCOLB`).
    pub tx_discarded: u32,
    /// RX packets dropped because the ring was full (`IPDISRXB`).
    pub rx_discarded: u32,
}

/// The UC channel's two rings plus discard counters (§4.7).
pub struct UcChannel {
    tx: Deque<UcPacket, UCC_TX_RING_CAPACITY>,
    rx: Deque<UcPacket, UCC_RX_RING_CAPACITY>,
    discards: DiscardCounters,
}

impl Default for UcChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl UcChannel {
    pub fn new() -> Self {
        Self {
            tx: Deque::new(),
            rx: Deque::new(),
            discards: DiscardCounters::default(),
        }
    }

    /// Queues a packet for transmit, overwriting the oldest queued packet
    /// if the ring is already at capacity.
    pub fn enqueue_tx(&mut self, packet: UcPacket) {
        if self.tx.is_full() {
            self.tx.pop_front();
            self.discards.tx_discarded += 1;
        }
        let _ = self.tx.push_back(packet);
    }

    /// Buffers a packet the driver captured off the wire (non-Sercos
    /// EtherType), overwriting the oldest if the ring is full.
    pub fn enqueue_rx(&mut self, packet: UcPacket) {
        if self.rx.is_full() {
            self.rx.pop_front();
            self.discards.rx_discarded += 1;
        }
        let _ = self.rx.push_back(packet);
    }

    /// Pops the next packet the host should read, if any.
    pub fn poll_rx(&mut self) -> Option<UcPacket> {
        self.rx.pop_front()
    }

    pub fn discard_counters(&self) -> DiscardCounters {
        self.discards
    }

    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    /// Drains as many queued TX packets as fit in `window_ns`, never one
    /// that would straddle the window's end (§4.7). `byte_time_ns` is the
    /// PHY's per-byte transmit time; each packet also costs
    /// `MAC_OVERHEAD_BYTES` of preamble/IFG.
    pub fn drain_for_window(&mut self, window_ns: u32, byte_time_ns: u32) -> Vec<UcPacket> {
        let mut sent = Vec::new();
        let mut remaining_ns = window_ns;

        loop {
            let Some(next) = self.tx.front() else { break };
            let packet_bytes = next.len() as u32 + MAC_OVERHEAD_BYTES;
            let packet_ns = packet_bytes.saturating_mul(byte_time_ns);
            if packet_ns > remaining_ns {
                break;
            }
            remaining_ns -= packet_ns;
            let Some(packet) = self.tx.pop_front() else { break };
            sent.push(packet);
        }

        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_overflow_overwrites_oldest_and_counts_discard() {
        let mut ucc = UcChannel::new();
        for i in 0..UCC_TX_RING_CAPACITY {
            ucc.enqueue_tx(UcPacket::new(Port::Port1, &[i as u8]));
        }
        ucc.enqueue_tx(UcPacket::new(Port::Port1, &[0xFF]));
        assert_eq!(ucc.discard_counters().tx_discarded, 1);
        assert_eq!(ucc.tx_len(), UCC_TX_RING_CAPACITY);
    }

    #[test]
    fn drain_never_straddles_window() {
        let mut ucc = UcChannel::new();
        ucc.enqueue_tx(UcPacket::new(Port::Port1, &[0u8; 100]));
        ucc.enqueue_tx(UcPacket::new(Port::Port1, &[0u8; 100]));
        // One packet costs (100 + MAC_OVERHEAD_BYTES) * byte_time, so a
        // window sized for exactly one packet must not release the second.
        let one_packet_ns = (100 + MAC_OVERHEAD_BYTES) * crate::limits::BYTE_TIME_NS;
        let sent = ucc.drain_for_window(one_packet_ns, crate::limits::BYTE_TIME_NS);
        assert_eq!(sent.len(), 1);
        assert_eq!(ucc.tx_len(), 1);
    }

    #[test]
    fn rx_overflow_counts_discard() {
        let mut ucc = UcChannel::new();
        for i in 0..UCC_RX_RING_CAPACITY + 1 {
            ucc.enqueue_rx(UcPacket::new(Port::Port2, &[i as u8]));
        }
        assert_eq!(ucc.discard_counters().rx_discarded, 1);
        assert!(ucc.poll_rx().is_some());
    }

    #[test]
    fn packet_byte_cap_respected() {
        let bytes = vec![0u8; UCC_PACKET_MAX_LEN];
        let packet = UcPacket::new(Port::Port1, &bytes);
        assert_eq!(packet.len(), UCC_PACKET_MAX_LEN);
    }
}
