//! External interfaces (§6): the two downward traits the core drives and
//! is driven by nothing else. Grounded on the teacher's
//! `drivers/net::NetworkInterface` trait shape — a thin, blocking-or-not
//! set of methods a concrete NIC implements, with the core itself staying
//! hardware-agnostic. Real packet I/O, PHY pokes, and interrupt plumbing
//! are deliberately out of scope (§1 Non-goals); only the interface the
//! core calls into is specified here.

use crate::descriptor::Port;
use crate::error::CoreError;

/// One scheduled telegram transmission inside a NIC-timed batch.
#[derive(Debug, Clone)]
pub struct ScheduledFrame<'a> {
    pub port: Port,
    pub bytes: &'a [u8],
}

/// A NIC-timed transmit batch (§6: `tx_packets_nic_timed`): every
/// telegram plus the UC channel's packets, all scheduled to go out
/// `offset_ns` after the next cycle boundary.
pub struct NicTimedBatch<'a> {
    pub mdt: &'a [ScheduledFrame<'a>],
    pub at: &'a [ScheduledFrame<'a>],
    pub ucc: &'a [ScheduledFrame<'a>],
    pub ifg: u32,
    pub offset_ns: u32,
}

/// A packet handed back by a non-blocking receive. Mirrors the driver
/// owning the buffer (§6: "may hand back a driver-owned buffer") rather
/// than forcing a copy on every poll.
pub enum RxPacket<'a> {
    None,
    Borrowed(&'a [u8]),
}

/// The downward Ethernet driver interface (§6). A concrete NIC driver
/// implements this; the core only ever calls through it.
pub trait EthernetDriver {
    /// Opens the receive side. `redundant` requests the second port.
    fn open_rx(&mut self, redundant: bool) -> Result<(), CoreError>;

    /// Opens the transmit side, returning the MAC address to seal frames
    /// with (§6).
    fn open_tx(&mut self, redundant: bool) -> Result<[u8; 6], CoreError>;

    /// Blocking transmit of one frame on `port`, honoring the requested
    /// interframe gap in bytes. Returns the number of bytes actually sent.
    fn tx_packet(&mut self, port: Port, bytes: &[u8], ifg: u32) -> Result<usize, CoreError>;

    /// Non-blocking receive on `port`.
    fn rx_packet<'a>(&'a mut self, port: Port) -> Result<RxPacket<'a>, CoreError>;

    /// Schedules a whole cycle's worth of frames (MDT/AT/UCC) at a fixed
    /// offset from the next cycle boundary (§6).
    fn tx_packets_nic_timed(&mut self, batch: &NicTimedBatch<'_>) -> Result<(), CoreError>;

    /// Transmits one UC (standard Ethernet) side-channel packet.
    fn tx_ucc_packet(&mut self, port: Port, bytes: &[u8]) -> Result<usize, CoreError>;

    /// Non-blocking receive of one UC side-channel packet.
    fn rx_ucc_packet<'a>(&'a mut self, port: Port) -> Result<RxPacket<'a>, CoreError>;

    fn close_rx(&mut self);
    fn close_tx(&mut self);
}

/// The downward sleep primitive (§6): a relative-nanosecond sleep, kept
/// as its own trait so host environments without a scheduler (bare-metal,
/// a busy-wait spin loop) can implement it independently of NIC access.
pub trait SleepDriver {
    fn sleep_ns(&mut self, duration_ns: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDriver {
        tx_calls: u32,
        rx_has_packet: bool,
    }

    impl EthernetDriver for CountingDriver {
        fn open_rx(&mut self, _redundant: bool) -> Result<(), CoreError> {
            Ok(())
        }

        fn open_tx(&mut self, _redundant: bool) -> Result<[u8; 6], CoreError> {
            Ok([0x02, 0, 0, 0, 0, 1])
        }

        fn tx_packet(&mut self, _port: Port, bytes: &[u8], _ifg: u32) -> Result<usize, CoreError> {
            self.tx_calls += 1;
            Ok(bytes.len())
        }

        fn rx_packet<'a>(&'a mut self, _port: Port) -> Result<RxPacket<'a>, CoreError> {
            Ok(if self.rx_has_packet { RxPacket::Borrowed(&[0xAA]) } else { RxPacket::None })
        }

        fn tx_packets_nic_timed(&mut self, batch: &NicTimedBatch<'_>) -> Result<(), CoreError> {
            self.tx_calls += (batch.mdt.len() + batch.at.len() + batch.ucc.len()) as u32;
            Ok(())
        }

        fn tx_ucc_packet(&mut self, _port: Port, bytes: &[u8]) -> Result<usize, CoreError> {
            self.tx_calls += 1;
            Ok(bytes.len())
        }

        fn rx_ucc_packet<'a>(&'a mut self, _port: Port) -> Result<RxPacket<'a>, CoreError> {
            Ok(RxPacket::None)
        }

        fn close_rx(&mut self) {}
        fn close_tx(&mut self) {}
    }

    #[test]
    fn tx_packet_reports_sent_length() {
        let mut drv = CountingDriver { tx_calls: 0, rx_has_packet: false };
        let sent = drv.tx_packet(Port::Port1, &[0u8; 40], 37).unwrap();
        assert_eq!(sent, 40);
        assert_eq!(drv.tx_calls, 1);
    }

    #[test]
    fn rx_packet_reflects_availability() {
        let mut drv = CountingDriver { tx_calls: 0, rx_has_packet: true };
        assert!(matches!(drv.rx_packet(Port::Port1).unwrap(), RxPacket::Borrowed(_)));
        drv.rx_has_packet = false;
        assert!(matches!(drv.rx_packet(Port::Port1).unwrap(), RxPacket::None));
    }
}
