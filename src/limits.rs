//! Compile-time sizing constants shared by the whole crate.
//!
//! Mirrors the teacher's `config.rs`: small `pub const`s, no runtime state.

/// Maximum number of bytes in a Sercos telegram payload (MTU-bound).
pub const SERC3_MAX_DATA_LENGTH: usize = 1494;

/// Minimum telegram payload length; shorter telegrams are padded.
pub const MIN_TELEGRAM_LENGTH: usize = 40;

/// Maximum number of MDT/AT telegrams per cycle (MDT0..MDT3 or AT0..AT3).
pub const MAX_TEL: usize = 4;

/// Bytes reserved for the hot-plug field in telegram 0.
pub const HP_FIELD_LEN: usize = 6;

/// Bytes reserved for the extended-function field in MDT0 when the
/// "hot-plug-in-all-telegrams" compatibility flag is not set.
pub const EF_FIELD_LEN: usize = 4;

/// Bytes reserved for the extended-function field in MDT0 when the
/// compatibility flag *is* set (hot-plug fields repeated per telegram).
pub const EF_FIELD_LEN_COMPAT: usize = 6;

/// Bytes per SVC slot (one per projected slave, per direction).
pub const SVC_SLOT_LEN: usize = 6;

/// Bytes per C-DEV slot (one per projected slave, MDT only).
pub const CDEV_SLOT_LEN: usize = 4;

/// Bytes per S-DEV slot (one per projected slave, AT only).
pub const SDEV_SLOT_LEN: usize = 4;

/// Maximum number of timer events the Event Sorter can hold per table.
pub const TIMER_EVENT_NUMBER: usize = 16;

/// Maximum number of port events the Event Sorter can hold per table.
pub const PORTS_EVENT_NUMBER: usize = 16;

/// Generic event-slot count used when clearing a controller event table tail.
pub const EVENT_NUMBER: usize = 16;

/// Default interframe gap in bytes, used when dynamic IFG is unavailable.
pub const DEFAULT_IFG_BYTES: u32 = 37;

/// Ethernet MAC preamble + IFG overhead folded into UCC scheduling math.
pub const MAC_OVERHEAD_BYTES: u32 = 20;

/// Nanoseconds per byte at 100 Mbit/s (the Sercos III PHY rate).
pub const BYTE_TIME_NS: u32 = 80;

/// Smallest legal Sercos communication cycle time.
pub const TSCYC_MIN_NS: u32 = 31_250;

/// Largest legal Sercos communication cycle time.
pub const TSCYC_MAX_NS: u32 = 65_000_000;

/// Smallest UCC window worth keeping open; narrower requests are expanded.
pub const UCC_MIN_WIDTH_NS: u32 = 125_000;

/// Size of the controller's SVC RAM window (§6 memory windows).
pub const SVC_RAM_LEN: usize = 4096;

/// Size of the controller's TX RAM window.
pub const TX_RAM_LEN: usize = 8192;

/// Size of the controller's RX RAM window.
pub const RX_RAM_LEN: usize = 8192;

/// Fixed capacity of the UC channel's TX ring (§4.7).
pub const UCC_TX_RING_CAPACITY: usize = 16;

/// Fixed capacity of the UC channel's RX ring (§4.7).
pub const UCC_RX_RING_CAPACITY: usize = 16;

/// Largest UC packet payload the ring can hold (standard Ethernet MTU).
pub const UCC_PACKET_MAX_LEN: usize = 1500;

/// Per-participant resource limits, sized once at init and never resized.
///
/// Arena sizes are deliberately small `u16`-indexable bounds: the Sercos
/// wire format itself limits slave counts and per-slave connection counts
/// far below `u16::MAX`, so `0xFFFF` is free to use as the "empty" sentinel
/// (see §9 of SPEC_FULL.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemLimits {
    /// Maximum number of projected slaves.
    pub max_slaves: u16,
    /// Maximum number of connections across master + all slaves.
    pub max_connections: u16,
    /// Maximum number of distinct configurations (producer/consumer roles).
    pub max_configurations: u16,
    /// Maximum number of `{ConnIdx, ConfigIdx, RTBitsIdx}` entries per slave.
    pub max_connections_per_slave: u16,
}

impl SystemLimits {
    /// A reasonable default sized for small-to-medium Sercos rings.
    pub const fn small_ring() -> Self {
        Self {
            max_slaves: 64,
            max_connections: 256,
            max_configurations: 256,
            max_connections_per_slave: 16,
        }
    }
}

impl Default for SystemLimits {
    fn default() -> Self {
        Self::small_ring()
    }
}

/// Canonical "no index" sentinel for arena cross-references.
pub const NO_INDEX: u16 = 0xFFFF;
