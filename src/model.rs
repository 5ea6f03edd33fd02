//! Core data model (§3): connections, configurations, slaves, telegram layout.
//!
//! Cyclic pointer graphs (master ↔ configuration ↔ connections ↔
//! configurations ↔ slaves) become arena + indices: parallel `Vec`s
//! cross-referenced by 16-bit indices, `NO_INDEX` as the empty sentinel
//! (§9 design note). This removes the raw-pointer aliasing the original C
//! relies on, the same trade the teacher's descriptor rings make when they
//! keep a `Box<[*mut TransferToken]>` behind a safe index API
//! (`drivers/virtio/virtqueue/split.rs`).

use crate::limits::NO_INDEX;

/// Direction bucket of a connection (§3 Connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Mdt,
    At,
}

/// Role a participant plays with respect to one connection (§3 Configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
    Unused,
}

/// Where a packed connection landed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Assigned {
    pub telegram_no: u8,
    pub byte_offset: u16,
}

impl Assigned {
    pub const UNASSIGNED: Self = Self {
        telegram_no: u8::MAX,
        byte_offset: u16::MAX,
    };

    pub fn is_assigned(&self) -> bool {
        *self != Self::UNASSIGNED
    }
}

impl Default for Direction {
    fn default() -> Self {
        Direction::Mdt
    }
}

/// One distinct data stream on the wire (§3 Connection).
#[derive(Debug, Clone, Copy)]
pub struct Connection {
    /// Globally unique small integer identifying this connection.
    pub connection_number: u16,
    pub direction: Direction,
    pub payload_len: u16,
    /// 0 means "every cycle"; otherwise a multiple of Tscyc.
    pub producer_cycle_ns: u32,
    /// Set by the master (by default never produces in AT) unless the
    /// master-produces-in-AT path is enabled (§4.3 AT pass step 4).
    pub produced_by_master: bool,
    /// Cross-communication: a slave-to-slave AT connection that does not go
    /// through the master (§3 CC). A purely declarative catalog property,
    /// not inferred, since the packer needs it before assignment exists.
    pub is_cc: bool,
    /// Filled in by the Connection Packer.
    pub assigned: Assigned,
}

impl Connection {
    pub fn new(connection_number: u16, direction: Direction, payload_len: u16, producer_cycle_ns: u32) -> Self {
        Self {
            connection_number,
            direction,
            payload_len,
            producer_cycle_ns,
            produced_by_master: false,
            is_cc: false,
            assigned: Assigned::UNASSIGNED,
        }
    }
}

/// Per-participant view of a `Connection` (§3 Configuration).
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub connection_index: u16,
    pub role: Role,
    /// Index into a real-time-bit table the host maintains; opaque here.
    pub rt_bits_index: u16,
    /// Capability index used by the plausibility check against SCP flags.
    pub capability_index: u16,
    /// True if the master consumes this AT connection directly (affects CC
    /// ordering in §4.3 AT pass step 3).
    pub consumed_by_master: bool,
}

impl Configuration {
    pub fn unused() -> Self {
        Self {
            connection_index: NO_INDEX,
            role: Role::Unused,
            rt_bits_index: NO_INDEX,
            capability_index: NO_INDEX,
            consumed_by_master: false,
        }
    }
}

/// One `{ConnIdx, ConfigIdx, RTBitsIdx}` entry in a slave's connection list.
#[derive(Debug, Clone, Copy)]
pub struct SlaveConnectionEntry {
    pub connection_index: u16,
    pub configuration_index: u16,
    pub rt_bits_index: u16,
}

/// SCP_* capability flags (§3 Slave capability bitmap).
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScpCapability: u32 {
        const SCP_FIXED      = 1 << 0;
        const SCP_CONFIG      = 1 << 1;
        const SCP_SYNC        = 1 << 2;
        const SCP_WD          = 1 << 3;
        const SCP_CYCLIC      = 1 << 4;
        const SCP_CC          = 1 << 5;
        const SCP_DYNAMIC_IFG = 1 << 6;
    }
}

/// One projected slave (§3 Slave).
#[derive(Debug, Clone)]
pub struct Slave {
    /// Index in projection order.
    pub index: u16,
    pub sercos_address: u16,
    /// Filled in by the Topology & Slave Ordering component.
    pub topology_address: u16,
    pub preferred_port: u8,
    pub capabilities: ScpCapability,
    pub jitter_ns: u32,
    pub feedback_processing_time_ns: u32,
    pub connections: Vec<SlaveConnectionEntry>,
}

impl Slave {
    pub fn new(index: u16, sercos_address: u16, jitter_ns: u32) -> Self {
        Self {
            index,
            sercos_address,
            topology_address: NO_INDEX,
            preferred_port: 1,
            capabilities: ScpCapability::empty(),
            jitter_ns,
            feedback_processing_time_ns: 0,
            connections: Vec::new(),
        }
    }

    pub fn has_dynamic_ifg(&self) -> bool {
        self.capabilities.contains(ScpCapability::SCP_DYNAMIC_IFG)
    }
}

/// Byte-accounting for one computed telegram (§3 Telegram layout).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelegramLayout {
    pub hp: u16,
    pub ef: u16,
    pub svc: u16,
    pub rtd: u16,
    pub cc: u16,
    pub cc_m: u16,
}

impl TelegramLayout {
    /// Total telegram length; invariant `hp+ef+svc+rtd == tel` holds by
    /// construction since `rtd` already folds in `cc`/`cc_m` contributions.
    pub fn tel(&self) -> u16 {
        self.hp + self.ef + self.svc + self.rtd
    }
}

/// Per-participant connection catalog the master itself produces/consumes
/// (§3 Master configuration — "identical shape" to a slave's view).
#[derive(Debug, Clone, Default)]
pub struct MasterParticipant {
    pub connections: Vec<SlaveConnectionEntry>,
}
