//! SoftMaster (§4.5): the top-level instance record tying the Connection
//! Packer, Descriptor Engine, Controller Registers, Watchdog, UC Channel,
//! and Frame Cycle Driver together behind one handle (§9 "Global mutable
//! state collapses into a single instance record owned by the caller").
//!
//! Building the controller's descriptor word tables from a `PackResult`
//! is left to the caller: the spec fixes the wire *layout* (byte offsets
//! per telegram) but not a canonical descriptor-synthesis algorithm, and
//! fabricating one here would be machinery of our own invention standing
//! in for a hardware-specific concern (see `DESIGN.md`). `SoftMaster`
//! drives the cycle given already-built descriptor tables; it owns
//! configuration state and the per-cycle runtime pieces, not descriptor
//! generation.

use crate::cycle::FrameCycleDriver;
use crate::error::{CoreError, CoreResult};
use crate::limits::SystemLimits;
use crate::model::{Configuration, Connection, Direction, MasterParticipant, Slave};
use crate::packer::{pack, AtConnectionGroups, MdtConnectionGroups, PackResult, PackerOptions};
use crate::registers::ControllerRegisters;
use crate::timing::TimingMethod;
use crate::ucc::UcChannel;
use crate::watchdog::{AlarmMode, Watchdog};

/// Sercos communication phases (§2, §4.5 "in CP0 latch the sequence
/// counter"). CP1/CP2 are collapsed per the planner's own three-entry-point
/// split (`timing::PlannerPhase`); SoftMaster still tracks all five since
/// slave counting and SVC behavior differ phase to phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommPhase {
    Cp0,
    Cp1,
    Cp2,
    Cp3,
    Cp4,
}

/// The master's full configuration catalog, arena-indexed (§3, §9).
pub struct MasterConfig {
    pub slaves: Vec<Slave>,
    pub connections: Vec<Connection>,
    pub configurations: Vec<Configuration>,
    pub master: MasterParticipant,
    pub limits: SystemLimits,
}

impl MasterConfig {
    pub fn new(limits: SystemLimits) -> Self {
        Self {
            slaves: Vec::new(),
            connections: Vec::new(),
            configurations: Vec::new(),
            master: MasterParticipant::default(),
            limits,
        }
    }
}

/// The single instance record a host application owns: configuration plus
/// every piece of per-cycle runtime state (§9).
pub struct SoftMaster<'a> {
    pub config: MasterConfig,
    pub phase: CommPhase,
    pub pack_result: Option<PackResult>,
    pub registers: ControllerRegisters<'a>,
    pub cycle: FrameCycleDriver,
}

impl<'a> SoftMaster<'a> {
    pub fn new(config: MasterConfig, registers: ControllerRegisters<'a>, watchdog_mode: AlarmMode, deferred_rx: bool) -> Self {
        Self {
            config,
            phase: CommPhase::Cp0,
            pack_result: None,
            registers,
            cycle: FrameCycleDriver::new(Watchdog::new(watchdog_mode), UcChannel::new(), TimingMethod::MdtAtUcc, deferred_rx),
        }
    }

    /// Runs the plausibility check and Connection Packer over the current
    /// configuration, caching the result for subsequent cycles (§4.3). The
    /// MDT/AT connection groupings the packer needs are derived here from
    /// each connection's own direction/CC/producer flags plus which
    /// configuration entries the master consumes.
    pub fn configure(&mut self, tscyc_ns: u32, options: PackerOptions) -> CoreResult<PackResult> {
        let (mdt_groups, at_groups) = derive_groups(&self.config.connections, &self.config.configurations);
        let result = pack(
            &mut self.config.connections,
            &self.config.configurations,
            &self.config.slaves,
            &self.config.master,
            tscyc_ns,
            &mdt_groups,
            &at_groups,
            &options,
        )?;
        self.pack_result = Some(result.clone());
        Ok(result)
    }

    /// Advances to the next communication phase (§2). CP4 is terminal for
    /// this core's purposes; the host re-enters CP0 by constructing a new
    /// `SoftMaster` or issuing a soft reset through `cycle::ResetRequest`.
    pub fn advance_phase(&mut self) -> Result<(), CoreError> {
        self.phase = match self.phase {
            CommPhase::Cp0 => CommPhase::Cp1,
            CommPhase::Cp1 => CommPhase::Cp2,
            CommPhase::Cp2 => CommPhase::Cp3,
            CommPhase::Cp3 | CommPhase::Cp4 => CommPhase::Cp4,
        };
        Ok(())
    }

    pub fn is_cp0(&self) -> bool {
        self.phase == CommPhase::Cp0
    }
}

/// Builds the packer's MDT/AT connection-index groupings from the catalog
/// itself: direction and `is_cc`/`produced_by_master` live on `Connection`,
/// while "does the master consume this one" is a `Configuration`-level fact
/// (§4.3 AT pass step 3 ordering contract).
fn derive_groups(connections: &[Connection], configurations: &[Configuration]) -> (MdtConnectionGroups, AtConnectionGroups) {
    let mut mdt = MdtConnectionGroups::default();
    let mut at = AtConnectionGroups::default();

    for (i, conn) in connections.iter().enumerate() {
        let idx = i as u16;
        match conn.direction {
            Direction::Mdt => {
                if conn.produced_by_master {
                    mdt.master_produced.push(idx);
                }
            }
            Direction::At => {
                if conn.produced_by_master {
                    at.master_produced.push(idx);
                } else if conn.is_cc {
                    let consumed_by_master = configurations
                        .iter()
                        .any(|c| c.connection_index == idx && c.consumed_by_master);
                    if consumed_by_master {
                        at.cc_consumed_by_master.push(idx);
                    } else {
                        at.cc_not_consumed_by_master.push(idx);
                    }
                } else {
                    at.slave_produced_non_cc.push(idx);
                }
            }
        }
    }

    (mdt, at)
}
