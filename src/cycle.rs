//! Frame Cycle Driver (§4.5).
//!
//! The per-cycle orchestrator: `prepare` runs the reset/timer/TX-build
//! half, `start` runs the transmit/receive half. Both are plain functions
//! over explicit state, called exactly once per cycle by an external
//! real-time caller (§5 "single-threaded cooperative, driven by an
//! external cyclic clock") — there is no internal timer or thread here,
//! mirroring the teacher's own avoidance of hidden schedulers in its
//! driver layer (`drivers/virtio` devices are polled, never self-timed).

use crate::descriptor::{walk_pairs, DescriptorMemory, Port};
use crate::driver::{EthernetDriver, NicTimedBatch, RxPacket, ScheduledFrame, SleepDriver};
use crate::error::{CoreError, StateErrorKind};
use crate::frame::{
    build_header, sealer_for, verify_header_crc, Channel, ExtendedFunctionField, PhaseByte, SercosType, EF_FIELD_OFFSET, HEADER_LEN,
};
use crate::registers::{BufferSelect, ControllerRegisters};
use crate::timing::TimingMethod;
use crate::ucc::UcChannel;
use crate::watchdog::Watchdog;

/// Host-requested reset flags, sampled from the global register each
/// prepare phase (§4.5 step 1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetRequest {
    pub phy_reset: bool,
    pub soft_reset: bool,
}

/// Sercos system time: seconds + nanoseconds, advanced once per cycle and
/// wrapped at a whole second (§4.5 step 3, §GLOSSARY "Sercos time").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SercosTime {
    pub sec: u32,
    pub ns: u32,
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

impl SercosTime {
    pub fn advance(&mut self, cycle_ns: u32) {
        let total = self.ns as u64 + cycle_ns as u64;
        self.sec = self.sec.wrapping_add((total / NANOS_PER_SEC as u64) as u32);
        self.ns = (total % NANOS_PER_SEC as u64) as u32;
    }
}

/// Subcycle counters A, B, MDT ticked once per cycle (§4.5 step 5). The
/// exact roll-over width is a controller configuration value; callers
/// supply it so this stays a pure counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubcycleCounters {
    pub a: u32,
    pub b: u32,
    pub mdt: u32,
}

impl SubcycleCounters {
    pub fn tick(&mut self, modulus_a: u32, modulus_b: u32, modulus_mdt: u32) {
        self.a = next_mod(self.a, modulus_a);
        self.b = next_mod(self.b, modulus_b);
        self.mdt = next_mod(self.mdt, modulus_mdt);
    }
}

fn next_mod(counter: u32, modulus: u32) -> u32 {
    if modulus == 0 {
        0
    } else {
        (counter + 1) % modulus
    }
}

/// `PHASECR` advances modulo 8 every cycle (§4.5 step 4).
pub fn advance_phasecr(phasecr: u8) -> u8 {
    (phasecr + 1) % 8
}

/// Which physical ports currently report link (§4.5 step 7). Port 2 only
/// carries a meaningful link state when redundancy is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub port1: bool,
    pub port2: bool,
}

/// Packs link/line status into `DFCSR`'s low two bits the way the register
/// table names them: bit0 = port1 link, bit1 = port2 link (gated off
/// entirely when redundancy is disabled).
pub fn derive_dfcsr(link: LinkStatus, redundancy_enabled: bool) -> u32 {
    let mut bits = 0u32;
    if link.port1 {
        bits |= 1;
    }
    if redundancy_enabled && link.port2 {
        bits |= 1 << 1;
    }
    bits
}

/// Chooses the active timing method by comparing the planned AT-start and
/// UCC-start offsets (§4.5 step 8: "AT-start > UCC-start => MDT_UCC_AT").
pub fn derive_timing_method(at_start_ns: u32, ucc_start_ns: u32) -> TimingMethod {
    if at_start_ns > ucc_start_ns {
        TimingMethod::MdtUccAt
    } else {
        TimingMethod::MdtAtUcc
    }
}

/// Ring wiring as seen from CP0 slave counting (§4.5 "Slave counting").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingState {
    ClosedRing,
    BrokenRingOrTwoLines,
    NonRedundantLine,
}

/// Derives the CP0 slave count from the latched sequence counter(s)
/// (§4.5 "Slave counting in CP0"). `seqcnt_port2` is ignored outside
/// `BrokenRingOrTwoLines`.
pub fn count_slaves_cp0(ring_state: RingState, seqcnt_port1: u32, seqcnt_port2: u32) -> u32 {
    match ring_state {
        RingState::ClosedRing => (seqcnt_port1 & 0x7FFF).saturating_sub(1),
        RingState::BrokenRingOrTwoLines => {
            seqcnt_port1.saturating_sub(1) + seqcnt_port2.saturating_sub(1)
        }
        RingState::NonRedundantLine => (seqcnt_port1 & 0xFFFF) / 2,
    }
}

/// One telegram this cycle's SFCR enable bits select for transmission.
pub struct TelegramSpec {
    pub tel_no: u8,
    pub is_at: bool,
    pub port: Port,
    pub len: usize,
    /// Raw descriptor words for this telegram's TX pass.
    pub descriptors: Vec<u32>,
    pub cycle_count_enable: bool,
}

/// One frame ready for the start phase to transmit.
pub struct PreparedFrame {
    pub port: Port,
    pub tel_no: u8,
    pub is_at: bool,
    pub bytes: Vec<u8>,
}

/// Everything the prepare phase needs beyond the driver's own state.
pub struct PrepareInputs<'a> {
    pub reset: ResetRequest,
    pub tscyc_ns: u32,
    pub telegrams: &'a [TelegramSpec],
    pub mem: &'a mut dyn DescriptorMemory,
    pub sa: [u8; 6],
    pub link: LinkStatus,
    pub redundancy_enabled: bool,
    pub at_start_ns: u32,
    pub ucc_start_ns: u32,
    pub ring_delay_ns: u32,
    pub subcycle_moduli: (u32, u32, u32),
}

/// Report handed back after `start` drains the driver's RX queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    /// Bitmask of telegrams (bit `tel_no`, AT telegrams offset by 4)
    /// whose CRC validated this cycle.
    pub tgsr: u32,
    pub slave_count: Option<u32>,
    pub hw_svc_error: bool,
    pub crc_errors: u32,
}

/// Owns the per-cycle state: watchdog, UC channel, counters, system time,
/// and the derived timing method. Register access always goes through the
/// caller-supplied `ControllerRegisters` handle; this struct holds only
/// what the core itself needs to remember between cycles.
pub struct FrameCycleDriver {
    pub watchdog: Watchdog,
    pub ucc: UcChannel,
    pub phasecr: u8,
    pub subcycles: SubcycleCounters,
    pub time: SercosTime,
    pub tsref: u16,
    pub toggle: bool,
    pub timing_method: TimingMethod,
    pub deferred_rx: bool,
}

impl FrameCycleDriver {
    pub fn new(watchdog: Watchdog, ucc: UcChannel, initial_method: TimingMethod, deferred_rx: bool) -> Self {
        Self {
            watchdog,
            ucc,
            phasecr: 0,
            subcycles: SubcycleCounters::default(),
            time: SercosTime::default(),
            tsref: 0,
            toggle: false,
            timing_method: initial_method,
            deferred_rx,
        }
    }

    /// Applies a soft reset: zeros counters and time, leaves the
    /// watchdog/UCC rings to the caller (§4.5 step 1: "re-assigns the
    /// frame buffers" is the caller's job via fresh `TelegramSpec`s next
    /// cycle).
    fn soft_reset(&mut self) {
        self.phasecr = 0;
        self.subcycles = SubcycleCounters::default();
        self.time = SercosTime::default();
        self.tsref = 0;
        self.toggle = false;
    }

    /// Runs the prepare phase (§4.5 steps 1-9) and returns the frames the
    /// start phase should transmit. Frames whose watchdog mode zeroes
    /// payloads still come back fully built so CRC/header bytes stay
    /// valid; only the payload past the header is zeroed.
    pub fn prepare(&mut self, regs: &mut ControllerRegisters, inputs: PrepareInputs<'_>) -> Result<Vec<PreparedFrame>, CoreError> {
        if inputs.reset.phy_reset || inputs.reset.soft_reset {
            self.soft_reset();
        }

        let alarm_latched = self.watchdog.tick();
        let _ = alarm_latched;

        self.time.advance(inputs.tscyc_ns);
        regs.write_sccmdt(self.time.sec);
        regs.write_sccab(self.time.ns);

        self.phasecr = advance_phasecr(self.phasecr);
        regs.write_phasecr(u32::from(self.phasecr));

        let (mod_a, mod_b, mod_mdt) = inputs.subcycle_moduli;
        self.subcycles.tick(mod_a, mod_b, mod_mdt);

        regs.write_dfcsr(derive_dfcsr(inputs.link, inputs.redundancy_enabled));

        let new_method = derive_timing_method(inputs.at_start_ns, inputs.ucc_start_ns);
        self.timing_method = new_method;

        self.toggle = !self.toggle;
        self.tsref = self.tsref.wrapping_add(1);

        let mut frames = Vec::with_capacity(inputs.telegrams.len());
        for spec in inputs.telegrams {
            let pairs = walk_pairs(&spec.descriptors)?;
            let phase = PhaseByte::from_phasecr(u32::from(self.phasecr));
            let sercos_type = SercosType {
                channel: match spec.port {
                    Port::Port1 => Channel::Primary,
                    Port::Port2 => Channel::Secondary,
                },
                is_at: spec.is_at,
                cycle_count_enable: spec.cycle_count_enable,
                tel_no: spec.tel_no,
            };
            let sealer = sealer_for(inputs.sa);
            let header = build_header(inputs.sa, sercos_type, phase, &sealer);

            let mut payload = vec![0u8; spec.len];
            crate::descriptor::assemble_tx(&pairs, inputs.mem, &mut payload)?;

            if !spec.is_at && spec.tel_no == 0 {
                let ef = ExtendedFunctionField::for_cycle(u32::from(self.tsref), (self.tsref & 0xFF) as u8, self.toggle, self.time.sec, self.time.ns);
                if payload.len() >= EF_FIELD_OFFSET + 4 {
                    crate::frame::write_ef_field(&mut payload, ef)?;
                }
            }

            if self.watchdog.zero_payloads() {
                payload.iter_mut().for_each(|b| *b = 0);
            }

            let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
            bytes.extend_from_slice(&header);
            bytes.extend_from_slice(&payload);

            frames.push(PreparedFrame {
                port: spec.port,
                tel_no: spec.tel_no,
                is_at: spec.is_at,
                bytes,
            });
        }

        Ok(frames)
    }

    /// Runs the start phase (§4.5 "Start phase"): transmits the prepared
    /// frames, then drains RX non-blockingly, validating CRCs and
    /// scattering payloads. `is_cp0` gates slave counting.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        regs: &mut ControllerRegisters,
        driver: &mut dyn EthernetDriver,
        sleeper: &mut dyn SleepDriver,
        frames: Vec<PreparedFrame>,
        nic_timed: bool,
        inter_block_sleep_ns: Option<u32>,
        ifg_bytes: u32,
        rx_mem: &mut dyn DescriptorMemory,
        rx_descriptors: impl Fn(u8, bool) -> Vec<u32>,
        is_cp0: bool,
        ring_state: RingState,
        hw_svc_enabled: bool,
    ) -> Result<CycleReport, CoreError> {
        if self.watchdog.suppress_tx() {
            // Alarm-disable mode: skip TX entirely this cycle, still drain RX.
        } else if nic_timed {
            let (mdt, at): (Vec<_>, Vec<_>) = frames.iter().partition(|f| !f.is_at);
            let mdt_frames: Vec<ScheduledFrame<'_>> = mdt.iter().map(|f| ScheduledFrame { port: f.port, bytes: &f.bytes }).collect();
            let at_frames: Vec<ScheduledFrame<'_>> = at.iter().map(|f| ScheduledFrame { port: f.port, bytes: &f.bytes }).collect();
            let batch = NicTimedBatch {
                mdt: &mdt_frames,
                at: &at_frames,
                ucc: &[],
                ifg: ifg_bytes,
                offset_ns: 0,
            };
            driver.tx_packets_nic_timed(&batch)?;
        } else {
            // Every timing method transmits MDTs before ATs; only the UCC
            // window's placement between them varies (§4.1), which the
            // NIC-timed path above handles via `offset_ns` instead.
            let first: Vec<&PreparedFrame> = frames.iter().filter(|f| !f.is_at).collect();
            let second: Vec<&PreparedFrame> = frames.iter().filter(|f| f.is_at).collect();
            for frame in first {
                let sent = driver.tx_packet(frame.port, &frame.bytes, ifg_bytes)?;
                if sent < frame.bytes.len() && frame.port == Port::Port1 {
                    return Err(CoreError::state(StateErrorKind::BufferError));
                }
            }
            if let Some(gap_ns) = inter_block_sleep_ns {
                sleeper.sleep_ns(gap_ns);
            }
            for frame in second {
                driver.tx_packet(frame.port, &frame.bytes, ifg_bytes)?;
            }
        }

        let mut report = CycleReport::default();
        loop {
            let packet = match driver.rx_packet(Port::Port1)? {
                RxPacket::None => break,
                RxPacket::Borrowed(bytes) => bytes,
            };
            if packet.len() < HEADER_LEN {
                continue;
            }
            if !verify_header_crc(packet) {
                report.crc_errors += 1;
                continue;
            }
            let sercos_type = SercosType::decode(packet[14]);
            let tel_bit = if sercos_type.is_at { 4 + sercos_type.tel_no } else { sercos_type.tel_no };
            report.tgsr |= 1 << tel_bit;
            regs.write_tgsr(sercos_type.channel, report.tgsr);

            if is_cp0 {
                let seqcnt = regs.read_seqcnt();
                report.slave_count = Some(count_slaves_cp0(ring_state, seqcnt, 0));
            }

            let payload = &packet[HEADER_LEN..];
            let descriptors = rx_descriptors(sercos_type.tel_no, sercos_type.is_at);
            let pairs = walk_pairs(&descriptors)?;
            crate::descriptor::scatter_rx(&pairs, payload, rx_mem)?;
        }

        regs.write_rxbuftv(BufferSelect::A, report.tgsr);

        if hw_svc_enabled {
            report.hw_svc_error = true;
            return Err(CoreError::state(StateErrorKind::HwSvcError));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watchdog::AlarmMode;
    use volatile::VolatileRef;

    fn fresh_registers(block: &mut crate::registers::RegisterBlock, svc: &mut [u8; crate::limits::SVC_RAM_LEN], tx: &mut [u8; crate::limits::TX_RAM_LEN], rx: &mut [u8; crate::limits::RX_RAM_LEN]) -> ControllerRegisters<'_> {
        ControllerRegisters::new(VolatileRef::from_mut_ref(block), svc, tx, rx)
    }

    #[test]
    fn system_time_wraps_at_one_second() {
        let mut time = SercosTime { sec: 0, ns: 999_999_500 };
        time.advance(1_000);
        assert_eq!(time.sec, 1);
        assert_eq!(time.ns, 500);
    }

    #[test]
    fn phasecr_wraps_modulo_eight() {
        let mut p = 7u8;
        p = advance_phasecr(p);
        assert_eq!(p, 0);
    }

    #[test]
    fn timing_method_follows_at_vs_ucc_ordering() {
        assert_eq!(derive_timing_method(500, 100), TimingMethod::MdtUccAt);
        assert_eq!(derive_timing_method(100, 500), TimingMethod::MdtAtUcc);
    }

    #[test]
    fn slave_counting_closed_ring() {
        let count = count_slaves_cp0(RingState::ClosedRing, 0x8000 | 6, 0);
        assert_eq!(count, 5);
    }

    #[test]
    fn slave_counting_non_redundant_line() {
        let count = count_slaves_cp0(RingState::NonRedundantLine, 16, 0);
        assert_eq!(count, 8);
    }

    #[test]
    fn slave_counting_broken_ring_sums_both_ports() {
        let count = count_slaves_cp0(RingState::BrokenRingOrTwoLines, 4, 3);
        assert_eq!(count, 5);
    }

    #[test]
    fn dfcsr_masks_port2_when_redundancy_disabled() {
        let link = LinkStatus { port1: true, port2: true };
        assert_eq!(derive_dfcsr(link, false), 1);
        assert_eq!(derive_dfcsr(link, true), 0b11);
    }

    struct FakeMemory {
        svc: [u8; 16],
        rt: [u8; 16],
        tx: [u8; 40],
    }

    impl DescriptorMemory for FakeMemory {
        fn svc(&self) -> &[u8] {
            &self.svc
        }
        fn svc_mut(&mut self) -> &mut [u8] {
            &mut self.svc
        }
        fn rt(&self, _bufsys: crate::descriptor::BufferSystem) -> &[u8] {
            &self.rt
        }
        fn rt_mut(&mut self, _bufsys: crate::descriptor::BufferSystem) -> &mut [u8] {
            &mut self.rt
        }
        fn tx_passthrough_mut(&mut self) -> &mut [u8] {
            &mut self.tx
        }
    }

    #[test]
    fn prepare_emits_one_frame_per_telegram_spec() {
        let mut block = crate::registers::RegisterBlock {
            idr: 0, gcsfr: 0, phasecr: 0, tcsr: 0, tcntcycr: 0, stns: 0, stsec: 0,
            sccmdt: 0, sccab: 0, dfcsr: 0, decr: 0, seqcnt: 0, tgsr1: 0, tgsr2: 0,
            sfcr: 0, ifg: 0, txbufcsr_a: 0, txbufcsr_b: 0, rxbufcsr_a: 0, rxbufcsr_b: 0,
            rxbuftv_a: 0, rxbuftv_b: 0, rxbuftr_a: 0, rxbuftr_b: 0, svccsr: 0, wdcsr: 0,
            wdcnt: 0, mac1: 0, iptxs1: 0, iptxs2: 0, iprrs1: 0, iprrs2: 0, iprxs1: 0,
            iprxs2: 0, iplastfl: 0,
        };
        let mut svc = [0u8; crate::limits::SVC_RAM_LEN];
        let mut tx = [0u8; crate::limits::TX_RAM_LEN];
        let mut rx = [0u8; crate::limits::RX_RAM_LEN];
        let mut regs = fresh_registers(&mut block, &mut svc, &mut tx, &mut rx);

        let mut driver = FrameCycleDriver::new(Watchdog::new(AlarmMode::AlarmDisableTx), UcChannel::new(), TimingMethod::MdtAtUcc, false);

        let mut mem = FakeMemory { svc: [0u8; 16], rt: [1u8; 16], tx: [0u8; 40] };
        let spec = TelegramSpec {
            tel_no: 0,
            is_at: false,
            port: Port::Port1,
            len: 40,
            descriptors: vec![
                crate::descriptor::encode(crate::descriptor::Descriptor {
                    telegram_offset: 16,
                    buffer_offset: 0,
                    kind: crate::descriptor::DescriptorKind::RtOpen(crate::descriptor::BufferSystem {
                        bank: BufferSelect::A,
                        port: Port::Port1,
                    }),
                }),
                crate::descriptor::encode(crate::descriptor::Descriptor {
                    telegram_offset: 20,
                    buffer_offset: 0,
                    kind: crate::descriptor::DescriptorKind::RtClose(crate::descriptor::BufferSystem {
                        bank: BufferSelect::A,
                        port: Port::Port1,
                    }),
                }),
                crate::descriptor::encode(crate::descriptor::Descriptor {
                    telegram_offset: 0,
                    buffer_offset: 0,
                    kind: crate::descriptor::DescriptorKind::Terminator,
                }),
            ],
            cycle_count_enable: false,
        };

        let inputs = PrepareInputs {
            reset: ResetRequest::default(),
            tscyc_ns: 1_000_000,
            telegrams: std::slice::from_ref(&spec),
            mem: &mut mem,
            sa: [0x02, 0, 0, 0, 0, 1],
            link: LinkStatus { port1: true, port2: false },
            redundancy_enabled: false,
            at_start_ns: 100,
            ucc_start_ns: 500,
            ring_delay_ns: 0,
            subcycle_moduli: (0, 0, 0),
        };

        let frames = driver.prepare(&mut regs, inputs).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes.len(), HEADER_LEN + 40);
        assert!(verify_header_crc(&frames[0].bytes[..HEADER_LEN]));
    }
}
