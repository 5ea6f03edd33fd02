//! Controller memory-mapped register view (§6 Register list).
//!
//! Grounded on the teacher's `drivers/virtio/transport/mmio.rs::ComCfg`: a
//! `#[derive(VolatileFieldAccess)]` register struct wrapped in a
//! `VolatileRef`, exposing one generated accessor method per field
//! (`virtio-def/src/pci.rs::CommonCfg` is the field-derive model). The four
//! RAM windows are plain shared memory, not control registers, the same
//! split the teacher keeps between `ComCfg` and its virtqueue descriptor
//! and buffer memory.

use volatile::{VolatileFieldAccess, VolatileRef};

use crate::limits::{RX_RAM_LEN, SVC_RAM_LEN, TX_RAM_LEN};

/// Raw register layout, one word per named register (§6 Register list).
/// Every field defaults to `ReadWrite` access; the core itself enforces
/// which ones are meaningfully read-only by never writing them.
#[derive(VolatileFieldAccess)]
#[repr(C)]
pub struct RegisterBlock {
    idr: u32,
    gcsfr: u32,
    phasecr: u32,
    tcsr: u32,
    tcntcycr: u32,
    stns: u32,
    stsec: u32,
    sccmdt: u32,
    sccab: u32,
    dfcsr: u32,
    decr: u32,
    seqcnt: u32,
    tgsr1: u32,
    tgsr2: u32,
    sfcr: u32,
    ifg: u32,
    txbufcsr_a: u32,
    txbufcsr_b: u32,
    rxbufcsr_a: u32,
    rxbufcsr_b: u32,
    rxbuftv_a: u32,
    rxbuftv_b: u32,
    rxbuftr_a: u32,
    rxbuftr_b: u32,
    svccsr: u32,
    wdcsr: u32,
    wdcnt: u32,
    mac1: u32,
    iptxs1: u32,
    iptxs2: u32,
    iprrs1: u32,
    iprrs2: u32,
    iprxs1: u32,
    iprxs2: u32,
    iplastfl: u32,
}

/// Safe handle over the four fixed memory windows (§6).
pub struct ControllerRegisters<'a> {
    regs: VolatileRef<'a, RegisterBlock>,
    svc_ram: &'a mut [u8; SVC_RAM_LEN],
    tx_ram: &'a mut [u8; TX_RAM_LEN],
    rx_ram: &'a mut [u8; RX_RAM_LEN],
}

impl<'a> ControllerRegisters<'a> {
    /// Wraps already-mapped memory windows. The caller is responsible for
    /// having mapped the register block device-strongly-ordered and
    /// non-cacheable.
    pub fn new(
        regs: VolatileRef<'a, RegisterBlock>,
        svc_ram: &'a mut [u8; SVC_RAM_LEN],
        tx_ram: &'a mut [u8; TX_RAM_LEN],
        rx_ram: &'a mut [u8; RX_RAM_LEN],
    ) -> Self {
        Self {
            regs,
            svc_ram,
            tx_ram,
            rx_ram,
        }
    }

    pub fn read_idr(&mut self) -> u32 {
        self.regs.as_mut_ptr().idr().read()
    }

    pub fn write_phasecr(&mut self, value: u32) {
        self.regs.as_mut_ptr().phasecr().write(value);
    }

    pub fn read_phasecr(&mut self) -> u32 {
        self.regs.as_mut_ptr().phasecr().read()
    }

    pub fn write_tcsr(&mut self, value: u32) {
        self.regs.as_mut_ptr().tcsr().write(value);
    }

    pub fn read_tcntcycr(&mut self) -> u32 {
        self.regs.as_mut_ptr().tcntcycr().read()
    }

    /// Returns `(seconds, nanoseconds)` of Sercos time (§ GLOSSARY).
    pub fn read_sercos_time(&mut self) -> (u32, u32) {
        let mut ptr = self.regs.as_mut_ptr();
        (ptr.stsec().read(), ptr.stns().read())
    }

    pub fn write_sccmdt(&mut self, value: u32) {
        self.regs.as_mut_ptr().sccmdt().write(value);
    }

    pub fn write_sccab(&mut self, value: u32) {
        self.regs.as_mut_ptr().sccab().write(value);
    }

    pub fn write_dfcsr(&mut self, value: u32) {
        self.regs.as_mut_ptr().dfcsr().write(value);
    }

    pub fn read_decr(&mut self) -> u32 {
        self.regs.as_mut_ptr().decr().read()
    }

    pub fn read_seqcnt(&mut self) -> u32 {
        self.regs.as_mut_ptr().seqcnt().read()
    }

    /// TGSR1/TGSR2 are per-port (primary/secondary channel) registers, not
    /// per-telegram-number (§6/GLOSSARY): a frame received on the secondary
    /// channel always reports through TGSR2 regardless of which telegram
    /// number it carries.
    pub fn write_tgsr(&mut self, channel: crate::frame::Channel, value: u32) {
        let mut ptr = self.regs.as_mut_ptr();
        match channel {
            crate::frame::Channel::Primary => ptr.tgsr1().write(value),
            crate::frame::Channel::Secondary => ptr.tgsr2().write(value),
        }
    }

    pub fn write_sfcr(&mut self, value: u32) {
        self.regs.as_mut_ptr().sfcr().write(value);
    }

    pub fn write_ifg(&mut self, ifg_bytes: u32) {
        self.regs.as_mut_ptr().ifg().write(ifg_bytes);
    }

    pub fn write_txbufcsr(&mut self, buf: BufferSelect, value: u32) {
        let mut ptr = self.regs.as_mut_ptr();
        match buf {
            BufferSelect::A => ptr.txbufcsr_a().write(value),
            BufferSelect::B => ptr.txbufcsr_b().write(value),
        }
    }

    pub fn read_rxbufcsr(&mut self, buf: BufferSelect) -> u32 {
        let mut ptr = self.regs.as_mut_ptr();
        match buf {
            BufferSelect::A => ptr.rxbufcsr_a().read(),
            BufferSelect::B => ptr.rxbufcsr_b().read(),
        }
    }

    pub fn read_rxbuftv(&mut self, buf: BufferSelect) -> u32 {
        let mut ptr = self.regs.as_mut_ptr();
        match buf {
            BufferSelect::A => ptr.rxbuftv_a().read(),
            BufferSelect::B => ptr.rxbuftv_b().read(),
        }
    }

    /// Mirrors the TGSR bitmask into `RXBUFTV` after RX (§4.5 start phase).
    pub fn write_rxbuftv(&mut self, buf: BufferSelect, value: u32) {
        let mut ptr = self.regs.as_mut_ptr();
        match buf {
            BufferSelect::A => ptr.rxbuftv_a().write(value),
            BufferSelect::B => ptr.rxbuftv_b().write(value),
        }
    }

    pub fn read_rxbuftr(&mut self, buf: BufferSelect) -> u32 {
        let mut ptr = self.regs.as_mut_ptr();
        match buf {
            BufferSelect::A => ptr.rxbuftr_a().read(),
            BufferSelect::B => ptr.rxbuftr_b().read(),
        }
    }

    pub fn write_svccsr(&mut self, value: u32) {
        self.regs.as_mut_ptr().svccsr().write(value);
    }

    pub fn write_wdcsr(&mut self, value: u32) {
        self.regs.as_mut_ptr().wdcsr().write(value);
    }

    pub fn write_wdcnt(&mut self, value: u32) {
        self.regs.as_mut_ptr().wdcnt().write(value);
    }

    pub fn read_ip_counters(&mut self) -> IpCounters {
        let mut ptr = self.regs.as_mut_ptr();
        IpCounters {
            tx1: ptr.iptxs1().read(),
            tx2: ptr.iptxs2().read(),
            rr1: ptr.iprrs1().read(),
            rr2: ptr.iprrs2().read(),
            rx1: ptr.iprxs1().read(),
            rx2: ptr.iprxs2().read(),
            last_fill_level: ptr.iplastfl().read(),
        }
    }

    /// Copies `src` into the SVC RAM window starting at `offset`.
    pub fn write_svc_ram(&mut self, offset: usize, src: &[u8]) {
        self.svc_ram[offset..offset + src.len()].copy_from_slice(src);
    }

    pub fn read_svc_ram(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.svc_ram[offset..offset + dst.len()]);
    }

    /// Copies `src` into the TX RAM window starting at `offset`.
    pub fn write_tx_ram(&mut self, offset: usize, src: &[u8]) {
        self.tx_ram[offset..offset + src.len()].copy_from_slice(src);
    }

    pub fn read_rx_ram(&self, offset: usize, dst: &mut [u8]) {
        dst.copy_from_slice(&self.rx_ram[offset..offset + dst.len()]);
    }
}

/// Picks between the controller's two ping-pong TX/RX buffer banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSelect {
    A,
    B,
}

impl BufferSelect {
    pub fn other(self) -> Self {
        match self {
            BufferSelect::A => BufferSelect::B,
            BufferSelect::B => BufferSelect::A,
        }
    }
}

/// Snapshot of the UC channel's IP traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpCounters {
    pub tx1: u32,
    pub tx2: u32,
    pub rr1: u32,
    pub rr2: u32,
    pub rx1: u32,
    pub rx2: u32,
    pub last_fill_level: u32,
}
