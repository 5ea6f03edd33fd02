//! Descriptor Engine (§4.4).
//!
//! TX/RX descriptor tables live in shared RAM as 32-bit packed words; each
//! cell is an offset into a pair-list that alternates open/close
//! descriptors bracketing a byte range. Grounded on the teacher's
//! `drivers/virtio/virtqueue/split.rs` descriptor-ring shape (`Descriptor
//! { address, len, flags, next }` decoded out of a flat `#[repr(C)]` word
//! array): here a 32-bit word is decoded into a type-safe sum type at the
//! boundary (§9 design note), and everything past that boundary works with
//! the decoded `Descriptor` rather than raw bits.

use crate::error::{CoreError, StateErrorKind};
use crate::registers::BufferSelect;

/// Which of the two physical ports a real-time buffer system serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Port1,
    Port2,
}

/// One of the controller's four real-time buffer systems (A/B × port1/port2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSystem {
    pub bank: BufferSelect,
    pub port: Port,
}

/// Decoded descriptor sum type (§9 design note). The bit-packed word is
/// decoded into this at the boundary; everything downstream is type-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    SvcOpen,
    SvcClose,
    RtOpen(BufferSystem),
    RtClose(BufferSystem),
    PortCcOpen,
    PortCcClose,
    RtCcOpen(BufferSystem),
    RtCcClose(BufferSystem),
    PortOpen,
    PortClose,
    Terminator,
}

/// A decoded descriptor word: `{telegram_offset, buffer_offset, kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub telegram_offset: u16,
    pub buffer_offset: u16,
    pub kind: DescriptorKind,
}

// Bit layout of the packed 32-bit word: type(4) | bufsys(2) | buffer_offset(13) | telegram_offset(13).
const TELEGRAM_OFFSET_BITS: u32 = 13;
const BUFFER_OFFSET_BITS: u32 = 13;
const BUFSYS_BITS: u32 = 2;

const TELEGRAM_OFFSET_MASK: u32 = (1 << TELEGRAM_OFFSET_BITS) - 1;
const BUFFER_OFFSET_MASK: u32 = (1 << BUFFER_OFFSET_BITS) - 1;
const BUFSYS_MASK: u32 = (1 << BUFSYS_BITS) - 1;

fn decode_bufsys(bits: u32) -> BufferSystem {
    BufferSystem {
        bank: if bits & 0b10 == 0 { BufferSelect::A } else { BufferSelect::B },
        port: if bits & 0b01 == 0 { Port::Port1 } else { Port::Port2 },
    }
}

fn encode_bufsys(bufsys: BufferSystem) -> u32 {
    let bank_bit = if bufsys.bank == BufferSelect::B { 0b10 } else { 0 };
    let port_bit = if bufsys.port == Port::Port2 { 0b01 } else { 0 };
    bank_bit | port_bit
}

/// Decodes one 32-bit descriptor word.
pub fn decode(word: u32) -> Result<Descriptor, CoreError> {
    let telegram_offset = (word & TELEGRAM_OFFSET_MASK) as u16;
    let buffer_offset = ((word >> TELEGRAM_OFFSET_BITS) & BUFFER_OFFSET_MASK) as u16;
    let bufsys_bits = (word >> (TELEGRAM_OFFSET_BITS + BUFFER_OFFSET_BITS)) & BUFSYS_MASK;
    let ty = word >> (TELEGRAM_OFFSET_BITS + BUFFER_OFFSET_BITS + BUFSYS_BITS);

    let kind = match ty {
        0x00 => DescriptorKind::SvcOpen,
        0x01 => DescriptorKind::SvcClose,
        0x02 => DescriptorKind::RtOpen(decode_bufsys(bufsys_bits)),
        0x03 => DescriptorKind::RtClose(decode_bufsys(bufsys_bits)),
        0x04 => DescriptorKind::Terminator,
        0x08 => DescriptorKind::PortOpen,
        0x09 => DescriptorKind::PortClose,
        0x0A => DescriptorKind::RtCcOpen(decode_bufsys(bufsys_bits)),
        0x0B => DescriptorKind::RtCcClose(decode_bufsys(bufsys_bits)),
        0x0C => DescriptorKind::PortCcOpen,
        0x0D => DescriptorKind::PortCcClose,
        _ => return Err(CoreError::state(StateErrorKind::Unsupported)),
    };

    Ok(Descriptor {
        telegram_offset,
        buffer_offset,
        kind,
    })
}

/// Encodes a descriptor back into its 32-bit word, for building the
/// controller-facing tables the Connection Packer hands to TX RAM.
pub fn encode(desc: Descriptor) -> u32 {
    let (ty, bufsys_bits): (u32, u32) = match desc.kind {
        DescriptorKind::SvcOpen => (0x00, 0),
        DescriptorKind::SvcClose => (0x01, 0),
        DescriptorKind::RtOpen(b) => (0x02, encode_bufsys(b)),
        DescriptorKind::RtClose(b) => (0x03, encode_bufsys(b)),
        DescriptorKind::Terminator => (0x04, 0),
        DescriptorKind::PortOpen => (0x08, 0),
        DescriptorKind::PortClose => (0x09, 0),
        DescriptorKind::RtCcOpen(b) => (0x0A, encode_bufsys(b)),
        DescriptorKind::RtCcClose(b) => (0x0B, encode_bufsys(b)),
        DescriptorKind::PortCcOpen => (0x0C, 0),
        DescriptorKind::PortCcClose => (0x0D, 0),
    };
    (ty << (TELEGRAM_OFFSET_BITS + BUFFER_OFFSET_BITS + BUFSYS_BITS))
        | (bufsys_bits << (TELEGRAM_OFFSET_BITS + BUFFER_OFFSET_BITS))
        | ((desc.buffer_offset as u32 & BUFFER_OFFSET_MASK) << TELEGRAM_OFFSET_BITS)
        | (desc.telegram_offset as u32 & TELEGRAM_OFFSET_MASK)
}

/// One open/close pair with the byte range it brackets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPair {
    pub open: Descriptor,
    pub close_telegram_offset: u16,
}

impl DescriptorPair {
    /// `close.tel - open.tel + 2` (§4.4).
    pub fn byte_len(&self) -> u16 {
        self.close_telegram_offset - self.open.telegram_offset + 2
    }
}

/// Walks a flat descriptor word table, pairing each open descriptor with
/// its immediately following close descriptor and stopping at the first
/// `Terminator`. Open must be consumed before its close (§5 ordering
/// guarantee); any close seen without a preceding open is rejected.
pub fn walk_pairs(words: &[u32]) -> Result<Vec<DescriptorPair>, CoreError> {
    let mut pairs = Vec::new();
    let mut pending: Option<Descriptor> = None;

    for &word in words {
        let desc = decode(word)?;
        if matches!(desc.kind, DescriptorKind::Terminator) {
            if pending.is_some() {
                return Err(CoreError::state(StateErrorKind::Unsupported));
            }
            break;
        }
        match (pending.take(), is_open(desc.kind)) {
            (None, true) => pending = Some(desc),
            (Some(open), false) if closes(open.kind, desc.kind) => {
                pairs.push(DescriptorPair {
                    open,
                    close_telegram_offset: desc.telegram_offset,
                });
            }
            _ => return Err(CoreError::state(StateErrorKind::Unsupported)),
        }
    }

    if pending.is_some() {
        return Err(CoreError::state(StateErrorKind::Unsupported));
    }

    Ok(pairs)
}

fn is_open(kind: DescriptorKind) -> bool {
    matches!(
        kind,
        DescriptorKind::SvcOpen
            | DescriptorKind::RtOpen(_)
            | DescriptorKind::PortCcOpen
            | DescriptorKind::RtCcOpen(_)
            | DescriptorKind::PortOpen
    )
}

fn closes(open: DescriptorKind, close: DescriptorKind) -> bool {
    matches!(
        (open, close),
        (DescriptorKind::SvcOpen, DescriptorKind::SvcClose)
            | (DescriptorKind::RtOpen(_), DescriptorKind::RtClose(_))
            | (DescriptorKind::PortCcOpen, DescriptorKind::PortCcClose)
            | (DescriptorKind::RtCcOpen(_), DescriptorKind::RtCcClose(_))
            | (DescriptorKind::PortOpen, DescriptorKind::PortClose)
    )
}

/// Named byte sources/sinks a descriptor pair can reference, abstracting
/// over "SVC segment of RAM" / "one of four RT buffer systems" / "TX RAM
/// pass-through" (§4.4 descriptor type list).
pub trait DescriptorMemory {
    fn svc(&self) -> &[u8];
    fn svc_mut(&mut self) -> &mut [u8];
    fn rt(&self, bufsys: BufferSystem) -> &[u8];
    fn rt_mut(&mut self, bufsys: BufferSystem) -> &mut [u8];
    fn tx_passthrough_mut(&mut self) -> &mut [u8];
}

/// Assembles one outgoing telegram's data bytes into `telegram` by copying
/// each pair's source bytes at `open.buffer_offset` to `telegram` at
/// `open.telegram_offset` (§4.5 prepare-phase step 9, "copy data via the
/// descriptor table").
pub fn assemble_tx(pairs: &[DescriptorPair], mem: &dyn DescriptorMemory, telegram: &mut [u8]) -> Result<(), CoreError> {
    for pair in pairs {
        let len = pair.byte_len() as usize;
        let tel_start = pair.open.telegram_offset as usize;
        let buf_start = pair.open.buffer_offset as usize;
        let src: &[u8] = match pair.open.kind {
            DescriptorKind::SvcOpen => mem.svc(),
            DescriptorKind::RtOpen(b) | DescriptorKind::RtCcOpen(b) => mem.rt(b),
            DescriptorKind::PortCcOpen | DescriptorKind::PortOpen => {
                return Err(CoreError::state(StateErrorKind::Unsupported))
            }
            _ => unreachable!("walk_pairs only emits open kinds here"),
        };
        if buf_start + len > src.len() || tel_start + len > telegram.len() {
            return Err(CoreError::state(StateErrorKind::BufferError));
        }
        telegram[tel_start..tel_start + len].copy_from_slice(&src[buf_start..buf_start + len]);
    }
    Ok(())
}

/// Scatters one incoming telegram's data bytes from `telegram` into the
/// typed sinks named by each pair's descriptor kind (§4.4 RX partition,
/// §4.5 start-phase RX step).
pub fn scatter_rx(pairs: &[DescriptorPair], telegram: &[u8], mem: &mut dyn DescriptorMemory) -> Result<(), CoreError> {
    for pair in pairs {
        let len = pair.byte_len() as usize;
        let tel_start = pair.open.telegram_offset as usize;
        let buf_start = pair.open.buffer_offset as usize;
        if tel_start + len > telegram.len() {
            return Err(CoreError::state(StateErrorKind::BufferError));
        }
        let chunk = &telegram[tel_start..tel_start + len];

        match pair.open.kind {
            DescriptorKind::SvcOpen => {
                let dst = mem.svc_mut();
                write_at(dst, buf_start, chunk)?;
            }
            DescriptorKind::RtOpen(b) => {
                let dst = mem.rt_mut(b);
                write_at(dst, buf_start, chunk)?;
            }
            DescriptorKind::RtCcOpen(b) => {
                // Mirror to both the RT sink and the TX RAM pass-through
                // (§4.4: "on RX mirror to both RX and TX RAM").
                let dst = mem.rt_mut(b);
                write_at(dst, buf_start, chunk)?;
                let tx = mem.tx_passthrough_mut();
                write_at(tx, tel_start, chunk)?;
            }
            DescriptorKind::PortOpen => {
                // Port-specific bytes write through to TX RAM for ring
                // forwarding (§4.4).
                let tx = mem.tx_passthrough_mut();
                write_at(tx, tel_start, chunk)?;
            }
            DescriptorKind::PortCcOpen => {
                let tx = mem.tx_passthrough_mut();
                write_at(tx, tel_start, chunk)?;
            }
            _ => unreachable!("walk_pairs only emits open kinds here"),
        }
    }
    Ok(())
}

fn write_at(dst: &mut [u8], offset: usize, chunk: &[u8]) -> Result<(), CoreError> {
    if offset + chunk.len() > dst.len() {
        return Err(CoreError::state(StateErrorKind::BufferError));
    }
    dst[offset..offset + chunk.len()].copy_from_slice(chunk);
    Ok(())
}
