//! Frame format (§6).
//!
//! Ethernet II framing: a 14-byte static header (DA/SA/EtherType), a
//! 2-byte dynamic tail (Sercos type + phase), a 4-byte CRC over those 16
//! bytes, then 40-1494 bytes of payload. `CrcSealer` (see `crc.rs`) caches
//! the 14 static bytes once per telegram slot and re-folds only the 2
//! dynamic bytes every cycle, the same "precompute the unchanging prefix"
//! shape as the teacher's virtqueue descriptor tables staying put while
//! only `used_idx`/`avail_idx` move each round.

use crate::crc::CrcSealer;
use crate::error::{CoreError, StateErrorKind};
use crate::limits::{EF_FIELD_LEN, HP_FIELD_LEN, MIN_TELEGRAM_LENGTH, SERC3_MAX_DATA_LENGTH};

/// Ethernet EtherType reserved for Sercos III real-time frames.
pub const ETHER_TYPE_SERCOS: u16 = 0x88CD;

pub type MacAddress = [u8; 6];

pub const BROADCAST_MAC: MacAddress = [0xFF; 6];

/// Static (14 B) + dynamic (2 B) + CRC (4 B).
pub const HEADER_LEN: usize = 20;

/// Which physical port a frame was sent on or received from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Primary,
    Secondary,
}

/// The one-byte Sercos type field: `{bit7=channel, bit6=MDT/AT,
/// bit5=cycle-count enable, bits1..0=telegram number}` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SercosType {
    pub channel: Channel,
    pub is_at: bool,
    pub cycle_count_enable: bool,
    pub tel_no: u8,
}

impl SercosType {
    pub fn encode(self) -> u8 {
        let mut byte = self.tel_no & 0b11;
        if self.cycle_count_enable {
            byte |= 1 << 5;
        }
        if self.is_at {
            byte |= 1 << 6;
        }
        if self.channel == Channel::Secondary {
            byte |= 1 << 7;
        }
        byte
    }

    pub fn decode(byte: u8) -> Self {
        Self {
            channel: if byte & (1 << 7) != 0 { Channel::Secondary } else { Channel::Primary },
            is_at: byte & (1 << 6) != 0,
            cycle_count_enable: byte & (1 << 5) != 0,
            tel_no: byte & 0b11,
        }
    }
}

/// The one-byte phase field: `{bit7=switching, bits3..0=phase}` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseByte {
    pub switching: bool,
    pub phase: u8,
}

impl PhaseByte {
    pub fn encode(self) -> u8 {
        let mut byte = self.phase & 0x0F;
        if self.switching {
            byte |= 1 << 7;
        }
        byte
    }

    pub fn decode(byte: u8) -> Self {
        Self {
            switching: byte & (1 << 7) != 0,
            phase: byte & 0x0F,
        }
    }

    /// Reads `PHASECR`'s low byte the way the prepare phase does (§4.5
    /// step 9: "phase field `PHASECR & 0xFF`").
    pub fn from_phasecr(phasecr: u32) -> Self {
        Self::decode((phasecr & 0xFF) as u8)
    }
}

/// Builds the 20-byte frame header, sealing it with `sealer`.
pub fn build_header(sa: MacAddress, sercos_type: SercosType, phase: PhaseByte, sealer: &CrcSealer) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0..6].copy_from_slice(&BROADCAST_MAC);
    header[6..12].copy_from_slice(&sa);
    header[12..14].copy_from_slice(&ETHER_TYPE_SERCOS.to_be_bytes());
    header[14] = sercos_type.encode();
    header[15] = phase.encode();
    let crc = sealer.reseal_dynamic(&header[14..16]);
    header[16..20].copy_from_slice(&crc.to_be_bytes());
    header
}

/// Builds a `CrcSealer` for a telegram slot's static prefix: DA, SA, and
/// EtherType never change once a slot is assigned, so this only needs to
/// run once per slot, not once per cycle.
pub fn sealer_for(sa: MacAddress) -> CrcSealer {
    let mut prefix = [0u8; 14];
    prefix[0..6].copy_from_slice(&BROADCAST_MAC);
    prefix[6..12].copy_from_slice(&sa);
    prefix[12..14].copy_from_slice(&ETHER_TYPE_SERCOS.to_be_bytes());
    CrcSealer::new(&prefix)
}

/// Validates a received frame's header CRC against the literal recompute
/// (§8: "CRC roundtrip"), independent of any cached sealer. CRC mismatches
/// are the caller's cue to drop the frame and bump `IPFCSERR` without
/// copying any payload bytes.
pub fn verify_header_crc(header: &[u8]) -> bool {
    if header.len() < HEADER_LEN {
        return false;
    }
    let expected = u32::from_be_bytes(header[16..20].try_into().expect("slice is exactly 4 bytes"));
    crate::crc::crc32(&header[0..16]) == expected
}

/// Checks a payload length against the legal telegram bounds (§6).
pub fn validate_payload_len(len: usize) -> Result<(), CoreError> {
    if len < MIN_TELEGRAM_LENGTH || len > SERC3_MAX_DATA_LENGTH {
        return Err(CoreError::state(StateErrorKind::BufferError));
    }
    Ok(())
}

/// Reads the hot-plug field, payload offset `0..HP_FIELD_LEN`. Only
/// meaningful in MDT0/AT0; callers are responsible for not reading it out
/// of other telegrams.
pub fn read_hotplug_field(payload: &[u8]) -> Result<[u8; HP_FIELD_LEN], CoreError> {
    payload
        .get(0..HP_FIELD_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CoreError::state(StateErrorKind::BufferError))
}

pub fn write_hotplug_field(payload: &mut [u8], field: [u8; HP_FIELD_LEN]) -> Result<(), CoreError> {
    let dst = payload
        .get_mut(0..HP_FIELD_LEN)
        .ok_or_else(|| CoreError::state(StateErrorKind::BufferError))?;
    dst.copy_from_slice(&field);
    Ok(())
}

/// Offset of the extended-function field within MDT0's payload (§6).
pub const EF_FIELD_OFFSET: usize = 8;

/// Which quarter of the Sercos time fragment the extended-function field
/// is carrying this cycle (§4.5 step 9: "four-cycle multiplexed `sec.hi,
/// sec.lo, ns.hi, ns.lo`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFragment {
    SecHi,
    SecLo,
    NsHi,
    NsLo,
}

impl TimeFragment {
    /// Which fragment a given producer cycle (mod 4) carries.
    pub fn for_cycle(cycle: u32) -> Self {
        match cycle % 4 {
            0 => Self::SecHi,
            1 => Self::SecLo,
            2 => Self::NsHi,
            _ => Self::NsLo,
        }
    }

    /// Extracts this fragment's 16 bits out of a `(sec, ns)` Sercos time pair.
    pub fn extract(self, sec: u32, ns: u32) -> u16 {
        match self {
            Self::SecHi => (sec >> 16) as u16,
            Self::SecLo => sec as u16,
            Self::NsHi => (ns >> 16) as u16,
            Self::NsLo => ns as u16,
        }
    }
}

/// The extended-function field: a TSref counter, a toggle bit, and the
/// current quarter of the multiplexed Sercos-time fragment, packed into
/// `EF_FIELD_LEN` bytes (§4.5 step 9, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedFunctionField {
    pub tsref: u8,
    pub toggle: bool,
    pub fragment: u16,
}

impl ExtendedFunctionField {
    pub fn encode(self) -> [u8; EF_FIELD_LEN] {
        let mut bytes = [0u8; EF_FIELD_LEN];
        bytes[0] = self.tsref;
        bytes[1] = self.toggle as u8;
        bytes[2..4].copy_from_slice(&self.fragment.to_be_bytes());
        bytes
    }

    pub fn decode(bytes: [u8; EF_FIELD_LEN]) -> Self {
        Self {
            tsref: bytes[0],
            toggle: bytes[1] != 0,
            fragment: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Builds the field for a given producer cycle, deriving which
    /// quarter of `(sec, ns)` to carry from `cycle % 4`.
    pub fn for_cycle(cycle: u32, tsref: u8, toggle: bool, sec: u32, ns: u32) -> Self {
        Self {
            tsref,
            toggle,
            fragment: TimeFragment::for_cycle(cycle).extract(sec, ns),
        }
    }
}

pub fn read_ef_field(payload: &[u8]) -> Result<ExtendedFunctionField, CoreError> {
    let bytes: [u8; EF_FIELD_LEN] = payload
        .get(EF_FIELD_OFFSET..EF_FIELD_OFFSET + EF_FIELD_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CoreError::state(StateErrorKind::BufferError))?;
    Ok(ExtendedFunctionField::decode(bytes))
}

pub fn write_ef_field(payload: &mut [u8], field: ExtendedFunctionField) -> Result<(), CoreError> {
    let dst = payload
        .get_mut(EF_FIELD_OFFSET..EF_FIELD_OFFSET + EF_FIELD_LEN)
        .ok_or_else(|| CoreError::state(StateErrorKind::BufferError))?;
    dst.copy_from_slice(&field.encode());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sercos_type_round_trip() {
        let ty = SercosType {
            channel: Channel::Secondary,
            is_at: true,
            cycle_count_enable: true,
            tel_no: 2,
        };
        assert_eq!(SercosType::decode(ty.encode()), ty);
    }

    #[test]
    fn phase_byte_round_trip() {
        let phase = PhaseByte { switching: true, phase: 4 };
        assert_eq!(PhaseByte::decode(phase.encode()), phase);
        assert_eq!(PhaseByte::from_phasecr(0x1234), PhaseByte::decode(0x34));
    }

    #[test]
    fn header_crc_matches_plain_recompute() {
        let sa = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
        let sealer = sealer_for(sa);
        let ty = SercosType {
            channel: Channel::Primary,
            is_at: false,
            cycle_count_enable: false,
            tel_no: 0,
        };
        let phase = PhaseByte { switching: false, phase: 4 };
        let header = build_header(sa, ty, phase, &sealer);
        assert!(verify_header_crc(&header));
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let sa = [0u8; 6];
        let sealer = sealer_for(sa);
        let ty = SercosType {
            channel: Channel::Primary,
            is_at: true,
            cycle_count_enable: false,
            tel_no: 0,
        };
        let phase = PhaseByte { switching: false, phase: 4 };
        let mut header = build_header(sa, ty, phase, &sealer);
        header[19] ^= 0xFF;
        assert!(!verify_header_crc(&header));
    }

    #[test]
    fn payload_bounds_enforced() {
        assert!(validate_payload_len(39).is_err());
        assert!(validate_payload_len(40).is_ok());
        assert!(validate_payload_len(1494).is_ok());
        assert!(validate_payload_len(1495).is_err());
    }

    #[test]
    fn hotplug_field_round_trip() {
        let mut payload = [0u8; 40];
        write_hotplug_field(&mut payload, [1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(read_hotplug_field(&payload).unwrap(), [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn extended_function_field_multiplexes_over_four_cycles() {
        let sec: u32 = 0x1122_3344;
        let ns: u32 = 0x5566_7788;
        let expected = [0x1122u16, 0x3344, 0x5566, 0x7788];
        for cycle in 0..4u32 {
            let field = ExtendedFunctionField::for_cycle(cycle, 7, cycle % 2 == 0, sec, ns);
            assert_eq!(field.fragment, expected[cycle as usize]);
            let mut payload = [0u8; 40];
            write_ef_field(&mut payload, field).unwrap();
            assert_eq!(read_ef_field(&payload).unwrap(), field);
        }
    }
}
