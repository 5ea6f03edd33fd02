//! Error and warning sum types.
//!
//! Grounded on the teacher's layered `VirtioError`/`PciError`/`VirtioNetError`
//! composition in `drivers/virtio/mod.rs`'s `error` submodule, reworked with
//! `thiserror` derives the way the pack's newer driver code favors derive
//! macros over hand-written `Display` impls.

use thiserror::Error;

/// Slave/connection coordinates of a configuration problem, when known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorLocation {
    pub slave_index: Option<u16>,
    pub connection_index: Option<u16>,
}

impl ErrorLocation {
    pub const fn none() -> Self {
        Self {
            slave_index: None,
            connection_index: None,
        }
    }

    pub const fn slave(slave_index: u16) -> Self {
        Self {
            slave_index: Some(slave_index),
            connection_index: None,
        }
    }

    pub const fn connection(slave_index: u16, connection_index: u16) -> Self {
        Self {
            slave_index: Some(slave_index),
            connection_index: Some(connection_index),
        }
    }
}

/// Plausibility-check and catalog-layout failures (§7.1).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    #[error("too many master connections for the configured system limits")]
    TooManyMasterConnections,
    #[error("connection number is not unique across all producers")]
    NoUniqueConnNbr,
    #[error("a slave attempted to produce in an MDT telegram")]
    SlaveProduceInMdt,
    #[error("the master attempted to produce in AT while master-produces-in-AT is disabled")]
    MasterProduceInAt,
    #[error("producer cycle time is not zero or a positive multiple of Tscyc")]
    ProdCycTimeInvalid,
    #[error("connection payload length is zero")]
    ConnectionLength0,
    #[error("connection/configuration/RT-bits index is out of range")]
    WrongConnectionIndex,
    #[error("referenced configuration entry was never configured")]
    ConfigurationNotConfigured,
    #[error("slave capability bitmap does not satisfy the connection's SCP requirement")]
    WrongScpCapConfiguration,
    #[error("Sercos cycle time is outside the legal range or not a whole number of bytes")]
    InvalidSercosCycleTime,
    #[error("master jitter bound is invalid (zero or exceeds the cycle time)")]
    InvalidMasterJitter,
    #[error("timing method is not one of MDT_AT_UCC, MDT_UCC_AT, MDT_UCC_AT_END")]
    IllegalTimingMethod,
    #[error("MDTs + ATs + UCC do not fit inside Tscyc")]
    TelLenGtTscyc,
    #[error("maximum network delay exceeds the allowed sync delay")]
    MaxTNetworkGtTSyncDelay,
    #[error("too many distinct producer cycle times (TSref bitmap would overflow)")]
    TooManyProducerCycletimes,
    #[error("connection is produced but has no consumer")]
    ConnectionNotConsumed,
    #[error("connection has a consumer but no producer")]
    ConnectionNotProduced,
    #[error("telegram number exceeded MAX_TEL while packing the MDT")]
    TelNbrMdtRtd,
    #[error("telegram number exceeded MAX_TEL while packing the AT")]
    TelNbrAtRtd,
}

/// Wrong-phase / resource-exhaustion / hardware-mismatch failures (§7.2).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StateErrorKind {
    #[error("operation is not valid in the current communication phase")]
    WrongPhase,
    #[error("event table violates the sorted-tail invariant")]
    EventTableInvalid,
    #[error("number of operational slaves exceeds the configured system limits")]
    TooManyOperSlaves,
    #[error("hardware SVC channel requested; this core only implements software SVC")]
    HwSvcError,
    #[error("buffering mode is not supported by this software controller emulation")]
    BufferError,
    #[error("requested behavior is not implemented by this core")]
    Unsupported,
}

/// Top-level error type returned by fallible core operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    #[error("configuration error at {location:?}: {kind}")]
    Config {
        kind: ConfigErrorKind,
        location: ErrorLocation,
    },
    #[error("state error: {0}")]
    State(StateErrorKind),
}

impl CoreError {
    pub const fn config(kind: ConfigErrorKind, location: ErrorLocation) -> Self {
        Self::Config { kind, location }
    }

    pub const fn state(kind: StateErrorKind) -> Self {
        Self::State(kind)
    }
}

/// Advisory conditions that do not abort the computation (§7.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The chosen IFG had to be clamped to the legacy default because a
    /// slave lacks the dynamic-IFG capability.
    WarningIfgMismatch,
    /// The UCC window forced the MTU to shrink below the configured value.
    WarnRecalculatedMTU { recalculated_mtu: u16 },
}

/// The useful value plus an optional advisory, mirroring the spec's
/// `{Ok(T), Warning(T, WarningKind), Err(ErrorKind)}` sum type (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Ok(T),
    Warning(T, WarningKind),
}

impl<T> Outcome<T> {
    /// Discards the warning, if any, and returns the value.
    pub fn into_value(self) -> T {
        match self {
            Outcome::Ok(v) => v,
            Outcome::Warning(v, _) => v,
        }
    }

    pub fn warning(&self) -> Option<WarningKind> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Warning(_, w) => Some(*w),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
