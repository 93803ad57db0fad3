//! Error taxonomy for the three boundaries the engine crosses: configuration
//! apply, wire-frame parsing, and per-channel evaluation. Driver faults are
//! modeled as state, not `Result`s — see `drivers::DeviceFault`.

use thiserror::Error;

/// Longest back-edge chain [`ConfigError::Cycle`] can report. Cycles among
/// channel references are short in practice; this bounds the path without
/// needing to special-case deeper ones.
pub const MAX_CYCLE_PATH: usize = 8;

/// Failures from [`crate::registry::Registry::apply_config`]. Returned
/// synchronously; the registry is left untouched on every variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config header magic mismatch")]
    BadMagic,
    #[error("config major version not supported")]
    BadVersion,
    #[error("config CRC32 mismatch")]
    BadCrc,
    #[error("duplicate channel id {0}")]
    DuplicateId(u16),
    #[error("channel id {0} outside its kind's id range")]
    BadIdRange(u16),
    #[error("channel {0} references unresolved id {1}")]
    UnresolvedRef(u16, u16),
    #[error("dependency cycle: {0:?}")]
    Cycle(heapless::Vec<u16, MAX_CYCLE_PATH>),
    #[error("channel count {0} exceeds capacity {1}")]
    TooMany(u16, u16),
    #[error("declared total_size does not match payload length")]
    SizeMismatch,
}

/// Failures from the frame parser / builder, surfaced in an ERROR frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("declared frame length exceeds 1024 bytes")]
    InvalidLength,
    #[error("CRC16 mismatch")]
    CrcMismatch,
    #[error("unknown command code")]
    UnknownCmd,
    #[error("invalid parameter in payload")]
    InvalidParam,
    #[error("send ring buffer full")]
    BufferFull,
    #[error("request already in flight")]
    Busy,
    #[error("request timed out")]
    Timeout,
}

impl ProtocolError {
    /// Maps to the `kind` byte of the wire error payload.
    pub const fn wire_kind(self) -> u8 {
        match self {
            ProtocolError::InvalidLength => 0x03,
            ProtocolError::CrcMismatch => 0x04,
            ProtocolError::UnknownCmd => 0x01,
            ProtocolError::InvalidParam => 0x02,
            ProtocolError::BufferFull => 0x05,
            ProtocolError::Busy => 0x07,
            ProtocolError::Timeout => 0x08,
        }
    }
}

/// Per-channel runtime failures. Never propagated out of `tick`: the
/// channel's `fault` flag is set and a kind-defined safe value is written.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("divide by zero")]
    DivideByZero,
    #[error("value outside the channel's domain")]
    OutOfDomain,
    #[error("input channel is stale")]
    StaleInput,
    #[error("CAN-RX watchdog timeout")]
    TimeoutExpired,
    #[error("lookup table has no entries")]
    TableEmpty,
}

/// Errors from `Registry::get_value`/`set_value`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("channel is read-only")]
    ReadOnly,
    #[error("no channel with that id")]
    NotFound,
    #[error("value outside the channel's domain")]
    OutOfDomain,
}
