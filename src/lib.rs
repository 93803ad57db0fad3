//! Channel-evaluation engine for an automotive power-distribution module:
//! a fixed set of typed, dependency-ordered channels (inputs, logic,
//! math, timers, tables, outputs) re-evaluated every tick and exposed to
//! a host over a framed wire protocol.
//!
//! - [`channel`] — the channel data model shared by every kind.
//! - [`kinds`] — each channel kind's configuration and `eval`.
//! - [`drivers`] — output driver physics: PROFET-style outputs and
//!   H-bridges, plus system-wide protection.
//! - [`registry`] — the channel table itself: config parsing, dependency
//!   ordering, and the per-tick scheduler.
//! - [`protocol`] — wire framing, commands, and telemetry packets.
//! - [`collaborators`] — the traits a host implements to supply ADC/GPIO/
//!   CAN access and a clock.
//! - [`error`] — the error types shared across all of the above.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod channel;
pub mod collaborators;
pub mod drivers;
pub mod error;
pub mod kinds;
pub mod protocol;
pub mod registry;

pub use channel::{Channel, ChannelConfig, ChannelFlags, ChannelKind};
pub use collaborators::Clock;
pub use error::{AccessError, ChannelError, ConfigError, ProtocolError};
pub use registry::Registry;
