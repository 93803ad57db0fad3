//! Wire protocol and telemetry codec. Framing and CRC live in
//! [`frame`], the command taxonomy in [`commands`], and telemetry packet
//! assembly in [`telemetry`].

pub mod commands;
pub mod frame;
pub mod telemetry;
