//! Command taxonomy and the `ERROR`/`STATUS` frame payloads shared
//! by every command group.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    // System 0x0X
    Nop = 0x00,
    Ping = 0x01,
    Pong = 0x02,
    GetCaps = 0x03,
    CapsResp = 0x04,
    Reset = 0x05,
    Bootloader = 0x06,

    // Config 0x1X
    GetConfig = 0x10,
    ConfigData = 0x11,
    SetConfig = 0x12,
    ConfigAck = 0x13,
    SaveConfig = 0x14,
    LoadConfig = 0x15,
    ClearConfig = 0x16,

    // Telemetry 0x2X
    TelemStart = 0x20,
    TelemStop = 0x21,
    TelemData = 0x22,
    TelemConfig = 0x23,

    // Channel 0x3X
    ChGetValue = 0x30,
    ChSetValue = 0x31,
    ChValueResp = 0x32,
    ChGetInfo = 0x33,
    ChInfoResp = 0x34,
    ChGetList = 0x35,
    ChListResp = 0x36,

    // Debug 0x4X
    DebugConfig = 0x40,
    DebugMsg = 0x41,
    DebugVarGet = 0x42,
    DebugVarSet = 0x43,
    DebugVarResp = 0x44,

    // CAN 0x5X
    CanSend = 0x50,
    CanRecv = 0x51,
    CanConfig = 0x52,
    CanStatus = 0x53,

    // Firmware 0x6X
    FwBegin = 0x60,
    FwData = 0x61,
    FwEnd = 0x62,
    FwVerify = 0x63,
    FwStatus = 0x64,

    // Log 0x7X
    LogStart = 0x70,
    LogStop = 0x71,
    LogStatus = 0x72,
    LogGetData = 0x73,
    LogData = 0x74,
    LogClear = 0x75,

    Error = 0xF0,
    Status = 0xF1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ErrorKind {
    Ok = 0,
    UnknownCmd = 1,
    InvalidParam = 2,
    InvalidLength = 3,
    CrcMismatch = 4,
    BufferFull = 5,
    NotSupported = 6,
    Busy = 7,
    Timeout = 8,
    FlashError = 9,
    ChannelInvalid = 10,
    ConfigInvalid = 11,
    NotConnected = 12,
}

/// `{cmd_that_failed, kind, detail}`, the payload of an `ERROR` frame.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPayload {
    pub cmd_that_failed: u8,
    pub kind: ErrorKind,
    pub detail: u8,
}

impl ErrorPayload {
    pub fn to_bytes(&self) -> [u8; 3] {
        [self.cmd_that_failed, self.kind.into(), self.detail]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_u8() {
        let raw: u8 = Command::ChSetValue.into();
        assert_eq!(raw, 0x31);
        assert_eq!(Command::try_from(raw), Ok(Command::ChSetValue));
    }

    #[test]
    fn unknown_code_rejected() {
        assert!(Command::try_from(0x99u8).is_err());
    }

    #[test]
    fn error_payload_serializes() {
        let e = ErrorPayload { cmd_that_failed: 0x12, kind: ErrorKind::ConfigInvalid, detail: 7 };
        assert_eq!(e.to_bytes(), [0x12, 11, 7]);
    }
}
