//! Binary configuration record: header, a fixed-size `ChannelEntry`
//! array, an interned string table for names/units, and a trailing blob
//! region for each kind's variable-length parameters (calibration
//! points, table axes, CAN-TX signal lists, enum labels).
//!
//! The string table is `count`, then per-string offsets, then
//! null-terminated UTF-8 bytes. Each kind's variable data is written
//! once in the param blob region, referenced by `(param_offset,
//! param_len)` from its entry, using the same manual-byte-packing
//! idiom generalized across every kind (see DESIGN.md).

use heapless::Vec;
use packed_struct::prelude::*;

use crate::channel::{Channel, ChannelConfig, ChannelFlags, ChannelKind, DataType, Display, HwBinding, HwDevice};
use crate::drivers::hbridge::HBridgeCfg;
use crate::drivers::power_output::PowerOutputCfg;
use crate::error::ConfigError;
use crate::kinds::analog_input::{AnalogInputCfg, AnalogInputMode, CalPoint};
use crate::kinds::can_rx::{ByteOrder, CanRxCfg, TimeoutPolicy, ValueType};
use crate::kinds::can_tx::{CanTxCfg, TxSignal};
use crate::kinds::digital_input::{DigitalInputCfg, DigitalInputMode, Pull};
use crate::kinds::enum_ch::{EnumCfg, EnumLabel, MAX_LABEL_LEN};
use crate::kinds::filter::{FilterCfg, FilterKind};
use crate::kinds::frequency_input::FrequencyInputCfg;
use crate::kinds::logic::{LogicCfg, LogicOp};
use crate::kinds::number::{LookupPoint, NumberCfg, NumberOp};
use crate::kinds::pid::PidCfg;
use crate::kinds::switch::{RestorePolicy, SwitchCfg, SwitchType};
use crate::kinds::system_ro::{SystemRoCfg, SystemSignal};
use crate::kinds::table::{Table2DCfg, Table3DCfg};
use crate::kinds::timer::{TimerCfg, TimerMode};

pub const MAGIC: u32 = 0x5043_4647;
pub const VERSION: u16 = 2;
pub const HEADER_SIZE: usize = 20;
pub const ENTRY_SIZE: usize = 20;

pub const MAX_CHANNELS: usize = crate::registry::MAX_CHANNELS;
pub const MAX_STRINGS: usize = MAX_CHANNELS * 2;
pub const STRING_BYTES_CAP: usize = MAX_STRINGS * 16;
pub const PARAM_BLOB_CAP: usize = MAX_CHANNELS * 96;

/// CRC-32/ISO-HDLC (poly 0xEDB88320 reflected, init/xorout 0xFFFFFFFF),
/// computed bitwise rather than via a lookup table, matching the CRC16
/// framing codec's no-table style (`protocol::frame::crc16_ccitt`).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}

#[derive(PackedStruct, Debug, Clone, Copy)]
#[packed_struct(endian = "lsb")]
struct Header {
    magic: u32,
    version: u16,
    device_type: u8,
    _reserved: u8,
    total_size: u32,
    crc32: u32,
    channel_count: u16,
    flags: u16,
}

impl Header {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        self.pack().expect("Header is plain byte-aligned fields")
    }

    fn from_bytes(buf: &[u8]) -> Result<Self, ConfigError> {
        if buf.len() < HEADER_SIZE {
            return Err(ConfigError::SizeMismatch);
        }
        let arr: [u8; HEADER_SIZE] = buf[..HEADER_SIZE].try_into().unwrap();
        let header = Header::unpack(&arr).map_err(|_| ConfigError::SizeMismatch)?;
        if header.magic != MAGIC {
            return Err(ConfigError::BadMagic);
        }
        if header.version != VERSION {
            return Err(ConfigError::BadVersion);
        }
        Ok(header)
    }
}

/// A parsed, not-yet-validated channel: the registry checks uniqueness,
/// id range, and acyclicity after every entry has been decoded.
pub struct ParsedChannel {
    pub id: u16,
    pub name: heapless::String<{ crate::channel::MAX_NAME_LEN }>,
    pub flags: ChannelFlags,
    pub display: Display,
    pub hw_binding: Option<HwBinding>,
    pub config: ChannelConfig,
}

/// Builds a binary configuration record from in-memory channels, the
/// inverse of [`parse`]. Used by the host configurator's emulator path
/// and by this crate's own round-trip tests.
pub struct ConfigBuilder {
    device_type: u8,
    flags: u16,
    entries: Vec<[u8; ENTRY_SIZE], MAX_CHANNELS>,
    strings: Vec<heapless::String<32>, MAX_STRINGS>,
    param_blob: Vec<u8, PARAM_BLOB_CAP>,
}

impl ConfigBuilder {
    pub fn new(device_type: u8) -> Self {
        Self {
            device_type,
            flags: 0,
            entries: Vec::new(),
            strings: Vec::new(),
            param_blob: Vec::new(),
        }
    }

    fn intern(&mut self, s: &str) -> u16 {
        if let Some(pos) = self.strings.iter().position(|x| x.as_str() == s) {
            return pos as u16;
        }
        let mut owned = heapless::String::new();
        let _ = owned.push_str(s);
        let idx = self.strings.len() as u16;
        let _ = self.strings.push(owned);
        idx
    }

    pub fn push(&mut self, ch: &ParsedChannel) -> Result<(), ConfigError> {
        let name_idx = self.intern(ch.name.as_str());
        let unit_idx = self.intern(ch.display.unit.as_str());

        let param_offset = self.param_blob.len() as u16;
        kind_codec::encode(&ch.config, &mut self.param_blob);
        let param_len = (self.param_blob.len() as u16).wrapping_sub(param_offset);

        let hw = ch.hw_binding.unwrap_or(HwBinding { device: HwDevice::None, index: 0 });

        let mut entry = [0u8; ENTRY_SIZE];
        entry[0..2].copy_from_slice(&ch.id.to_le_bytes());
        entry[2] = ch.config.kind().into();
        entry[3] = ch.flags.0;
        entry[4] = hw.device.into();
        entry[5] = hw.index;
        entry[6] = ch.display.decimal_places;
        entry[7] = ch.display.data_type as u8;
        entry[8..10].copy_from_slice(&name_idx.to_le_bytes());
        entry[10..12].copy_from_slice(&unit_idx.to_le_bytes());
        entry[12..14].copy_from_slice(&param_offset.to_le_bytes());
        entry[14..16].copy_from_slice(&param_len.to_le_bytes());

        self.entries.push(entry).map_err(|_| ConfigError::TooMany(self.entries.len() as u16, MAX_CHANNELS as u16))
    }

    /// Serializes the whole record, computing `total_size` and `crc32`.
    pub fn build(&self) -> Vec<u8, { HEADER_SIZE + MAX_CHANNELS * ENTRY_SIZE + STRING_BYTES_CAP + PARAM_BLOB_CAP }> {
        let mut body: Vec<u8, { MAX_CHANNELS * ENTRY_SIZE + STRING_BYTES_CAP + PARAM_BLOB_CAP }> = Vec::new();
        for entry in &self.entries {
            let _ = body.extend_from_slice(entry);
        }

        let count = self.strings.len() as u16;
        let _ = body.extend_from_slice(&count.to_le_bytes());
        let mut string_bytes: Vec<u8, STRING_BYTES_CAP> = Vec::new();
        let mut offsets: Vec<u16, MAX_STRINGS> = Vec::new();
        for s in &self.strings {
            offsets.push(string_bytes.len() as u16).ok();
            let _ = string_bytes.extend_from_slice(s.as_bytes());
            let _ = string_bytes.push(0);
        }
        for off in &offsets {
            let _ = body.extend_from_slice(&off.to_le_bytes());
        }
        let _ = body.extend_from_slice(&string_bytes);

        let _ = body.extend_from_slice(&self.param_blob);

        let total_size = (HEADER_SIZE + body.len()) as u32;
        let crc = crc32(&body);
        let header = Header {
            magic: MAGIC,
            version: VERSION,
            device_type: self.device_type,
            _reserved: 0,
            total_size,
            crc32: crc,
            channel_count: self.entries.len() as u16,
            flags: self.flags,
        };

        let mut out = Vec::new();
        let _ = out.extend_from_slice(&header.to_bytes());
        let _ = out.extend_from_slice(&body);
        out
    }
}

/// Parses and validates a binary configuration record's framing (magic,
/// version, CRC, size), decoding every entry. Does not check cross-channel
/// invariants (duplicate ids, id ranges, reference cycles) -- the caller
/// (`Registry::apply_config`) does that once the whole table is in hand.
pub fn parse(bytes: &[u8]) -> Result<Vec<ParsedChannel, MAX_CHANNELS>, ConfigError> {
    let header = Header::from_bytes(bytes)?;
    if bytes.len() != header.total_size as usize {
        return Err(ConfigError::SizeMismatch);
    }
    let body = &bytes[HEADER_SIZE..];
    if crc32(body) != header.crc32 {
        return Err(ConfigError::BadCrc);
    }
    if header.channel_count as usize > MAX_CHANNELS {
        return Err(ConfigError::TooMany(header.channel_count, MAX_CHANNELS as u16));
    }

    let entries_size = header.channel_count as usize * ENTRY_SIZE;
    if body.len() < entries_size + 2 {
        return Err(ConfigError::SizeMismatch);
    }
    let entries = &body[..entries_size];
    let mut cursor = entries_size;

    let str_count = u16::from_le_bytes(body[cursor..cursor + 2].try_into().unwrap()) as usize;
    cursor += 2;
    let offsets_size = str_count * 2;
    if body.len() < cursor + offsets_size {
        return Err(ConfigError::SizeMismatch);
    }
    let offsets_bytes = &body[cursor..cursor + offsets_size];
    cursor += offsets_size;

    // The string bytes run until the next null past the last string's
    // start; rather than re-deriving that boundary, each string is read
    // directly off `cursor + offset` and scanned for its own terminator.
    let string_region = &body[cursor..];

    let read_string = |idx: u16| -> heapless::String<{ crate::channel::MAX_NAME_LEN }> {
        let mut out = heapless::String::new();
        if (idx as usize) >= str_count {
            return out;
        }
        let off = u16::from_le_bytes([offsets_bytes[idx as usize * 2], offsets_bytes[idx as usize * 2 + 1]]) as usize;
        if off >= string_region.len() {
            return out;
        }
        let end = string_region[off..].iter().position(|&b| b == 0).map(|p| off + p).unwrap_or(string_region.len());
        if let Ok(s) = core::str::from_utf8(&string_region[off..end]) {
            let _ = out.push_str(s);
        }
        out
    };

    // Param blob starts after the last string's terminator; since strings
    // are written back-to-back with no gaps, its start is the total
    // string-bytes length, which the builder doesn't store explicitly.
    // We instead locate it as `string_region` offset by scanning past
    // `str_count` null terminators from the start.
    let mut param_region_start = 0usize;
    let mut seen = 0usize;
    for (i, &b) in string_region.iter().enumerate() {
        if b == 0 {
            seen += 1;
            if seen == str_count {
                param_region_start = i + 1;
                break;
            }
        }
    }
    if str_count == 0 {
        param_region_start = 0;
    }
    let param_blob = &string_region[param_region_start.min(string_region.len())..];

    let mut out: Vec<ParsedChannel, MAX_CHANNELS> = Vec::new();
    for i in 0..header.channel_count as usize {
        let e = &entries[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE];
        let id = u16::from_le_bytes([e[0], e[1]]);
        let kind = ChannelKind::try_from(e[2]).map_err(|_| ConfigError::BadIdRange(id))?;
        let flags = ChannelFlags(e[3]);
        let hw_device = HwDevice::try_from(e[4]).unwrap_or(HwDevice::None);
        let hw_index = e[5];
        let decimal_places = e[6];
        let data_type = match e[7] {
            1 => DataType::Bool,
            2 => DataType::U16,
            _ => DataType::I32,
        };
        let name_idx = u16::from_le_bytes([e[8], e[9]]);
        let unit_idx = u16::from_le_bytes([e[10], e[11]]);
        let param_offset = u16::from_le_bytes([e[12], e[13]]) as usize;
        let param_len = u16::from_le_bytes([e[14], e[15]]) as usize;

        if param_offset + param_len > param_blob.len() {
            return Err(ConfigError::SizeMismatch);
        }
        let params = &param_blob[param_offset..param_offset + param_len];
        let config = kind_codec::decode(kind, params)?;

        let hw_binding = if hw_device == HwDevice::None { None } else { Some(HwBinding { device: hw_device, index: hw_index }) };

        let mut display = Display { decimal_places, data_type, unit: heapless::String::new() };
        let unit_str = read_string(unit_idx);
        let _ = display.unit.push_str(unit_str.as_str());

        let _ = out.push(ParsedChannel {
            id,
            name: read_string(name_idx),
            flags,
            display,
            hw_binding,
            config,
        });
    }

    Ok(out)
}

/// Instantiates a fresh [`Channel`] from a parsed entry, applied at
/// config-apply time once all invariants hold.
pub fn instantiate(parsed: ParsedChannel, now_ms: u64) -> Channel {
    Channel {
        id: parsed.id,
        name: parsed.name,
        flags: parsed.flags,
        display: parsed.display,
        hw_binding: parsed.hw_binding,
        config: parsed.config,
        value: 0,
        prev_value: 0,
        timestamp_ms: now_ms,
        stale_since_ms: now_ms,
    }
}

mod kind_codec {
    use super::*;

    fn put_u16(buf: &mut Vec<u8, PARAM_BLOB_CAP>, v: u16) {
        let _ = buf.extend_from_slice(&v.to_le_bytes());
    }
    fn put_u32(buf: &mut Vec<u8, PARAM_BLOB_CAP>, v: u32) {
        let _ = buf.extend_from_slice(&v.to_le_bytes());
    }
    fn put_i32(buf: &mut Vec<u8, PARAM_BLOB_CAP>, v: i32) {
        let _ = buf.extend_from_slice(&v.to_le_bytes());
    }
    fn put_f32(buf: &mut Vec<u8, PARAM_BLOB_CAP>, v: f32) {
        let _ = buf.extend_from_slice(&v.to_le_bytes());
    }
    fn put_u8(buf: &mut Vec<u8, PARAM_BLOB_CAP>, v: u8) {
        let _ = buf.push(v);
    }

    struct Reader<'a> {
        buf: &'a [u8],
        pos: usize,
    }

    impl<'a> Reader<'a> {
        fn new(buf: &'a [u8]) -> Self {
            Self { buf, pos: 0 }
        }
        fn u8(&mut self) -> u8 {
            let v = *self.buf.get(self.pos).unwrap_or(&0);
            self.pos += 1;
            v
        }
        fn u16(&mut self) -> u16 {
            let v = u16::from_le_bytes([*self.buf.get(self.pos).unwrap_or(&0), *self.buf.get(self.pos + 1).unwrap_or(&0)]);
            self.pos += 2;
            v
        }
        fn u32(&mut self) -> u32 {
            let b = [0, 1, 2, 3].map(|i| *self.buf.get(self.pos + i).unwrap_or(&0));
            self.pos += 4;
            u32::from_le_bytes(b)
        }
        fn i32(&mut self) -> i32 {
            self.u32() as i32
        }
        fn f32(&mut self) -> f32 {
            f32::from_bits(self.u32())
        }
        fn bool(&mut self) -> bool {
            self.u8() != 0
        }
    }

    pub fn encode(cfg: &ChannelConfig, buf: &mut Vec<u8, PARAM_BLOB_CAP>) {
        match cfg {
            ChannelConfig::DigitalInput(c) => {
                put_u8(buf, c.mode as u8);
                put_u8(buf, c.pin);
                put_u8(buf, c.pullup as u8);
                put_u32(buf, c.debounce_ms);
                put_u16(buf, c.threshold_voltage_mv);
                put_u16(buf, c.teeth);
                put_u32(buf, c.mult);
                put_u32(buf, c.div);
            }
            ChannelConfig::AnalogInput(c) => {
                put_u8(buf, c.pin);
                put_u8(buf, c.pull as u8);
                match &c.mode {
                    AnalogInputMode::Linear { min_mv, max_mv, min_value, max_value } => {
                        put_u8(buf, 0);
                        put_u16(buf, *min_mv);
                        put_u16(buf, *max_mv);
                        put_i32(buf, *min_value);
                        put_i32(buf, *max_value);
                    }
                    AnalogInputMode::Calibrated { points } => {
                        put_u8(buf, 1);
                        put_u8(buf, points.len() as u8);
                        for p in points {
                            put_u16(buf, p.mv);
                            put_i32(buf, p.value);
                        }
                    }
                    AnalogInputMode::Rotary { positions, vref_mv, debounce_ms } => {
                        put_u8(buf, 2);
                        put_u16(buf, *positions);
                        put_u16(buf, *vref_mv);
                        put_u32(buf, *debounce_ms);
                    }
                    AnalogInputMode::Switch { threshold_high_mv, threshold_low_mv, on_hold_ms, off_hold_ms } => {
                        put_u8(buf, 3);
                        put_u16(buf, *threshold_high_mv);
                        put_u16(buf, *threshold_low_mv);
                        put_u32(buf, *on_hold_ms);
                        put_u32(buf, *off_hold_ms);
                    }
                }
            }
            ChannelConfig::FrequencyInput(c) => {
                put_u8(buf, c.pin);
                put_u32(buf, c.mult);
                put_u32(buf, c.div);
                put_u32(buf, c.timeout_ms);
            }
            ChannelConfig::CanRx(c) => {
                put_u8(buf, c.bus);
                put_u32(buf, c.message_id);
                put_u8(buf, c.is_extended as u8);
                put_u16(buf, c.start_bit);
                put_u8(buf, c.length);
                put_u8(buf, c.byte_order as u8);
                put_u8(buf, c.value_type as u8);
                put_i32(buf, c.multiplier);
                put_i32(buf, c.divider);
                put_i32(buf, c.offset);
                put_u32(buf, c.timeout_ms);
                match c.timeout_policy {
                    TimeoutPolicy::HoldPrevious => {
                        put_u8(buf, 0);
                        put_i32(buf, 0);
                    }
                    TimeoutPolicy::SetValue(v) => {
                        put_u8(buf, 1);
                        put_i32(buf, v);
                    }
                }
            }
            ChannelConfig::PowerOutput(c) => {
                put_u16(buf, c.source_id);
                put_u16(buf, c.duty_source_id);
                put_u8(buf, c.pwm_enabled as u8);
                put_u32(buf, c.pwm_frequency_hz);
                put_u32(buf, c.soft_start_ms);
                put_u32(buf, c.inrush_current_mult_milli);
                put_u32(buf, c.inrush_time_ms);
                put_u32(buf, c.current_limit_ma);
                put_u32(buf, c.open_load_threshold_ma);
                put_u8(buf, c.retry_count);
                put_u32(buf, c.retry_delay_ms);
                put_u32(buf, c.r_load_ohm_milli);
                put_u32(buf, c.r_sense_ohm_milli);
                put_u8(buf, c.auto_fault_enabled as u8);
                put_f32(buf, c.r_th_c_per_w);
                put_f32(buf, c.c_th_j_per_c);
                put_f32(buf, c.t_amb_c);
            }
            ChannelConfig::HBridge(c) => {
                put_u16(buf, c.mode_source_id);
                put_u16(buf, c.duty_source_id);
                put_u16(buf, c.target_source_id);
                put_u32(buf, c.v_bus_mv);
                put_u32(buf, c.r_m_ohm_milli);
                put_u32(buf, c.l_m_h_micro);
                put_f32(buf, c.k_t_mnm_per_a);
                put_f32(buf, c.k_e_v_per_rad_s);
                put_f32(buf, c.j_m_kg_m2);
                put_f32(buf, c.j_l_kg_m2);
                put_f32(buf, c.gear_ratio);
                put_f32(buf, c.b_friction);
                put_f32(buf, c.t_coulomb);
                put_f32(buf, c.v_stic_rad_s);
                put_f32(buf, c.theta_min);
                put_f32(buf, c.theta_max);
                put_f32(buf, c.k_es);
                put_f32(buf, c.r_th_c_per_w);
                put_f32(buf, c.c_th_j_per_c);
                put_f32(buf, c.t_amb_c);
                put_u32(buf, c.stall_ms);
            }
            ChannelConfig::CanTx(c) => {
                put_u8(buf, c.bus);
                put_u32(buf, c.message_id);
                put_u32(buf, c.cycle_ms);
                put_u8(buf, c.dlc);
                put_u8(buf, c.is_extended as u8);
                put_u8(buf, c.is_fd as u8);
                put_u8(buf, c.signals.len() as u8);
                for s in &c.signals {
                    put_u16(buf, s.source_id);
                    put_u16(buf, s.start_bit);
                    put_u8(buf, s.length);
                    put_u8(buf, s.byte_order as u8);
                    put_i32(buf, s.multiplier);
                }
            }
            ChannelConfig::Logic(c) => {
                put_u8(buf, c.op as u8);
                put_u16(buf, c.source_a);
                put_u16(buf, c.source_b);
                put_i32(buf, c.compare_value);
                put_i32(buf, c.range_high);
                put_i32(buf, c.upper);
                put_i32(buf, c.lower);
                put_u32(buf, c.pulse_ms);
                put_u32(buf, c.flash_on_ms);
                put_u32(buf, c.flash_off_ms);
                put_u32(buf, c.true_delay_ms);
                put_u32(buf, c.false_delay_ms);
            }
            ChannelConfig::Number(c) => {
                put_u8(buf, c.op as u8);
                put_u16(buf, c.source_a);
                put_u16(buf, c.source_b);
                put_u16(buf, c.cond_source);
                put_i32(buf, c.constant);
                put_i32(buf, c.scale_mult);
                put_i32(buf, c.scale_div);
                put_i32(buf, c.clamp_lo);
                put_i32(buf, c.clamp_hi);
                put_u8(buf, c.lookup.len() as u8);
                for p in &c.lookup {
                    put_i32(buf, p.input);
                    put_i32(buf, p.output);
                }
            }
            ChannelConfig::Filter(c) => {
                put_u8(buf, c.kind as u8);
                put_u16(buf, c.source_id);
                put_u16(buf, c.window as u16);
                put_u32(buf, c.tau_ms);
            }
            ChannelConfig::Timer(c) => {
                put_u8(buf, c.mode as u8);
                put_u16(buf, c.start_id);
                put_u16(buf, c.stop_id);
                put_u16(buf, c.reset_id);
                put_u32(buf, c.target_ms);
            }
            ChannelConfig::Table2D(c) => {
                put_u16(buf, c.source_id);
                put_u8(buf, c.x.len() as u8);
                for v in &c.x {
                    put_i32(buf, *v);
                }
                for v in &c.y {
                    put_i32(buf, *v);
                }
            }
            ChannelConfig::Table3D(c) => {
                put_u16(buf, c.source_x);
                put_u16(buf, c.source_y);
                put_u8(buf, c.x_axis.len() as u8);
                put_u8(buf, c.y_axis.len() as u8);
                for v in &c.x_axis {
                    put_i32(buf, *v);
                }
                for v in &c.y_axis {
                    put_i32(buf, *v);
                }
                for v in &c.z {
                    put_i32(buf, *v);
                }
            }
            ChannelConfig::Switch(c) => {
                put_u8(buf, c.switch_type as u8);
                put_u16(buf, c.input_up);
                put_u16(buf, c.input_down);
                put_u8(buf, c.positions);
                put_u8(buf, c.restore as u8);
                put_u8(buf, c.default_position);
                put_u32(buf, c.hold_ms);
            }
            ChannelConfig::Enum(c) => {
                put_u16(buf, c.source_id);
                put_u8(buf, c.writable as u8);
                put_u8(buf, c.labels.len() as u8);
                for l in &c.labels {
                    put_i32(buf, l.value);
                    put_u8(buf, l.label.len() as u8);
                    let _ = buf.extend_from_slice(l.label.as_bytes());
                }
            }
            ChannelConfig::Pid(c) => {
                put_u16(buf, c.pv_id);
                put_u16(buf, c.setpoint_id);
                put_i32(buf, c.k_p);
                put_i32(buf, c.k_i);
                put_i32(buf, c.k_d);
                put_i32(buf, c.gain_scale);
                put_i32(buf, c.out_min);
                put_i32(buf, c.out_max);
            }
            ChannelConfig::SystemReadOnly(c) => {
                let (tag, hw): (u8, u8) = match c.signal {
                    SystemSignal::BatteryVoltageMv => (0, 0),
                    SystemSignal::BoardTempMdegC => (1, 0),
                    SystemSignal::UptimeMs => (2, 0),
                    SystemSignal::OutputCurrentMa { hw_index } => (3, hw_index),
                    SystemSignal::OutputDutyPct { hw_index } => (4, hw_index),
                    SystemSignal::InputRawMv { hw_index } => (5, hw_index),
                    SystemSignal::FaultCount => (6, 0),
                    SystemSignal::ConfigVersion => (7, 0),
                };
                put_u8(buf, tag);
                put_u8(buf, hw);
            }
        }
    }

    pub fn decode(kind: ChannelKind, bytes: &[u8]) -> Result<ChannelConfig, ConfigError> {
        let mut r = Reader::new(bytes);
        Ok(match kind {
            ChannelKind::DigitalInput => {
                let mode = match r.u8() {
                    1 => DigitalInputMode::SwitchActiveHigh,
                    2 => DigitalInputMode::Frequency,
                    3 => DigitalInputMode::Rpm,
                    _ => DigitalInputMode::SwitchActiveLow,
                };
                let pin = r.u8();
                let mut cfg = DigitalInputCfg::new(mode, pin);
                cfg.pullup = match r.u8() {
                    1 => Pull::Down1M,
                    2 => Pull::Up10k,
                    3 => Pull::Down10k,
                    4 => Pull::Up100k,
                    5 => Pull::Down100k,
                    _ => Pull::None,
                };
                cfg.debounce_ms = r.u32();
                cfg.threshold_voltage_mv = r.u16();
                cfg.teeth = r.u16();
                cfg.mult = r.u32();
                cfg.div = r.u32();
                ChannelConfig::DigitalInput(cfg)
            }
            ChannelKind::AnalogInput => {
                let pin = r.u8();
                let pull = match r.u8() {
                    1 => Pull::Down1M,
                    2 => Pull::Up10k,
                    3 => Pull::Down10k,
                    4 => Pull::Up100k,
                    5 => Pull::Down100k,
                    _ => Pull::None,
                };
                let tag = r.u8();
                let mode = match tag {
                    1 => {
                        let n = r.u8();
                        let mut points: Vec<CalPoint, { crate::kinds::analog_input::MAX_CAL_POINTS }> = Vec::new();
                        for _ in 0..n {
                            let mv = r.u16();
                            let value = r.i32();
                            let _ = points.push(CalPoint { mv, value });
                        }
                        AnalogInputMode::Calibrated { points }
                    }
                    2 => AnalogInputMode::Rotary { positions: r.u16(), vref_mv: r.u16(), debounce_ms: r.u32() },
                    3 => AnalogInputMode::Switch {
                        threshold_high_mv: r.u16(),
                        threshold_low_mv: r.u16(),
                        on_hold_ms: r.u32(),
                        off_hold_ms: r.u32(),
                    },
                    _ => AnalogInputMode::Linear { min_mv: r.u16(), max_mv: r.u16(), min_value: r.i32(), max_value: r.i32() },
                };
                let mut cfg = AnalogInputCfg::new(mode, pin);
                cfg.pull = pull;
                ChannelConfig::AnalogInput(cfg)
            }
            ChannelKind::FrequencyInput => {
                let pin = r.u8();
                let mut cfg = FrequencyInputCfg::new(pin);
                cfg.mult = r.u32();
                cfg.div = r.u32();
                cfg.timeout_ms = r.u32();
                ChannelConfig::FrequencyInput(cfg)
            }
            ChannelKind::CanRx => {
                let bus = r.u8();
                let message_id = r.u32();
                let mut cfg = CanRxCfg::new(bus, message_id);
                cfg.is_extended = r.bool();
                cfg.start_bit = r.u16();
                cfg.length = r.u8();
                cfg.byte_order = match r.u8() {
                    1 => ByteOrder::Be,
                    _ => ByteOrder::Le,
                };
                cfg.value_type = match r.u8() {
                    1 => ValueType::I,
                    2 => ValueType::F,
                    _ => ValueType::U,
                };
                cfg.multiplier = r.i32();
                cfg.divider = r.i32();
                cfg.offset = r.i32();
                cfg.timeout_ms = r.u32();
                let policy_tag = r.u8();
                let policy_value = r.i32();
                cfg.timeout_policy = if policy_tag == 1 { TimeoutPolicy::SetValue(policy_value) } else { TimeoutPolicy::HoldPrevious };
                ChannelConfig::CanRx(cfg)
            }
            ChannelKind::PowerOutput => {
                let mut cfg = PowerOutputCfg::new();
                cfg.source_id = r.u16();
                cfg.duty_source_id = r.u16();
                cfg.pwm_enabled = r.bool();
                cfg.pwm_frequency_hz = r.u32();
                cfg.soft_start_ms = r.u32();
                cfg.inrush_current_mult_milli = r.u32();
                cfg.inrush_time_ms = r.u32();
                cfg.current_limit_ma = r.u32();
                cfg.open_load_threshold_ma = r.u32();
                cfg.retry_count = r.u8();
                cfg.retry_delay_ms = r.u32();
                cfg.r_load_ohm_milli = r.u32();
                cfg.r_sense_ohm_milli = r.u32();
                cfg.auto_fault_enabled = r.bool();
                cfg.r_th_c_per_w = r.f32();
                cfg.c_th_j_per_c = r.f32();
                cfg.t_amb_c = r.f32();
                ChannelConfig::PowerOutput(cfg)
            }
            ChannelKind::HBridge => {
                let mut cfg = HBridgeCfg::new();
                cfg.mode_source_id = r.u16();
                cfg.duty_source_id = r.u16();
                cfg.target_source_id = r.u16();
                cfg.v_bus_mv = r.u32();
                cfg.r_m_ohm_milli = r.u32();
                cfg.l_m_h_micro = r.u32();
                cfg.k_t_mnm_per_a = r.f32();
                cfg.k_e_v_per_rad_s = r.f32();
                cfg.j_m_kg_m2 = r.f32();
                cfg.j_l_kg_m2 = r.f32();
                cfg.gear_ratio = r.f32();
                cfg.b_friction = r.f32();
                cfg.t_coulomb = r.f32();
                cfg.v_stic_rad_s = r.f32();
                cfg.theta_min = r.f32();
                cfg.theta_max = r.f32();
                cfg.k_es = r.f32();
                cfg.r_th_c_per_w = r.f32();
                cfg.c_th_j_per_c = r.f32();
                cfg.t_amb_c = r.f32();
                cfg.stall_ms = r.u32();
                ChannelConfig::HBridge(cfg)
            }
            ChannelKind::CanTx => {
                let bus = r.u8();
                let message_id = r.u32();
                let cycle_ms = r.u32();
                let dlc = r.u8();
                let mut cfg = CanTxCfg::new(bus, message_id, cycle_ms, dlc);
                cfg.is_extended = r.bool();
                cfg.is_fd = r.bool();
                let n = r.u8();
                for _ in 0..n {
                    let source_id = r.u16();
                    let start_bit = r.u16();
                    let length = r.u8();
                    let byte_order = match r.u8() {
                        1 => ByteOrder::Be,
                        _ => ByteOrder::Le,
                    };
                    let multiplier = r.i32();
                    let _ = cfg.signals.push(TxSignal { source_id, start_bit, length, byte_order, multiplier });
                }
                ChannelConfig::CanTx(cfg)
            }
            ChannelKind::Logic => {
                let op = logic_op_from_u8(r.u8());
                let mut cfg = LogicCfg::new(op);
                cfg.source_a = r.u16();
                cfg.source_b = r.u16();
                cfg.compare_value = r.i32();
                cfg.range_high = r.i32();
                cfg.upper = r.i32();
                cfg.lower = r.i32();
                cfg.pulse_ms = r.u32();
                cfg.flash_on_ms = r.u32();
                cfg.flash_off_ms = r.u32();
                cfg.true_delay_ms = r.u32();
                cfg.false_delay_ms = r.u32();
                ChannelConfig::Logic(cfg)
            }
            ChannelKind::Number => {
                let op = number_op_from_u8(r.u8());
                let mut cfg = NumberCfg::new(op);
                cfg.source_a = r.u16();
                cfg.source_b = r.u16();
                cfg.cond_source = r.u16();
                cfg.constant = r.i32();
                cfg.scale_mult = r.i32();
                cfg.scale_div = r.i32();
                cfg.clamp_lo = r.i32();
                cfg.clamp_hi = r.i32();
                let n = r.u8();
                for _ in 0..n {
                    let input = r.i32();
                    let output = r.i32();
                    let _ = cfg.lookup.push(LookupPoint { input, output });
                }
                ChannelConfig::Number(cfg)
            }
            ChannelKind::Filter => {
                let kind = match r.u8() {
                    1 => FilterKind::LowPass,
                    2 => FilterKind::MinWindow,
                    3 => FilterKind::MaxWindow,
                    4 => FilterKind::Median,
                    _ => FilterKind::MovingAverage,
                };
                let source_id = r.u16();
                let window = r.u16() as usize;
                let mut cfg = FilterCfg::new(kind, window);
                cfg.source_id = source_id;
                cfg.tau_ms = r.u32();
                ChannelConfig::Filter(cfg)
            }
            ChannelKind::Timer => {
                let mode = match r.u8() {
                    1 => TimerMode::CountDown,
                    2 => TimerMode::DelayOn,
                    3 => TimerMode::DelayOff,
                    4 => TimerMode::Pulse,
                    _ => TimerMode::CountUp,
                };
                let start_id = r.u16();
                let stop_id = r.u16();
                let reset_id = r.u16();
                let target_ms = r.u32();
                let mut cfg = TimerCfg::new(mode, target_ms);
                cfg.start_id = start_id;
                cfg.stop_id = stop_id;
                cfg.reset_id = reset_id;
                ChannelConfig::Timer(cfg)
            }
            ChannelKind::Table2D => {
                let mut cfg = Table2DCfg::new();
                cfg.source_id = r.u16();
                let n = r.u8();
                for _ in 0..n {
                    let _ = cfg.x.push(r.i32());
                }
                for _ in 0..n {
                    let _ = cfg.y.push(r.i32());
                }
                ChannelConfig::Table2D(cfg)
            }
            ChannelKind::Table3D => {
                let mut cfg = Table3DCfg::new();
                cfg.source_x = r.u16();
                cfg.source_y = r.u16();
                let nx = r.u8();
                let ny = r.u8();
                for _ in 0..nx {
                    let _ = cfg.x_axis.push(r.i32());
                }
                for _ in 0..ny {
                    let _ = cfg.y_axis.push(r.i32());
                }
                for _ in 0..(nx as usize * ny as usize) {
                    let _ = cfg.z.push(r.i32());
                }
                ChannelConfig::Table3D(cfg)
            }
            ChannelKind::Switch => {
                let switch_type = match r.u8() {
                    1 => SwitchType::Momentary,
                    2 => SwitchType::PressHold,
                    _ => SwitchType::Latching,
                };
                let input_up = r.u16();
                let input_down = r.u16();
                let positions = r.u8();
                let mut cfg = SwitchCfg::new(switch_type, positions);
                cfg.input_up = input_up;
                cfg.input_down = input_down;
                cfg.restore = match r.u8() {
                    1 => RestorePolicy::Last,
                    2 => RestorePolicy::Default,
                    _ => RestorePolicy::First,
                };
                cfg.default_position = r.u8();
                cfg.hold_ms = r.u32();
                ChannelConfig::Switch(cfg)
            }
            ChannelKind::Enum => {
                let source_id = r.u16();
                let writable = r.bool();
                let mut cfg = EnumCfg::new(writable);
                cfg.source_id = source_id;
                let n = r.u8();
                for _ in 0..n {
                    let value = r.i32();
                    let len = r.u8() as usize;
                    let start = r.pos;
                    r.pos += len;
                    let mut label: heapless::String<MAX_LABEL_LEN> = heapless::String::new();
                    if let Ok(s) = core::str::from_utf8(&bytes[start..(start + len).min(bytes.len())]) {
                        let _ = label.push_str(s);
                    }
                    let _ = cfg.labels.push(EnumLabel { value, label });
                }
                ChannelConfig::Enum(cfg)
            }
            ChannelKind::Pid => {
                let pv_id = r.u16();
                let setpoint_id = r.u16();
                let k_p = r.i32();
                let k_i = r.i32();
                let k_d = r.i32();
                let gain_scale = r.i32();
                let out_min = r.i32();
                let out_max = r.i32();
                let mut cfg = PidCfg::new(k_p, k_i, k_d, out_min, out_max);
                cfg.pv_id = pv_id;
                cfg.setpoint_id = setpoint_id;
                cfg.gain_scale = gain_scale;
                ChannelConfig::Pid(cfg)
            }
            ChannelKind::SystemReadOnly => {
                let tag = r.u8();
                let hw = r.u8();
                let signal = match tag {
                    1 => SystemSignal::BoardTempMdegC,
                    2 => SystemSignal::UptimeMs,
                    3 => SystemSignal::OutputCurrentMa { hw_index: hw },
                    4 => SystemSignal::OutputDutyPct { hw_index: hw },
                    5 => SystemSignal::InputRawMv { hw_index: hw },
                    6 => SystemSignal::FaultCount,
                    7 => SystemSignal::ConfigVersion,
                    _ => SystemSignal::BatteryVoltageMv,
                };
                ChannelConfig::SystemReadOnly(SystemRoCfg::new(signal))
            }
        })
    }

    fn logic_op_from_u8(v: u8) -> LogicOp {
        const OPS: [LogicOp; 22] = [
            LogicOp::IsTrue,
            LogicOp::IsFalse,
            LogicOp::Equal,
            LogicOp::NotEqual,
            LogicOp::Less,
            LogicOp::Greater,
            LogicOp::LessEqual,
            LogicOp::GreaterEqual,
            LogicOp::InRange,
            LogicOp::And,
            LogicOp::Or,
            LogicOp::Xor,
            LogicOp::Nand,
            LogicOp::Nor,
            LogicOp::EdgeRising,
            LogicOp::EdgeFalling,
            LogicOp::Hysteresis,
            LogicOp::Toggle,
            LogicOp::Pulse,
            LogicOp::Flash,
            LogicOp::SetResetLatch,
            LogicOp::Changed,
        ];
        OPS[(v as usize).min(OPS.len() - 1)]
    }

    fn number_op_from_u8(v: u8) -> NumberOp {
        const OPS: [NumberOp; 13] = [
            NumberOp::Constant,
            NumberOp::Add,
            NumberOp::Subtract,
            NumberOp::Multiply,
            NumberOp::Divide,
            NumberOp::Min,
            NumberOp::Max,
            NumberOp::Average,
            NumberOp::Abs,
            NumberOp::Scale,
            NumberOp::Clamp,
            NumberOp::Conditional,
            NumberOp::Lookup3,
        ];
        OPS[(v as usize).min(OPS.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::digital_input::DigitalInputMode;

    fn sample_channel(id: u16, name: &str) -> ParsedChannel {
        ParsedChannel {
            id,
            name: {
                let mut s = heapless::String::new();
                let _ = s.push_str(name);
                s
            },
            flags: ChannelFlags::ENABLED,
            display: Display::default(),
            hw_binding: Some(HwBinding { device: HwDevice::Dio, index: 3 }),
            config: ChannelConfig::DigitalInput(DigitalInputCfg::new(DigitalInputMode::SwitchActiveHigh, 3)),
        }
    }

    #[test]
    fn round_trips_header_and_single_channel() {
        let mut builder = ConfigBuilder::new(1);
        builder.push(&sample_channel(5, "door_sw")).unwrap();
        let bytes = builder.build();

        let parsed = parse(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id, 5);
        assert_eq!(parsed[0].name.as_str(), "door_sw");
        assert!(matches!(parsed[0].config, ChannelConfig::DigitalInput(_)));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut builder = ConfigBuilder::new(1);
        builder.push(&sample_channel(5, "x")).unwrap();
        let mut bytes = builder.build();
        bytes[0] = 0;
        assert_eq!(parse(&bytes), Err(ConfigError::BadMagic));
    }

    #[test]
    fn corrupted_crc_rejected() {
        let mut builder = ConfigBuilder::new(1);
        builder.push(&sample_channel(5, "x")).unwrap();
        let mut bytes = builder.build();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert_eq!(parse(&bytes), Err(ConfigError::BadCrc));
    }

    #[test]
    fn interned_strings_are_deduplicated() {
        let mut builder = ConfigBuilder::new(1);
        builder.push(&sample_channel(5, "shared")).unwrap();
        builder.push(&sample_channel(6, "shared")).unwrap();
        assert_eq!(builder.strings.len(), 1);
    }

    #[test]
    fn power_output_params_round_trip() {
        let mut cfg = PowerOutputCfg::new();
        cfg.source_id = 10;
        cfg.current_limit_ma = 15_000;
        cfg.retry_count = 3;
        let ch = ParsedChannel {
            id: 100,
            name: heapless::String::new(),
            flags: ChannelFlags::ENABLED,
            display: Display::default(),
            hw_binding: None,
            config: ChannelConfig::PowerOutput(cfg),
        };
        let mut builder = ConfigBuilder::new(1);
        builder.push(&ch).unwrap();
        let bytes = builder.build();
        let parsed = parse(&bytes).unwrap();
        match &parsed[0].config {
            ChannelConfig::PowerOutput(c) => {
                assert_eq!(c.source_id, 10);
                assert_eq!(c.current_limit_ma, 15_000);
                assert_eq!(c.retry_count, 3);
            }
            _ => panic!("wrong kind"),
        }
    }
}
