//! Registry — the channel table, its evaluation order, and the
//! per-tick scheduler that ties every kind and driver together.
//!
//! Channels live in a flat array addressed by position; `id_index` maps
//! the user-facing 16-bit id to that position so kind `eval()` calls can
//! resolve a `source_id` without a linear scan. `apply_config` builds a
//! whole new table off to the side and only assigns it into `self` once
//! uniqueness, id range, acyclicity, and reference resolution all hold —
//! the closest this single-threaded engine gets to a double-buffered
//! swap for a concurrent host; see DESIGN.md.

pub mod config_format;
pub mod topo;

use heapless::Vec;

use crate::channel::{Channel, ChannelConfig, ChannelFlags, ChannelKind, DataType, Display, HwDevice, ID_NONE};
use crate::collaborators::{AdcSource, CanTransmit, DigitalSource};
use crate::drivers::hbridge::{BridgeMode, BridgeState};
use crate::drivers::power_output::OutputState;
use crate::drivers::protection::{ProtectionCfg, ProtectionSnapshot};
use crate::error::{AccessError, ConfigError};
use crate::kinds::digital_input::DigitalInputMode;
use crate::kinds::system_ro::{SystemRoCfg, SystemSignal, SystemSnapshot};
use crate::protocol::telemetry::{Caps, HBridgeTelemetry, TelemetryHeader, TelemetrySnapshot, VirtualSample};
use log::{debug, warn};

/// Channel table capacity. The id space goes up to 1279, but a single
/// device config realistically wires a few dozen to a couple hundred
/// channels; 64 keeps the table (and `config_format`'s derived
/// string/param-blob capacities) within a modest, statically-sized
/// footprint. See DESIGN.md Open Question.
pub const MAX_CHANNELS: usize = 64;

/// One past the highest channel id (`SYSTEM_SUB` tops out at 1279).
const ID_SPACE: usize = 1280;

pub const PROFET_MAX: usize = 32;
pub const HBRIDGE_MAX: usize = 8;
pub const ADC_MAX: usize = 20;
pub const DIN_MAX: usize = 20;

/// ADC reference voltage assumed when converting `AdcSource` counts to
/// millivolts (12-bit, 0..=4095 counts over 0..=3300 mV).
const ADC_VREF_MV: u32 = 3300;
const ADC_FULL_SCALE: u32 = 4095;

fn output_state_code(state: OutputState) -> u8 {
    match state {
        OutputState::Off => 0,
        OutputState::On => 1,
        OutputState::Pwm => 2,
        OutputState::Oc => 3,
        OutputState::Ot => 4,
        OutputState::Sc => 5,
        OutputState::Ol => 6,
        OutputState::RetryWait => 7,
    }
}

fn bridge_mode_code(mode: BridgeMode) -> u8 {
    match mode {
        BridgeMode::Coast => 0,
        BridgeMode::Forward => 1,
        BridgeMode::Reverse => 2,
        BridgeMode::Brake => 3,
    }
}

fn bridge_state_flags(state: BridgeState) -> u8 {
    match state {
        BridgeState::Running => 0,
        BridgeState::Stalled => 0b0000_0001,
        BridgeState::Fault => 0b0000_0010,
    }
}

/// The live channel table plus the diagnostic state the telemetry codec
/// and `SystemReadOnly` channels read from.
pub struct Registry {
    channels: Vec<Channel, MAX_CHANNELS>,
    /// Evaluation order, leaves first: each entry is a
    /// position into `channels`, not a channel id.
    order: Vec<u16, MAX_CHANNELS>,
    id_index: [i16; ID_SPACE],

    now_ms: u64,
    config_version: u32,
    fault_count: u32,

    protection: ProtectionCfg,
    last_protection: ProtectionSnapshot,

    adc_mv: [u16; ADC_MAX],
    din_bits: [bool; DIN_MAX],
    output_state: [u8; PROFET_MAX],
    output_current_ma: [u16; PROFET_MAX],
    output_duty_permille: [u16; PROFET_MAX],
    hbridge_tel: [HBridgeTelemetry; HBRIDGE_MAX],

    /// Raw pin level/edge-timestamp tracking for `FrequencyInput`
    /// channels, keyed by pin index -- `FrequencyInputCfg` itself only
    /// records *confirmed* edges, so the registry detects the low-to-high
    /// transition before handing it a period.
    freq_raw_level: [bool; DIN_MAX],
    freq_prev_edge_ms: [u64; DIN_MAX],
}

impl Registry {
    pub fn new() -> Self {
        let mut r = Self {
            channels: Vec::new(),
            order: Vec::new(),
            id_index: [-1; ID_SPACE],
            now_ms: 0,
            config_version: 0,
            fault_count: 0,
            protection: ProtectionCfg::default(),
            last_protection: ProtectionSnapshot::default(),
            adc_mv: [0; ADC_MAX],
            din_bits: [false; DIN_MAX],
            output_state: [0; PROFET_MAX],
            output_current_ma: [0; PROFET_MAX],
            output_duty_permille: [0; PROFET_MAX],
            hbridge_tel: [HBridgeTelemetry { mode: 0, duty: 0, current_ma: 0, pos: 0, flags: 0 }; HBRIDGE_MAX],
            freq_raw_level: [false; DIN_MAX],
            freq_prev_edge_ms: [0; DIN_MAX],
        };
        let bytes = Self::default_config_bytes();
        r.apply_config(&bytes).expect("built-in default configuration must validate");
        r
    }

    /// A handful of always-present diagnostic channels forming a
    /// default/failsafe configuration: enough for a host to read
    /// uptime/battery/fault-count before ever pushing a real config.
    pub fn default_config_bytes(
    ) -> Vec<u8, { config_format::HEADER_SIZE + MAX_CHANNELS * config_format::ENTRY_SIZE + config_format::STRING_BYTES_CAP + config_format::PARAM_BLOB_CAP }>
    {
        let mut b = config_format::ConfigBuilder::new(0);
        let entries = [
            (1000u16, "uptime_ms", SystemSignal::UptimeMs, ""),
            (1001u16, "battery_mv", SystemSignal::BatteryVoltageMv, "mV"),
            (1002u16, "fault_count", SystemSignal::FaultCount, ""),
        ];
        for (id, name, signal, unit) in entries {
            let mut display = Display::default();
            let _ = display.unit.push_str(unit);
            let _ = b.push(&config_format::ParsedChannel {
                id,
                name: heapless::String::try_from(name).unwrap_or_default(),
                flags: ChannelFlags::ENABLED | ChannelFlags::BUILTIN | ChannelFlags::READONLY,
                display,
                hw_binding: None,
                config: ChannelConfig::SystemReadOnly(SystemRoCfg::new(signal)),
            });
        }
        b.build()
    }

    fn index_of(&self, id: u16) -> Option<usize> {
        if id == ID_NONE {
            return None;
        }
        match self.id_index.get(id as usize).copied().unwrap_or(-1) {
            -1 => None,
            idx => Some(idx as usize),
        }
    }

    fn value_of(&self, id: u16) -> i32 {
        match self.index_of(id) {
            Some(idx) => self.channels[idx].value,
            None => 0,
        }
    }

    /// Parses, validates, and -- only on full success -- swaps in a new
    /// configuration record. A rejected config leaves the prior one
    /// untouched.
    pub fn apply_config(&mut self, bytes: &[u8]) -> Result<(), ConfigError> {
        let parsed = config_format::parse(bytes).map_err(|e| {
            warn!("apply_config: rejected ({e})");
            e
        })?;

        for i in 0..parsed.len() {
            for j in (i + 1)..parsed.len() {
                if parsed[i].id == parsed[j].id {
                    warn!("apply_config: duplicate id {}", parsed[i].id);
                    return Err(ConfigError::DuplicateId(parsed[i].id));
                }
            }
        }

        for ch in parsed.iter() {
            if !ch.config.kind().id_range().contains(&ch.id) {
                warn!("apply_config: id {} outside its kind's range", ch.id);
                return Err(ConfigError::BadIdRange(ch.id));
            }
        }

        let mut deps: Vec<heapless::Vec<u16, 8>, MAX_CHANNELS> = Vec::new();
        for ch in parsed.iter() {
            let refs = ch.config.referenced_ids();
            for &rid in refs.iter() {
                if !parsed.iter().any(|p| p.id == rid) {
                    warn!("apply_config: channel {} references unresolved id {}", ch.id, rid);
                    return Err(ConfigError::UnresolvedRef(ch.id, rid));
                }
            }
            let _ = deps.push(refs);
        }

        let mut nodes: Vec<topo::Node, MAX_CHANNELS> = Vec::new();
        for (idx, ch) in parsed.iter().enumerate() {
            let _ = nodes.push(topo::Node { id: ch.id, idx: idx as u16, depends_on: deps[idx].as_slice() });
        }
        let order: Vec<u16, MAX_CHANNELS> = topo::topological_order(&nodes).map_err(|e| {
            warn!("apply_config: {e}");
            e
        })?;

        let now_ms = self.now_ms;
        let mut channels: Vec<Channel, MAX_CHANNELS> = Vec::new();
        for p in parsed.into_iter() {
            let mut ch = config_format::instantiate(p, now_ms);
            if let ChannelConfig::Switch(sw) = &mut ch.config {
                // No persisted-state backend is modeled (DESIGN.md Open
                // Question); `Last` behaves like `First` until one exists.
                sw.initialize(None);
            }
            let _ = channels.push(ch);
        }

        let mut id_index = [-1i16; ID_SPACE];
        for (i, ch) in channels.iter().enumerate() {
            id_index[ch.id as usize] = i as i16;
        }

        let channel_count = channels.len();
        self.channels = channels;
        self.order = order;
        self.id_index = id_index;
        self.config_version = self.config_version.wrapping_add(1);
        debug!("apply_config: accepted {channel_count} channels, version {}", self.config_version);
        Ok(())
    }

    /// Runs one full scheduling pass: physical inputs, then virtuals in
    /// dependency order, then outputs -- all folded into the single
    /// topological order computed at `apply_config` time, since physical
    /// inputs (no dependencies) and outputs (depend on everything they
    /// drive) already sort into those phases implicitly.
    pub fn tick<A, D, C>(
        &mut self,
        now_ms: u64,
        dt_ms: u32,
        adc: &mut A,
        dio: &mut D,
        can_tx: &mut C,
        battery_mv: u32,
        board_temp_c: f32,
        mcu_temp_c: f32,
    ) where
        A: AdcSource,
        D: DigitalSource,
        C: CanTransmit,
    {
        self.now_ms = now_ms;

        let total_current_ma: u32 = self.output_current_ma.iter().map(|&v| v as u32).sum::<u32>()
            + self.hbridge_tel.iter().map(|h| h.current_ma as u32).sum::<u32>();
        self.last_protection = self.protection.evaluate(battery_mv, board_temp_c, mcu_temp_c, total_current_ma);
        let fault_gate = ProtectionCfg::outputs_enabled(&self.last_protection);

        let snapshot = SystemSnapshot {
            battery_mv: battery_mv as i32,
            board_temp_mdeg_c: (board_temp_c * 1000.0) as i32,
            uptime_ms: now_ms,
            fault_count: self.fault_count,
            config_version: self.config_version,
        };

        for slot in 0..self.order.len() {
            let idx = self.order[slot] as usize;
            self.eval_one(idx, now_ms, dt_ms, adc, dio, can_tx, battery_mv, fault_gate, &snapshot);
        }

        self.fault_count = self.channels.iter().filter(|c| c.has_fault()).count() as u32;
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_one<A, D, C>(
        &mut self,
        idx: usize,
        now_ms: u64,
        dt_ms: u32,
        adc: &mut A,
        dio: &mut D,
        can_tx: &mut C,
        battery_mv: u32,
        fault_gate: bool,
        snapshot: &SystemSnapshot,
    ) where
        A: AdcSource,
        D: DigitalSource,
        C: CanTransmit,
    {
        let enabled = self.channels[idx].is_enabled();
        let kind = self.channels[idx].kind();

        match kind {
            ChannelKind::DigitalInput => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let pin = match &self.channels[idx].config {
                    ChannelConfig::DigitalInput(c) => c.pin,
                    _ => unreachable!(),
                };
                let level = dio.read_pin(pin);
                let val = if let ChannelConfig::DigitalInput(cfg) = &mut self.channels[idx].config {
                    match cfg.mode {
                        DigitalInputMode::Frequency | DigitalInputMode::Rpm => {
                            if level != cfg.raw_state {
                                if level {
                                    let period = now_ms.saturating_sub(cfg.last_edge_ms) as u32;
                                    cfg.last_period_ms = period;
                                    cfg.last_edge_ms = now_ms;
                                }
                                cfg.raw_state = level;
                            }
                            cfg.eval_frequency(cfg.last_period_ms)
                        }
                        _ => cfg.eval_switch(level, now_ms),
                    }
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
                if let Some(hw) = self.channels[idx].hw_binding {
                    if hw.device == HwDevice::Dio && (hw.index as usize) < DIN_MAX {
                        self.din_bits[hw.index as usize] = level;
                    }
                }
            }

            ChannelKind::AnalogInput => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let pin = match &self.channels[idx].config {
                    ChannelConfig::AnalogInput(c) => c.pin,
                    _ => unreachable!(),
                };
                let counts = adc.read_channel(pin) as u32;
                let mv = (counts * ADC_VREF_MV / ADC_FULL_SCALE).min(u16::MAX as u32) as u16;
                let val = if let ChannelConfig::AnalogInput(cfg) = &mut self.channels[idx].config {
                    cfg.eval(mv, now_ms)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
                if let Some(hw) = self.channels[idx].hw_binding {
                    if hw.device == HwDevice::Adc && (hw.index as usize) < ADC_MAX {
                        self.adc_mv[hw.index as usize] = mv;
                    }
                }
            }

            ChannelKind::FrequencyInput => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let pin = match &self.channels[idx].config {
                    ChannelConfig::FrequencyInput(c) => c.pin,
                    _ => unreachable!(),
                };
                let level = dio.read_pin(pin);
                let pidx = pin as usize % DIN_MAX;
                let mut edge_period = None;
                if level && !self.freq_raw_level[pidx] {
                    edge_period = Some(now_ms.saturating_sub(self.freq_prev_edge_ms[pidx]) as u32);
                    self.freq_prev_edge_ms[pidx] = now_ms;
                }
                self.freq_raw_level[pidx] = level;
                let val = if let ChannelConfig::FrequencyInput(cfg) = &mut self.channels[idx].config {
                    cfg.eval(edge_period, now_ms)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }

            ChannelKind::CanRx => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let cur = self.channels[idx].value;
                let timed_out = if let ChannelConfig::CanRx(cfg) = &self.channels[idx].config {
                    cfg.check_timeout(now_ms, cur)
                } else {
                    None
                };
                if let Some(v) = timed_out {
                    self.channels[idx].commit(v, now_ms);
                    self.channels[idx].set_fault(true);
                }
            }

            ChannelKind::PowerOutput => {
                let (source_id, duty_source_id) = match &self.channels[idx].config {
                    ChannelConfig::PowerOutput(c) => (c.source_id, c.duty_source_id),
                    _ => unreachable!(),
                };
                let on = enabled && fault_gate && source_id != ID_NONE && self.value_of(source_id) != 0;
                let duty = if duty_source_id != ID_NONE {
                    self.value_of(duty_source_id).clamp(0, 1000) as u16
                } else {
                    1000
                };
                let hw_index = self.channels[idx].hw_binding.map(|h| h.index);

                let (val, fault, current_ma, state_code) = if let ChannelConfig::PowerOutput(cfg) =
                    &mut self.channels[idx].config
                {
                    cfg.tick(on, duty, battery_mv, now_ms, dt_ms);
                    (cfg.duty_permille as i32, cfg.fault_flags.any_fault(), cfg.current_ma, output_state_code(cfg.state))
                } else {
                    (0, false, 0, 0)
                };

                self.channels[idx].commit(val, now_ms);
                self.channels[idx].set_fault(fault);

                if let Some(hwidx) = hw_index {
                    let hwidx = hwidx as usize;
                    if hwidx < PROFET_MAX {
                        self.output_state[hwidx] = state_code;
                        self.output_current_ma[hwidx] = current_ma.min(u16::MAX as u32) as u16;
                        self.output_duty_permille[hwidx] = val.clamp(0, 1000) as u16;
                    }
                }
            }

            ChannelKind::HBridge => {
                let (mode_source_id, duty_source_id, target_source_id, theta_rad) = match &self.channels[idx].config {
                    ChannelConfig::HBridge(c) => (c.mode_source_id, c.duty_source_id, c.target_source_id, c.theta_rad),
                    _ => unreachable!(),
                };

                let (mut mode, duty) = if target_source_id != ID_NONE {
                    let target_mrad = self.value_of(target_source_id);
                    let theta_mrad = (theta_rad * 1000.0) as i32;
                    let error = target_mrad - theta_mrad;
                    let duty = error.unsigned_abs().min(1000) as u16;
                    let mode = if error > 2 {
                        BridgeMode::Forward
                    } else if error < -2 {
                        BridgeMode::Reverse
                    } else {
                        BridgeMode::Brake
                    };
                    (mode, duty)
                } else {
                    let mode = match self.value_of(mode_source_id) {
                        1 => BridgeMode::Forward,
                        2 => BridgeMode::Reverse,
                        3 => BridgeMode::Brake,
                        _ => BridgeMode::Coast,
                    };
                    let duty = if duty_source_id != ID_NONE {
                        self.value_of(duty_source_id).clamp(0, 1000) as u16
                    } else {
                        1000
                    };
                    (mode, duty)
                };
                if !enabled {
                    mode = BridgeMode::Coast;
                }

                let hw_index = self.channels[idx].hw_binding.map(|h| h.index);
                let (val, fault, current_ma, duty_out, pos_out, flags, mode_code) =
                    if let ChannelConfig::HBridge(cfg) = &mut self.channels[idx].config {
                        cfg.tick(mode, duty, 0.0, fault_gate, now_ms, dt_ms);
                        let pos_mrad = (cfg.theta_rad * 1000.0).clamp(0.0, 65535.0) as u16;
                        let is_fault = cfg.state == BridgeState::Fault;
                        let cur_ma = (cfg.current_a.abs() * 1000.0) as u32;
                        (
                            pos_mrad as i32,
                            is_fault,
                            cur_ma,
                            cfg.duty_permille,
                            pos_mrad,
                            bridge_state_flags(cfg.state),
                            bridge_mode_code(cfg.mode),
                        )
                    } else {
                        (0, false, 0, 0, 0, 0, 0)
                    };

                self.channels[idx].commit(val, now_ms);
                self.channels[idx].set_fault(fault);

                if let Some(hwidx) = hw_index {
                    let hwidx = hwidx as usize;
                    if hwidx < HBRIDGE_MAX {
                        self.hbridge_tel[hwidx] = HBridgeTelemetry {
                            mode: mode_code,
                            duty: duty_out,
                            current_ma: current_ma.min(u16::MAX as u32) as u16,
                            pos: pos_out,
                            flags,
                        };
                    }
                }
            }

            ChannelKind::CanTx => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let (bus, message_id, dlc, is_extended, is_fd) = match &self.channels[idx].config {
                    ChannelConfig::CanTx(c) => (c.bus, c.message_id, c.dlc, c.is_extended, c.is_fd),
                    _ => unreachable!(),
                };
                let mut source_values: heapless::Vec<i32, { crate::kinds::can_tx::MAX_SIGNALS }> = heapless::Vec::new();
                if let ChannelConfig::CanTx(c) = &self.channels[idx].config {
                    for sig in c.signals.iter() {
                        let _ = source_values.push(self.value_of(sig.source_id));
                    }
                }
                let payload = if let ChannelConfig::CanTx(cfg) = &mut self.channels[idx].config {
                    cfg.tick(now_ms, &source_values)
                } else {
                    None
                };
                let sent = payload.is_some();
                if let Some(p) = payload {
                    let n = (dlc as usize).min(8);
                    let _ = can_tx.queue(bus, message_id, &p[..n], dlc, is_extended, is_fd);
                }
                self.channels[idx].commit(sent as i32, now_ms);
            }

            ChannelKind::Logic => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let (source_a, source_b) = match &self.channels[idx].config {
                    ChannelConfig::Logic(c) => (c.source_a, c.source_b),
                    _ => unreachable!(),
                };
                let a = self.value_of(source_a);
                let b_connected = source_b != ID_NONE;
                let b = if b_connected { self.value_of(source_b) } else { 0 };
                let val = if let ChannelConfig::Logic(cfg) = &mut self.channels[idx].config {
                    cfg.eval(a, b, b_connected, now_ms, dt_ms)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }

            ChannelKind::Number => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let (source_a, source_b, cond_source) = match &self.channels[idx].config {
                    ChannelConfig::Number(c) => (c.source_a, c.source_b, c.cond_source),
                    _ => unreachable!(),
                };
                let a = self.value_of(source_a);
                let b = self.value_of(source_b);
                let cond = self.value_of(cond_source);
                let (val, fault) = if let ChannelConfig::Number(cfg) = &mut self.channels[idx].config {
                    let v = cfg.eval(a, b, cond);
                    (v, cfg.fault)
                } else {
                    (0, false)
                };
                self.channels[idx].commit(val, now_ms);
                self.channels[idx].set_fault(fault);
            }

            ChannelKind::Filter => {
                if !enabled {
                    if let ChannelConfig::Filter(cfg) = &mut self.channels[idx].config {
                        cfg.reset();
                    }
                    let cur = self.channels[idx].value;
                    self.channels[idx].commit(cur, now_ms);
                    return;
                }
                let source_id = match &self.channels[idx].config {
                    ChannelConfig::Filter(c) => c.source_id,
                    _ => unreachable!(),
                };
                let input = self.value_of(source_id);
                let val = if let ChannelConfig::Filter(cfg) = &mut self.channels[idx].config {
                    cfg.eval(input, dt_ms)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }

            ChannelKind::Timer => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let (start_id, stop_id, reset_id) = match &self.channels[idx].config {
                    ChannelConfig::Timer(c) => (c.start_id, c.stop_id, c.reset_id),
                    _ => unreachable!(),
                };
                let start = start_id != ID_NONE && self.value_of(start_id) != 0;
                let stop = stop_id != ID_NONE && self.value_of(stop_id) != 0;
                let reset = reset_id != ID_NONE && self.value_of(reset_id) != 0;
                let val = if let ChannelConfig::Timer(cfg) = &mut self.channels[idx].config {
                    cfg.eval(start, stop, reset, dt_ms)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }

            ChannelKind::Table2D => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let source_id = match &self.channels[idx].config {
                    ChannelConfig::Table2D(c) => c.source_id,
                    _ => unreachable!(),
                };
                let input = self.value_of(source_id);
                let (val, fault) = if let ChannelConfig::Table2D(cfg) = &mut self.channels[idx].config {
                    let v = cfg.eval(input);
                    (v, cfg.fault)
                } else {
                    (0, false)
                };
                self.channels[idx].commit(val, now_ms);
                self.channels[idx].set_fault(fault);
            }

            ChannelKind::Table3D => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let (source_x, source_y) = match &self.channels[idx].config {
                    ChannelConfig::Table3D(c) => (c.source_x, c.source_y),
                    _ => unreachable!(),
                };
                let x = self.value_of(source_x);
                let y = self.value_of(source_y);
                let (val, fault) = if let ChannelConfig::Table3D(cfg) = &mut self.channels[idx].config {
                    let v = cfg.eval(x, y);
                    (v, cfg.fault)
                } else {
                    (0, false)
                };
                self.channels[idx].commit(val, now_ms);
                self.channels[idx].set_fault(fault);
            }

            ChannelKind::Switch => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let (input_up, input_down) = match &self.channels[idx].config {
                    ChannelConfig::Switch(c) => (c.input_up, c.input_down),
                    _ => unreachable!(),
                };
                let up = input_up != ID_NONE && self.value_of(input_up) != 0;
                let down = input_down != ID_NONE && self.value_of(input_down) != 0;
                let val = if let ChannelConfig::Switch(cfg) = &mut self.channels[idx].config {
                    cfg.eval(up, down, now_ms)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }

            ChannelKind::Enum => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let source_id = match &self.channels[idx].config {
                    ChannelConfig::Enum(c) => c.source_id,
                    _ => unreachable!(),
                };
                let source = if source_id != ID_NONE { Some(self.value_of(source_id)) } else { None };
                let val = if let ChannelConfig::Enum(cfg) = &mut self.channels[idx].config {
                    cfg.eval(source)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }

            ChannelKind::Pid => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let (pv_id, setpoint_id) = match &self.channels[idx].config {
                    ChannelConfig::Pid(c) => (c.pv_id, c.setpoint_id),
                    _ => unreachable!(),
                };
                let pv = self.value_of(pv_id);
                let sp = self.value_of(setpoint_id);
                let val = if let ChannelConfig::Pid(cfg) = &mut self.channels[idx].config {
                    cfg.eval(sp, pv, dt_ms)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }

            ChannelKind::SystemReadOnly => {
                if !enabled {
                    self.channels[idx].commit(0, now_ms);
                    return;
                }
                let signal = match &self.channels[idx].config {
                    ChannelConfig::SystemReadOnly(c) => c.signal,
                    _ => unreachable!(),
                };
                let hw_value = match signal {
                    SystemSignal::OutputCurrentMa { hw_index } => {
                        Some(*self.output_current_ma.get(hw_index as usize).unwrap_or(&0) as i32)
                    }
                    SystemSignal::OutputDutyPct { hw_index } => {
                        Some(*self.output_duty_permille.get(hw_index as usize).unwrap_or(&0) as i32 / 10)
                    }
                    SystemSignal::InputRawMv { hw_index } => {
                        Some(*self.adc_mv.get(hw_index as usize).unwrap_or(&0) as i32)
                    }
                    _ => None,
                };
                let val = if let ChannelConfig::SystemReadOnly(cfg) = &self.channels[idx].config {
                    cfg.eval(snapshot, hw_value)
                } else {
                    0
                };
                self.channels[idx].commit(val, now_ms);
            }
        }
    }

    /// Upcall for a received CAN frame, applied immediately to every
    /// matching `CanRx` channel rather than waiting for the next `tick`,
    /// since the host decides when frames arrive.
    pub fn on_can_frame(&mut self, bus: u8, id: u32, data: &[u8], _dlc: u8, is_extended: bool) {
        let now_ms = self.now_ms;
        for ch in self.channels.iter_mut() {
            if let ChannelConfig::CanRx(cfg) = &mut ch.config {
                if cfg.matches(bus, id, is_extended) {
                    let v = cfg.on_frame(data, now_ms);
                    ch.commit(v, now_ms);
                    ch.set_fault(false);
                }
            }
        }
    }

    pub fn get(&self, id: u16) -> Option<&Channel> {
        self.index_of(id).map(|i| &self.channels[i])
    }

    pub fn get_value(&self, id: u16) -> Result<i32, AccessError> {
        self.index_of(id).map(|i| self.channels[i].value).ok_or(AccessError::NotFound)
    }

    /// Applies a host-originated write: rejected for read-only channels,
    /// out-of-domain values, and wired (non-writable) `Enum`s.
    pub fn set_value(&mut self, id: u16, v: i32) -> Result<(), AccessError> {
        let idx = self.index_of(id).ok_or(AccessError::NotFound)?;
        if self.channels[idx].is_readonly() {
            return Err(AccessError::ReadOnly);
        }
        match self.channels[idx].display.data_type {
            DataType::Bool if v != 0 && v != 1 => return Err(AccessError::OutOfDomain),
            DataType::U16 if !(0..=65535).contains(&v) => return Err(AccessError::OutOfDomain),
            _ => {}
        }
        if let ChannelConfig::Enum(cfg) = &mut self.channels[idx].config {
            if !cfg.write(v) {
                return Err(AccessError::ReadOnly);
            }
        }
        self.channels[idx].value = v;
        Ok(())
    }

    /// Iterates channels in ascending-id order, optionally filtered by
    /// kind -- used by `CH_GET_LIST` and host-side monitors.
    pub fn for_each(&self, kind: Option<ChannelKind>, mut f: impl FnMut(&Channel)) {
        let mut idxs: heapless::Vec<usize, MAX_CHANNELS> = heapless::Vec::new();
        for i in 0..self.channels.len() {
            let _ = idxs.push(i);
        }
        idxs.sort_unstable_by_key(|&i| self.channels[i].id);
        for i in idxs {
            if kind.map(|k| k == self.channels[i].kind()).unwrap_or(true) {
                f(&self.channels[i]);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn config_version(&self) -> u32 {
        self.config_version
    }

    pub fn protection_snapshot(&self) -> ProtectionSnapshot {
        self.last_protection
    }

    /// Gathers this tick's non-input, non-output channels for the
    /// telemetry `Virtuals` section.
    fn virtual_samples(&self) -> heapless::Vec<VirtualSample, MAX_CHANNELS> {
        let mut out: heapless::Vec<VirtualSample, MAX_CHANNELS> = heapless::Vec::new();
        for ch in self.channels.iter() {
            let k = ch.kind();
            if !k.is_physical_input() && !k.is_output() {
                let _ = out.push(VirtualSample { id: ch.id, value: ch.value });
            }
        }
        out
    }

    fn fault_bits(&self) -> u32 {
        let mut bits = self.last_protection.fault_flags.0 as u32;
        if self.channels.iter().any(|c| c.has_fault()) {
            bits |= 0x1_0000;
        }
        bits
    }

    /// Builds one telemetry packet into `buf`. Returns the byte count
    /// written, or `None` if `buf` is too small for the requested
    /// `sections`.
    #[allow(clippy::too_many_arguments)]
    pub fn build_telemetry(
        &self,
        buf: &mut [u8],
        caps: &Caps,
        sections: u16,
        seq: u32,
        timestamp_ms: u32,
        voltage_mv: u16,
        mcu_temp_c10: i16,
    ) -> Option<usize> {
        let virtuals = self.virtual_samples();
        let header = TelemetryHeader { seq, timestamp_ms, voltage_mv, mcu_temp_c10, sections, reserved: 0 };
        let snapshot = TelemetrySnapshot {
            output_states: &self.output_state,
            output_currents_ma: &self.output_current_ma,
            adc_mv: &self.adc_mv,
            din_bits: &self.din_bits,
            hbridges: &self.hbridge_tel,
            virtuals: virtuals.as_slice(),
            fault_flags: self.fault_bits(),
        };
        crate::protocol::telemetry::build(buf, &header, caps, sections, &snapshot)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::HwBinding;
    use crate::kinds::digital_input::{DigitalInputCfg, Pull};
    use crate::kinds::logic::{LogicCfg, LogicOp};

    struct NullAdc;
    impl AdcSource for NullAdc {
        fn read_channel(&mut self, _index: u8) -> u16 {
            0
        }
    }
    struct NullDio(bool);
    impl DigitalSource for NullDio {
        fn read_pin(&mut self, _index: u8) -> bool {
            self.0
        }
    }
    struct NullCan;
    impl CanTransmit for NullCan {
        fn queue(&mut self, _bus: u8, _id: u32, _data: &[u8], _dlc: u8, _ext: bool, _fd: bool) -> Result<(), crate::collaborators::CanTxError> {
            Ok(())
        }
    }

    fn build_cfg() -> Vec<u8, { config_format::HEADER_SIZE + MAX_CHANNELS * config_format::ENTRY_SIZE + config_format::STRING_BYTES_CAP + config_format::PARAM_BLOB_CAP }>
    {
        let mut b = config_format::ConfigBuilder::new(1);
        let mut din = DigitalInputCfg::new(DigitalInputMode::SwitchActiveHigh, 0);
        din.pullup = Pull::None;
        let _ = b.push(&config_format::ParsedChannel {
            id: 0,
            name: heapless::String::try_from("din0").unwrap(),
            flags: ChannelFlags::ENABLED,
            display: Display::default(),
            hw_binding: Some(HwBinding { device: HwDevice::Dio, index: 0 }),
            config: ChannelConfig::DigitalInput(din),
        });
        let mut logic = LogicCfg::new(LogicOp::IsTrue);
        logic.source_a = 0;
        let _ = b.push(&config_format::ParsedChannel {
            id: 400,
            name: heapless::String::try_from("is_on").unwrap(),
            flags: ChannelFlags::ENABLED,
            display: Display::default(),
            hw_binding: None,
            config: ChannelConfig::Logic(logic),
        });
        b.build()
    }

    #[test]
    fn new_registry_installs_default_diagnostic_channels() {
        let r = Registry::new();
        assert!(r.get(1000).is_some());
        assert_eq!(r.get_value(1001).unwrap(), 0);
    }

    #[test]
    fn apply_config_then_tick_propagates_din_into_logic() {
        let mut r = Registry::new();
        let bytes = build_cfg();
        r.apply_config(&bytes).unwrap();

        let mut adc = NullAdc;
        let mut dio = NullDio(true);
        let mut can = NullCan;
        r.tick(0, 10, &mut adc, &mut dio, &mut can, 13_000, 25.0, 25.0);
        r.tick(10, 10, &mut adc, &mut dio, &mut can, 13_000, 25.0, 25.0);

        assert_eq!(r.get_value(0).unwrap(), 1);
        assert_eq!(r.get_value(400).unwrap(), 1);
    }

    #[test]
    fn apply_config_rejects_cycle_and_keeps_prior_table() {
        let mut r = Registry::new();
        let before = r.len();

        let mut b = config_format::ConfigBuilder::new(1);
        let mut a = LogicCfg::new(LogicOp::IsTrue);
        a.source_a = 401;
        let mut bb = LogicCfg::new(LogicOp::IsTrue);
        bb.source_a = 400;
        let _ = b.push(&config_format::ParsedChannel {
            id: 400,
            name: heapless::String::new(),
            flags: ChannelFlags::ENABLED,
            display: Display::default(),
            hw_binding: None,
            config: ChannelConfig::Logic(a),
        });
        let _ = b.push(&config_format::ParsedChannel {
            id: 401,
            name: heapless::String::new(),
            flags: ChannelFlags::ENABLED,
            display: Display::default(),
            hw_binding: None,
            config: ChannelConfig::Logic(bb),
        });
        let bytes = b.build();

        let err = r.apply_config(&bytes).unwrap_err();
        let mut expected: heapless::Vec<u16, { crate::error::MAX_CYCLE_PATH }> = heapless::Vec::new();
        let _ = expected.extend_from_slice(&[400, 401, 400]);
        assert_eq!(err, ConfigError::Cycle(expected));
        assert_eq!(r.len(), before);
    }

    #[test]
    fn set_value_rejects_readonly_channel() {
        let r_result = {
            let mut r = Registry::new();
            r.set_value(1000, 5)
        };
        assert_eq!(r_result, Err(AccessError::ReadOnly));
    }

    #[test]
    fn get_value_reports_not_found_for_unknown_id() {
        let r = Registry::new();
        assert_eq!(r.get_value(12345), Err(AccessError::NotFound));
    }
}
