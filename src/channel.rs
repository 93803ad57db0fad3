//! The channel data model: a uniquely identified, typed evaluation node
//! carrying a 32-bit signed fixed-point value.
//!
//! Channels are stored as a tagged variant (`ChannelConfig`) rather than
//! behind a trait object: evaluation dispatches on the tag, so there's no
//! vtable and no heap allocation per channel.

use heapless::String;

use crate::kinds::{
    analog_input::AnalogInputCfg, can_rx::CanRxCfg, can_tx::CanTxCfg, digital_input::DigitalInputCfg,
    enum_ch::EnumCfg, filter::FilterCfg, frequency_input::FrequencyInputCfg, logic::LogicCfg,
    number::NumberCfg, pid::PidCfg, switch::SwitchCfg, system_ro::SystemRoCfg, table::Table2DCfg,
    table::Table3DCfg, timer::TimerCfg,
};
use crate::drivers::hbridge::HBridgeCfg;
use crate::drivers::power_output::PowerOutputCfg;

/// Sentinel id meaning "unconnected" for any optional channel reference.
pub const ID_NONE: u16 = 0xFFFF;

/// Maximum length of a channel's presentation name, in bytes.
pub const MAX_NAME_LEN: usize = 31;
/// Maximum length of a display unit string, in bytes.
pub const MAX_UNIT_LEN: usize = 7;

/// The id-range table. Every accepted channel's id must lie within the
/// range for its kind.
pub mod id_ranges {
    pub const DIGITAL_INPUT: core::ops::RangeInclusive<u16> = 0..=19;
    pub const ANALOG_INPUT: core::ops::RangeInclusive<u16> = 50..=69;
    pub const POWER_OUTPUT: core::ops::RangeInclusive<u16> = 100..=129;
    pub const HBRIDGE: core::ops::RangeInclusive<u16> = 150..=157;
    pub const CAN_RX: core::ops::RangeInclusive<u16> = 200..=299;
    pub const CAN_TX: core::ops::RangeInclusive<u16> = 300..=399;
    pub const LOGIC: core::ops::RangeInclusive<u16> = 400..=499;
    pub const NUMBER: core::ops::RangeInclusive<u16> = 500..=599;
    pub const TIMER: core::ops::RangeInclusive<u16> = 600..=699;
    pub const FILTER: core::ops::RangeInclusive<u16> = 700..=799;
    pub const SWITCH: core::ops::RangeInclusive<u16> = 800..=899;
    // Table2D/Table3D/Enum/Pid/FrequencyInput share the "virtual extension"
    // range; the engine packs them alongside Number, immediately after it,
    // a design choice recorded in DESIGN.md.
    pub const TABLE2D: core::ops::RangeInclusive<u16> = 900..=929;
    pub const TABLE3D: core::ops::RangeInclusive<u16> = 930..=959;
    pub const ENUM: core::ops::RangeInclusive<u16> = 960..=979;
    pub const PID: core::ops::RangeInclusive<u16> = 980..=999;
    pub const SYSTEM_RO_CORE: core::ops::RangeInclusive<u16> = 1000..=1099;
    pub const SYSTEM_SUB: core::ops::RangeInclusive<u16> = 1100..=1279;
    // FrequencyInput reuses the digital input pin range with a distinct
    // `kind` tag (it's a mode of the same physical pin in the original
    // system); see DESIGN.md Open Question.
    pub const FREQUENCY_INPUT: core::ops::RangeInclusive<u16> = 0..=19;
}

/// Tag identifying a channel's variant. Mirrors the variant carried in
/// `ChannelConfig`; kept as its own enum because wire commands (CH_GET_INFO)
/// need to name a kind without holding a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum ChannelKind {
    DigitalInput = 0,
    AnalogInput = 1,
    FrequencyInput = 2,
    CanRx = 3,
    PowerOutput = 4,
    HBridge = 5,
    CanTx = 6,
    Logic = 7,
    Number = 8,
    Filter = 9,
    Timer = 10,
    Table2D = 11,
    Table3D = 12,
    Switch = 13,
    Enum = 14,
    Pid = 15,
    SystemReadOnly = 16,
}

impl ChannelKind {
    /// The id range this kind is confined to.
    pub fn id_range(self) -> core::ops::RangeInclusive<u16> {
        use id_ranges::*;
        match self {
            ChannelKind::DigitalInput => DIGITAL_INPUT,
            ChannelKind::AnalogInput => ANALOG_INPUT,
            ChannelKind::FrequencyInput => FREQUENCY_INPUT,
            ChannelKind::CanRx => CAN_RX,
            ChannelKind::PowerOutput => POWER_OUTPUT,
            ChannelKind::HBridge => HBRIDGE,
            ChannelKind::CanTx => CAN_TX,
            ChannelKind::Logic => LOGIC,
            ChannelKind::Number => NUMBER,
            ChannelKind::Filter => FILTER,
            ChannelKind::Timer => TIMER,
            ChannelKind::Table2D => TABLE2D,
            ChannelKind::Table3D => TABLE3D,
            ChannelKind::Switch => SWITCH,
            ChannelKind::Enum => ENUM,
            ChannelKind::Pid => PID,
            ChannelKind::SystemReadOnly => SYSTEM_RO_CORE,
        }
    }

    /// True for the three physical-input kinds sampled before virtuals
    /// evaluate.
    pub fn is_physical_input(self) -> bool {
        matches!(
            self,
            ChannelKind::DigitalInput
                | ChannelKind::AnalogInput
                | ChannelKind::FrequencyInput
                | ChannelKind::CanRx
        )
    }

    /// True for the three output kinds evaluated last (step 3).
    pub fn is_output(self) -> bool {
        matches!(
            self,
            ChannelKind::PowerOutput | ChannelKind::HBridge | ChannelKind::CanTx
        )
    }
}

/// Tiny hand-rolled bitflags macro: the pack carries no `bitflags` crate
/// dependency anywhere, and a 5-bit set doesn't warrant pulling one in for
/// this crate alone.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn set(&mut self, other: Self, on: bool) {
                if on {
                    self.0 |= other.0;
                } else {
                    self.0 &= !other.0;
                }
            }

            pub const fn union(self, other: Self) -> Self {
                $name(self.0 | other.0)
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }
    };
}

bitflags_like! {
    /// Per-channel flag bitset.
    pub struct ChannelFlags: u8 {
        const ENABLED  = 0b0000_0001;
        const INVERTED = 0b0000_0010;
        const BUILTIN  = 0b0000_0100;
        const READONLY = 0b0000_1000;
        const FAULT    = 0b0001_0000;
    }
}

/// Fixed-point / presentation metadata for a channel's value.
#[derive(Debug, Clone)]
pub struct Display {
    pub unit: String<MAX_UNIT_LEN>,
    pub decimal_places: u8,
    pub data_type: DataType,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            unit: String::new(),
            decimal_places: 0,
            data_type: DataType::I32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    I32,
    Bool,
    U16,
}

/// Hardware device family a channel may be bound to. `None` marks a purely
/// virtual channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum HwDevice {
    None = 0,
    Adc = 1,
    Dio = 2,
    Pwm = 3,
    Profet = 4,
    HBridge = 5,
    Can = 6,
    Dac = 7,
}

#[derive(Debug, Clone, Copy)]
pub struct HwBinding {
    pub device: HwDevice,
    pub index: u8,
}

/// Kind-specific configuration and internal evaluation state, carried as a
/// tagged variant. Each payload type owns both its static parameters *and*
/// whatever per-tick state it needs (ring buffers, latch bits,
/// integrators).
#[derive(Debug, Clone)]
pub enum ChannelConfig {
    DigitalInput(DigitalInputCfg),
    AnalogInput(AnalogInputCfg),
    FrequencyInput(FrequencyInputCfg),
    CanRx(CanRxCfg),
    PowerOutput(PowerOutputCfg),
    HBridge(HBridgeCfg),
    CanTx(CanTxCfg),
    Logic(LogicCfg),
    Number(NumberCfg),
    Filter(FilterCfg),
    Timer(TimerCfg),
    Table2D(Table2DCfg),
    Table3D(Table3DCfg),
    Switch(SwitchCfg),
    Enum(EnumCfg),
    Pid(PidCfg),
    SystemReadOnly(SystemRoCfg),
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::DigitalInput(_) => ChannelKind::DigitalInput,
            ChannelConfig::AnalogInput(_) => ChannelKind::AnalogInput,
            ChannelConfig::FrequencyInput(_) => ChannelKind::FrequencyInput,
            ChannelConfig::CanRx(_) => ChannelKind::CanRx,
            ChannelConfig::PowerOutput(_) => ChannelKind::PowerOutput,
            ChannelConfig::HBridge(_) => ChannelKind::HBridge,
            ChannelConfig::CanTx(_) => ChannelKind::CanTx,
            ChannelConfig::Logic(_) => ChannelKind::Logic,
            ChannelConfig::Number(_) => ChannelKind::Number,
            ChannelConfig::Filter(_) => ChannelKind::Filter,
            ChannelConfig::Timer(_) => ChannelKind::Timer,
            ChannelConfig::Table2D(_) => ChannelKind::Table2D,
            ChannelConfig::Table3D(_) => ChannelKind::Table3D,
            ChannelConfig::Switch(_) => ChannelKind::Switch,
            ChannelConfig::Enum(_) => ChannelKind::Enum,
            ChannelConfig::Pid(_) => ChannelKind::Pid,
            ChannelConfig::SystemReadOnly(_) => ChannelKind::SystemReadOnly,
        }
    }

    /// Every channel id this config references (used to build the
    /// dependency graph at `apply_config` time).
    pub fn referenced_ids(&self) -> heapless::Vec<u16, 8> {
        let mut out = heapless::Vec::new();
        let mut push = |id: u16| {
            if id != ID_NONE {
                let _ = out.push(id);
            }
        };
        match self {
            ChannelConfig::DigitalInput(_)
            | ChannelConfig::AnalogInput(_)
            | ChannelConfig::FrequencyInput(_)
            | ChannelConfig::CanRx(_) => {}
            ChannelConfig::PowerOutput(c) => {
                push(c.source_id);
                push(c.duty_source_id);
            }
            ChannelConfig::HBridge(c) => {
                push(c.mode_source_id);
                push(c.duty_source_id);
                push(c.target_source_id);
            }
            ChannelConfig::CanTx(c) => {
                for s in c.signals.iter() {
                    push(s.source_id);
                }
            }
            ChannelConfig::Logic(c) => {
                push(c.source_a);
                push(c.source_b);
            }
            ChannelConfig::Number(c) => {
                push(c.source_a);
                push(c.source_b);
                push(c.cond_source);
            }
            ChannelConfig::Filter(c) => push(c.source_id),
            ChannelConfig::Timer(c) => {
                push(c.start_id);
                push(c.stop_id);
                push(c.reset_id);
            }
            ChannelConfig::Table2D(c) => push(c.source_id),
            ChannelConfig::Table3D(c) => {
                push(c.source_x);
                push(c.source_y);
            }
            ChannelConfig::Switch(c) => {
                push(c.input_up);
                push(c.input_down);
            }
            ChannelConfig::Enum(c) => push(c.source_id),
            ChannelConfig::Pid(c) => {
                push(c.pv_id);
                push(c.setpoint_id);
            }
            ChannelConfig::SystemReadOnly(_) => {}
        }
        out
    }
}

/// A single evaluation node.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: u16,
    pub name: String<MAX_NAME_LEN>,
    pub flags: ChannelFlags,
    pub display: Display,
    pub hw_binding: Option<HwBinding>,
    pub config: ChannelConfig,
    pub value: i32,
    pub prev_value: i32,
    pub timestamp_ms: u64,
    pub stale_since_ms: u64,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        self.config.kind()
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ChannelFlags::ENABLED)
    }

    pub fn is_readonly(&self) -> bool {
        self.flags.contains(ChannelFlags::READONLY)
    }

    /// Commits a new value for the current tick, tracking the previous
    /// value for edge detection.
    pub fn commit(&mut self, new_value: i32, now_ms: u64) {
        self.prev_value = self.value;
        self.value = new_value;
        self.timestamp_ms = now_ms;
    }

    pub fn set_fault(&mut self, fault: bool) {
        self.flags.set(ChannelFlags::FAULT, fault);
    }

    pub fn has_fault(&self) -> bool {
        self.flags.contains(ChannelFlags::FAULT)
    }
}
