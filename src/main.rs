//! `pdm-sim` — a host-side demonstrator for the channel engine: wires up a
//! small config (a button, a throttle sensor, a bit of logic, and a
//! PROFET output driving a load), ticks it against simulated physics, and
//! prints channel values and an encoded telemetry frame each second.
//!
//! This binary exists for development and manual smoke-testing; the
//! engine itself (`pdm_core`) has no dependency on anything here.

use pdm_core::channel::{ChannelFlags, Display, HwBinding, HwDevice};
use pdm_core::collaborators::{AdcSource, CanTransmit, CanTxError, Clock, DigitalSource, StdClock};
use pdm_core::drivers::power_output::PowerOutputCfg;
use pdm_core::kinds::analog_input::{AnalogInputCfg, AnalogInputMode};
use pdm_core::kinds::digital_input::{DigitalInputCfg, DigitalInputMode};
use pdm_core::kinds::logic::{LogicCfg, LogicOp};
use pdm_core::protocol::telemetry::{section, Caps};
use pdm_core::registry::config_format::{ConfigBuilder, ParsedChannel};
use pdm_core::registry::Registry;
use pdm_core::ChannelConfig;

const DIN_BUTTON: u16 = 0;
const AIN_THROTTLE: u16 = 50;
const LOGIC_REQUEST: u16 = 400;
const POUT_PUMP: u16 = 100;

/// Simulated ADC: channel 0 is a throttle pot that sweeps 0..=4095 counts
/// over ten seconds of wall time.
struct SimAdc {
    start: std::time::Instant,
}

impl AdcSource for SimAdc {
    fn read_channel(&mut self, index: u8) -> u16 {
        if index != 0 {
            return 0;
        }
        let t = self.start.elapsed().as_millis() as u64 % 10_000;
        ((t * 4095) / 10_000) as u16
    }
}

/// Simulated digital input: the demo button is held down after 2 seconds.
struct SimDio {
    start: std::time::Instant,
}

impl DigitalSource for SimDio {
    fn read_pin(&mut self, index: u8) -> bool {
        index == 0 && self.start.elapsed().as_secs() >= 2
    }
}

/// No CAN bus in this demo; every send is accepted and discarded.
struct NullCan;

impl CanTransmit for NullCan {
    fn queue(&mut self, _bus: u8, _id: u32, _data: &[u8], _dlc: u8, _ext: bool, _fd: bool) -> Result<(), CanTxError> {
        Ok(())
    }
}

type ConfigBytes = heapless::Vec<
    u8,
    {
        pdm_core::registry::config_format::HEADER_SIZE
            + pdm_core::registry::MAX_CHANNELS * pdm_core::registry::config_format::ENTRY_SIZE
            + pdm_core::registry::config_format::STRING_BYTES_CAP
            + pdm_core::registry::config_format::PARAM_BLOB_CAP
    },
>;

fn demo_config_bytes() -> ConfigBytes {
    let mut builder = ConfigBuilder::new(1);

    let mut button = DigitalInputCfg::new(DigitalInputMode::SwitchActiveHigh, 0);
    button.debounce_ms = 20;
    let _ = builder.push(&ParsedChannel {
        id: DIN_BUTTON,
        name: heapless::String::try_from("pump_button").unwrap(),
        flags: ChannelFlags::ENABLED,
        display: Display::default(),
        hw_binding: Some(HwBinding { device: HwDevice::Dio, index: 0 }),
        config: ChannelConfig::DigitalInput(button),
    });

    let throttle = AnalogInputCfg::new(
        AnalogInputMode::Linear { min_mv: 200, max_mv: 3100, min_value: 0, max_value: 1000 },
        0,
    );
    let _ = builder.push(&ParsedChannel {
        id: AIN_THROTTLE,
        name: heapless::String::try_from("throttle_pct").unwrap(),
        flags: ChannelFlags::ENABLED,
        display: Display::default(),
        hw_binding: Some(HwBinding { device: HwDevice::Adc, index: 0 }),
        config: ChannelConfig::AnalogInput(throttle),
    });

    let mut request = LogicCfg::new(LogicOp::And);
    request.source_a = DIN_BUTTON;
    request.source_b = AIN_THROTTLE;
    let _ = builder.push(&ParsedChannel {
        id: LOGIC_REQUEST,
        name: heapless::String::try_from("pump_request").unwrap(),
        flags: ChannelFlags::ENABLED,
        display: Display::default(),
        hw_binding: None,
        config: ChannelConfig::Logic(request),
    });

    let mut pump = PowerOutputCfg::new();
    pump.source_id = LOGIC_REQUEST;
    pump.soft_start_ms = 200;
    pump.current_limit_ma = 15_000;
    let _ = builder.push(&ParsedChannel {
        id: POUT_PUMP,
        name: heapless::String::try_from("pump_out").unwrap(),
        flags: ChannelFlags::ENABLED,
        display: Display::default(),
        hw_binding: Some(HwBinding { device: HwDevice::Profet, index: 0 }),
        config: ChannelConfig::PowerOutput(pump),
    });

    builder.build()
}

fn main() {
    let mut registry = Registry::new();
    let bytes = demo_config_bytes();
    registry.apply_config(&bytes).expect("demo configuration must validate");

    let clock = StdClock::new();
    let mut adc = SimAdc { start: std::time::Instant::now() };
    let mut dio = SimDio { start: std::time::Instant::now() };
    let mut can = NullCan;

    let caps = Caps { profet_count: 1, adc_count: 1, din_count: 1, ..Default::default() };
    let sections = section::OUTPUTS | section::CURRENTS | section::VIRTUALS | section::FAULTS;

    println!("pdm-sim: {} channels loaded, config_version={}", registry.len(), registry.config_version());

    let mut last_tick_ms = clock.now_ms();
    let mut seq = 0u32;
    loop {
        let now_ms = clock.now_ms();
        let dt_ms = (now_ms - last_tick_ms).max(1) as u32;
        last_tick_ms = now_ms;

        registry.tick(now_ms, dt_ms, &mut adc, &mut dio, &mut can, 12_800, 25.0, 30.0);

        let mut buf = [0u8; 256];
        let len = registry
            .build_telemetry(&mut buf, &caps, sections, seq, now_ms as u32, 12_800, 300)
            .unwrap_or(0);
        seq = seq.wrapping_add(1);

        println!(
            "t={now_ms:>6}ms throttle={:>4} request={} pump={:>4}/1000 telemetry={len}B",
            registry.get_value(AIN_THROTTLE).unwrap_or(0),
            registry.get_value(LOGIC_REQUEST).unwrap_or(0),
            registry.get_value(POUT_PUMP).unwrap_or(0),
        );

        if now_ms > 8_000 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
}
