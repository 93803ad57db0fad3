//! Telemetry packet assembly — fixed 16-byte header, then a fixed
//! section order gated by a capability-aware `sections` bitmask.

use heapless::Vec;
use packed_struct::prelude::*;

pub const HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Default)]
pub struct Caps {
    pub profet_count: u8,
    pub hbridge_count: u8,
    pub adc_count: u8,
    pub din_count: u8,
    pub can_count: u8,
    pub freq_count: u8,
    pub pwm_count: u8,
    pub dac_count: u8,
    pub max_channels: u16,
    pub max_logic: u16,
    pub max_timers: u16,
    pub max_tables: u16,
    pub flash_size_kb: u16,
    pub ram_size_kb: u16,
    pub max_current_ma: u32,
    pub per_channel_ma: u32,
    pub hbridge_current_ma: u32,
    pub features: FeatureBits,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBits {
    pub pid: bool,
    pub tables2d: bool,
    pub tables3d: bool,
    pub logic: bool,
    pub timers: bool,
    pub filters: bool,
    pub math: bool,
    pub datalog: bool,
    pub can_stream: bool,
}

pub mod section {
    pub const OUTPUTS: u16 = 0x0002;
    pub const CURRENTS: u16 = 0x0004;
    pub const ADC: u16 = 0x0008;
    pub const DIN: u16 = 0x0010;
    pub const HBRIDGE: u16 = 0x0020;
    pub const VIRTUALS: u16 = 0x0040;
    pub const FAULTS: u16 = 0x0080;
    pub const EXTENDED: u16 = 0x0100;

    /// Fixed build/parse order, independent of bit order in the mask.
    pub const ORDER: [u16; 8] = [OUTPUTS, CURRENTS, ADC, DIN, HBRIDGE, VIRTUALS, FAULTS, EXTENDED];
}

#[derive(PackedStruct, Debug, Clone, Copy)]
#[packed_struct(endian = "lsb")]
pub struct TelemetryHeader {
    pub seq: u32,
    pub timestamp_ms: u32,
    pub voltage_mv: u16,
    pub mcu_temp_c10: i16,
    pub sections: u16,
    pub reserved: u16,
}

impl TelemetryHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        self.pack().expect("TelemetryHeader is plain byte-aligned fields")
    }
}

/// One virtual-channel sample, `{id:u16, value:i32}` in the `Virtuals`
/// section.
#[derive(Debug, Clone, Copy)]
pub struct VirtualSample {
    pub id: u16,
    pub value: i32,
}

#[derive(PackedStruct, Debug, Clone, Copy)]
#[packed_struct(endian = "lsb")]
pub struct HBridgeTelemetry {
    pub mode: u8,
    pub duty: u16,
    pub current_ma: u16,
    pub pos: u16,
    pub flags: u8,
}

impl HBridgeTelemetry {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        self.pack().expect("HBridgeTelemetry is plain byte-aligned fields")
    }
}

/// All the data the builder needs, gathered by the registry each tick:
/// the builder owns the output buffer but reads these snapshots rather
/// than reaching into the registry itself.
pub struct TelemetrySnapshot<'a> {
    pub output_states: &'a [u8],
    pub output_currents_ma: &'a [u16],
    pub adc_mv: &'a [u16],
    pub din_bits: &'a [bool],
    pub hbridges: &'a [HBridgeTelemetry],
    pub virtuals: &'a [VirtualSample],
    pub fault_flags: u32,
}

/// Deterministic size of the section list for `caps`/`sections`, usable
/// to pre-allocate before [`build`] runs.
pub fn calc_size(caps: &Caps, sections: u16, virtual_count: u16) -> usize {
    let mut size = HEADER_SIZE;
    if sections & section::OUTPUTS != 0 {
        size += caps.profet_count as usize;
    }
    if sections & section::CURRENTS != 0 {
        size += caps.profet_count as usize * 2;
    }
    if sections & section::ADC != 0 {
        size += caps.adc_count as usize * 2;
    }
    if sections & section::DIN != 0 {
        size += (caps.din_count as usize + 7) / 8;
    }
    if sections & section::HBRIDGE != 0 {
        size += caps.hbridge_count as usize * HBridgeTelemetry::SIZE;
    }
    if sections & section::VIRTUALS != 0 {
        size += 2 + virtual_count as usize * 6;
    }
    if sections & section::FAULTS != 0 {
        size += 4;
    }
    // Extended is device-defined; a capability-less crate reports it as
    // zero-length unless a caller overrides.
    size
}

/// Builds the telemetry packet into `buf`, writing sections in their
/// fixed order regardless of bit order in `sections`. Returns the
/// number of bytes written, or `None` if `buf` is too small.
pub fn build(
    buf: &mut [u8],
    header: &TelemetryHeader,
    caps: &Caps,
    sections: u16,
    snapshot: &TelemetrySnapshot,
) -> Option<usize> {
    let needed = calc_size(caps, sections, snapshot.virtuals.len() as u16);
    if buf.len() < needed {
        return None;
    }

    let mut pos = 0usize;
    buf[pos..pos + HEADER_SIZE].copy_from_slice(&header.to_bytes());
    pos += HEADER_SIZE;

    if sections & section::OUTPUTS != 0 {
        let n = caps.profet_count as usize;
        for i in 0..n {
            buf[pos] = *snapshot.output_states.get(i).unwrap_or(&0);
            pos += 1;
        }
    }
    if sections & section::CURRENTS != 0 {
        let n = caps.profet_count as usize;
        for i in 0..n {
            let ma = *snapshot.output_currents_ma.get(i).unwrap_or(&0);
            buf[pos..pos + 2].copy_from_slice(&ma.to_le_bytes());
            pos += 2;
        }
    }
    if sections & section::ADC != 0 {
        let n = caps.adc_count as usize;
        for i in 0..n {
            let mv = *snapshot.adc_mv.get(i).unwrap_or(&0);
            buf[pos..pos + 2].copy_from_slice(&mv.to_le_bytes());
            pos += 2;
        }
    }
    if sections & section::DIN != 0 {
        let bytes_needed = (caps.din_count as usize + 7) / 8;
        for byte_i in 0..bytes_needed {
            let mut b = 0u8;
            for bit in 0..8 {
                let idx = byte_i * 8 + bit;
                if idx < snapshot.din_bits.len() && snapshot.din_bits[idx] {
                    b |= 1 << bit;
                }
            }
            buf[pos] = b;
            pos += 1;
        }
    }
    if sections & section::HBRIDGE != 0 {
        let n = caps.hbridge_count as usize;
        for i in 0..n {
            let hb = snapshot.hbridges.get(i).copied().unwrap_or(HBridgeTelemetry {
                mode: 0,
                duty: 0,
                current_ma: 0,
                pos: 0,
                flags: 0,
            });
            let bytes = hb.to_bytes();
            buf[pos..pos + HBridgeTelemetry::SIZE].copy_from_slice(&bytes);
            pos += HBridgeTelemetry::SIZE;
        }
    }
    if sections & section::VIRTUALS != 0 {
        let count = snapshot.virtuals.len() as u16;
        buf[pos..pos + 2].copy_from_slice(&count.to_le_bytes());
        pos += 2;
        for v in snapshot.virtuals {
            buf[pos..pos + 2].copy_from_slice(&v.id.to_le_bytes());
            pos += 2;
            buf[pos..pos + 4].copy_from_slice(&v.value.to_le_bytes());
            pos += 4;
        }
    }
    if sections & section::FAULTS != 0 {
        buf[pos..pos + 4].copy_from_slice(&snapshot.fault_flags.to_le_bytes());
        pos += 4;
    }

    Some(pos)
}

/// Owned variant of [`build`] returning a fresh buffer, for callers (and
/// tests) that don't want to pre-allocate.
pub fn build_owned(header: &TelemetryHeader, caps: &Caps, sections: u16, snapshot: &TelemetrySnapshot) -> Vec<u8, 2048> {
    let mut buf = [0u8; 2048];
    let len = build(&mut buf, header, caps, sections, snapshot).unwrap_or(0);
    let mut out = Vec::new();
    out.extend_from_slice(&buf[..len]).ok();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> Caps {
        Caps {
            profet_count: 2,
            hbridge_count: 1,
            adc_count: 3,
            din_count: 10,
            ..Default::default()
        }
    }

    #[test]
    fn calc_size_matches_build_len() {
        let caps = caps();
        let sections = section::OUTPUTS | section::CURRENTS | section::ADC | section::DIN | section::HBRIDGE | section::FAULTS;
        let header = TelemetryHeader { seq: 1, timestamp_ms: 0, voltage_mv: 13_000, mcu_temp_c10: 250, sections, reserved: 0 };
        let snapshot = TelemetrySnapshot {
            output_states: &[1, 0],
            output_currents_ma: &[500, 0],
            adc_mv: &[1000, 2000, 3000],
            din_bits: &[true; 10],
            hbridges: &[HBridgeTelemetry { mode: 1, duty: 500, current_ma: 200, pos: 10, flags: 0 }],
            virtuals: &[],
            fault_flags: 0,
        };
        let expected = calc_size(&caps, sections, 0);
        let mut buf = [0u8; 256];
        let len = build(&mut buf, &header, &caps, sections, &snapshot).unwrap();
        assert_eq!(len, expected);
    }

    #[test]
    fn virtuals_section_includes_count_prefix() {
        let caps = caps();
        let sections = section::VIRTUALS;
        let header = TelemetryHeader { seq: 0, timestamp_ms: 0, voltage_mv: 0, mcu_temp_c10: 0, sections, reserved: 0 };
        let virtuals = [VirtualSample { id: 400, value: 42 }, VirtualSample { id: 401, value: -5 }];
        let snapshot = TelemetrySnapshot {
            output_states: &[],
            output_currents_ma: &[],
            adc_mv: &[],
            din_bits: &[],
            hbridges: &[],
            virtuals: &virtuals,
            fault_flags: 0,
        };
        let out = build_owned(&header, &caps, sections, &snapshot);
        assert_eq!(out.len(), HEADER_SIZE + 2 + 2 * 6);
        let count = u16::from_le_bytes([out[HEADER_SIZE], out[HEADER_SIZE + 1]]);
        assert_eq!(count, 2);
    }

    #[test]
    fn buffer_too_small_reports_none() {
        let caps = caps();
        let sections = section::FAULTS;
        let header = TelemetryHeader { seq: 0, timestamp_ms: 0, voltage_mv: 0, mcu_temp_c10: 0, sections, reserved: 0 };
        let snapshot = TelemetrySnapshot {
            output_states: &[],
            output_currents_ma: &[],
            adc_mv: &[],
            din_bits: &[],
            hbridges: &[],
            virtuals: &[],
            fault_flags: 0,
        };
        let mut tiny = [0u8; 4];
        assert!(build(&mut tiny, &header, &caps, sections, &snapshot).is_none());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(256))]
        #[test]
        fn calc_size_matches_build_len_for_any_caps_and_sections(
            profet_count in 0u8..=16,
            hbridge_count in 0u8..=8,
            adc_count in 0u8..=16,
            din_count in 0u8..=16,
            sections_bits in proptest::prelude::any::<u16>(),
            virtual_count in 0usize..=16,
        ) {
            let caps = Caps { profet_count, hbridge_count, adc_count, din_count, ..Default::default() };
            let sections = sections_bits & section::ORDER.iter().fold(0u16, |acc, &bit| acc | bit);

            let mut virtuals: Vec<VirtualSample, 16> = Vec::new();
            for i in 0..virtual_count as u16 {
                let _ = virtuals.push(VirtualSample { id: i, value: i as i32 });
            }
            let snapshot = TelemetrySnapshot {
                output_states: &[],
                output_currents_ma: &[],
                adc_mv: &[],
                din_bits: &[],
                hbridges: &[],
                virtuals: &virtuals,
                fault_flags: 0,
            };
            let header = TelemetryHeader { seq: 0, timestamp_ms: 0, voltage_mv: 0, mcu_temp_c10: 0, sections, reserved: 0 };

            let expected = calc_size(&caps, sections, virtual_count as u16);
            let mut buf = [0u8; 4096];
            let len = build(&mut buf, &header, &caps, sections, &snapshot).unwrap();
            proptest::prop_assert_eq!(len, expected);
        }
    }
}
