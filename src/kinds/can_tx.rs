//! CanTx — packs configured signals into a frame on a cycle edge or
//! on demand.

use heapless::Vec;

use crate::kinds::can_rx::ByteOrder;

pub const MAX_SIGNALS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct TxSignal {
    pub source_id: u16,
    pub start_bit: u16,
    pub length: u8,
    pub byte_order: ByteOrder,
    pub multiplier: i32,
}

#[derive(Debug, Clone)]
pub struct CanTxCfg {
    pub bus: u8,
    pub message_id: u32,
    pub cycle_ms: u32,
    pub dlc: u8,
    pub is_extended: bool,
    pub is_fd: bool,
    pub signals: Vec<TxSignal, MAX_SIGNALS>,

    // --- state ---
    pub last_send_ms: u64,
    pub pending_send: bool,
}

impl CanTxCfg {
    pub fn new(bus: u8, message_id: u32, cycle_ms: u32, dlc: u8) -> Self {
        Self {
            bus,
            message_id,
            cycle_ms,
            dlc,
            is_extended: false,
            is_fd: false,
            signals: Vec::new(),
            last_send_ms: 0,
            pending_send: false,
        }
    }

    /// Returns `Some(payload)` when this tick's cycle edge (or an on-demand
    /// send request) fires, packing each signal's current value into the
    /// frame, applying each signal's scaling multiplier before
    /// transmission.
    pub fn tick(&mut self, now_ms: u64, source_values: &[i32]) -> Option<[u8; 8]> {
        let due = self.cycle_ms > 0 && now_ms.saturating_sub(self.last_send_ms) >= self.cycle_ms as u64;
        if !due && !self.pending_send {
            return None;
        }
        self.last_send_ms = now_ms;
        self.pending_send = false;

        let mut word: u64 = 0;
        for (sig, value) in self.signals.iter().zip(source_values.iter()) {
            let scaled = (*value as i64) * sig.multiplier as i64;
            let length = sig.length.min(64);
            let mask: u64 = if length == 64 { u64::MAX } else { (1u64 << length) - 1 };
            word |= ((scaled as u64) & mask) << sig.start_bit;
        }

        let mut payload = [0u8; 8];
        let bytes = match self.signals.first().map(|s| s.byte_order) {
            Some(ByteOrder::Be) => word.to_be_bytes(),
            _ => word.to_le_bytes(),
        };
        payload.copy_from_slice(&bytes);
        Some(payload)
    }

    pub fn request_send(&mut self) {
        self.pending_send = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_single_signal_with_multiplier() {
        let mut cfg = CanTxCfg::new(1, 0x300, 10, 8);
        cfg.signals
            .push(TxSignal {
                source_id: 500,
                start_bit: 0,
                length: 16,
                byte_order: ByteOrder::Le,
                multiplier: 10,
            })
            .unwrap();
        let payload = cfg.tick(0, &[5]).unwrap();
        assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), 50);
    }

    #[test]
    fn respects_cycle_period() {
        let mut cfg = CanTxCfg::new(1, 0x300, 100, 8);
        assert!(cfg.tick(0, &[]).is_some());
        assert!(cfg.tick(50, &[]).is_none());
        assert!(cfg.tick(150, &[]).is_some());
    }
}
