//! Interfaces the engine consumes from its host environment. On the device
//! these are implemented against real peripherals; on the host emulator
//! they're implemented against simulated physics or recorded traces. The
//! engine never names a concrete peripheral type, only these traits, which
//! is what keeps it portable between the two.

/// 12-bit ADC source, 0..=4095 counts.
pub trait AdcSource {
    fn read_channel(&mut self, index: u8) -> u16;
}

/// Digital input source.
pub trait DigitalSource {
    fn read_pin(&mut self, index: u8) -> bool;
}

/// Outcome of queuing a CAN transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanTxError {
    BusOff,
    QueueFull,
}

/// CAN transmit side.
pub trait CanTransmit {
    fn queue(
        &mut self,
        bus: u8,
        id: u32,
        data: &[u8],
        dlc: u8,
        is_extended: bool,
        is_fd: bool,
    ) -> Result<(), CanTxError>;
}

/// CAN receive side: an upcall the engine drives during `tick` when the host
/// has frames ready. Hosts own the actual bus driver and decide when to
/// invoke `on_frame`; the engine only reacts to what's handed to it.
pub trait CanReceive {
    fn on_frame(&mut self, bus: u8, id: u32, data: &[u8], dlc: u8, is_extended: bool);
}

/// Non-blocking transport used to ship protocol frames to the host link.
/// Returns `false` (drops the write) if the send ring is full: bounded
/// memory over perfect delivery.
pub trait TransportSend {
    fn send(&mut self, bytes: &[u8]) -> bool;
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        /// Host-side monotonic clock backed by `std::time::Instant`. Only
        /// available on a `std` build (the emulator and `pdm-sim`); an
        /// embedded build supplies its own `Clock` impl over a hardware
        /// timer instead.
        pub struct StdClock {
            origin: std::time::Instant,
        }

        impl StdClock {
            pub fn new() -> Self {
                Self { origin: std::time::Instant::now() }
            }
        }

        impl Default for StdClock {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Clock for StdClock {
            fn now_ms(&self) -> u64 {
                self.origin.elapsed().as_millis() as u64
            }
        }
    }
}
