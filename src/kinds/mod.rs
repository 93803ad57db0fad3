//! The behavioral contracts of every channel variant. Each submodule owns
//! one kind's configuration struct,
//! its per-tick evaluation state, and its `eval` function. `registry::tick`
//! dispatches into these by matching on `ChannelConfig`.

pub mod analog_input;
pub mod can_rx;
pub mod can_tx;
pub mod digital_input;
pub mod enum_ch;
pub mod filter;
pub mod frequency_input;
pub mod logic;
pub mod number;
pub mod pid;
pub mod switch;
pub mod system_ro;
pub mod table;
pub mod timer;

/// Clamp `v` to `[-(10^dp), ...]`-free signed domain: no kind ever needs
/// more than a plain integer clamp, but several need it with differing
/// bounds, so it lives here once.
pub fn clamp_i32(v: i64, lo: i32, hi: i32) -> i32 {
    if v < lo as i64 {
        lo
    } else if v > hi as i64 {
        hi
    } else {
        v as i32
    }
}
