//! The 8253/8254 Programmable Interval Timer: the kernel's only source
//! of a periodic tick, driving `process::scheduler::tick`'s alarm
//! decrement, sleeper wakeup, and quantum countdown through IRQ0.
//!
//! Grounded in `examples/maestro-os-maestro/src/pit/mod.rs` for the
//! port layout and command-byte constants, reduced to channel 0 running
//! continuously at `config::TIMER_HZ` (the original's beeper on channel
//! 2 and one-shot channel-0 modes are both a device-driver concern out
//! of scope here).

use crate::config::TIMER_HZ;
use crate::io;

const CHANNEL_0: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Select channel 0, access mode "low byte then high byte", mode 3
/// (square wave generator, which is what produces a periodic IRQ0 in
/// continuous operation).
const CHANNEL0_LOBYTE_HIBYTE_MODE3: u8 = 0b0011_0110;

/// The PIT's fixed input clock frequency, in Hz.
const BASE_FREQUENCY: u32 = 1_193_182;

/// Programs channel 0 to fire IRQ0 at `config::TIMER_HZ`.
pub fn init() {
	let divisor = (BASE_FREQUENCY / TIMER_HZ).clamp(1, u16::MAX as u32) as u16;
	unsafe {
		io::outb(COMMAND, CHANNEL0_LOBYTE_HIBYTE_MODE3);
		io::outb(CHANNEL_0, (divisor & 0xff) as u8);
		io::outb(CHANNEL_0, (divisor >> 8) as u8);
	}
}
