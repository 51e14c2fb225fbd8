//! Kernel panic handling: a Rust-level panic and a fatal CPU exception
//! both end up here, print what's known about the failure, and halt.
//! There is no recovery path — a panicking kernel has already violated
//! an invariant it can't reason past.
//!
//! Grounded in `examples/maestro-os-maestro/src/panic.rs` (message
//! format, `cr2` dump); the debug/release `kernel_mode` cfg split that
//! file carries for an extra callstack dump is dropped here, since
//! nothing in this core wires a `kernel_mode` cfg to begin with.

use core::arch::asm;
use core::fmt;
use core::panic::PanicInfo;

/// Stops the CPU for good via `cli; hlt` in a loop (a single `hlt` can
/// return on a pending unmasked interrupt; there are none left to mask
/// once `cli` has run, but the loop costs nothing and removes any doubt).
pub(crate) fn halt() -> ! {
	unsafe {
		loop {
			asm!("cli", "hlt", options(nomem, nostack));
		}
	}
}

fn banner(reason: fmt::Arguments) {
	crate::println!("--- KERNEL PANIC ---");
	crate::println!("{}", reason);
	unsafe {
		crate::println!("cr2 = {:#x}", crate::memory::cr2_get());
	}
}

/// Called from `idt::user_interrupt`/`idt::kernel_interrupt` for a CPU
/// exception with no sane recovery (a double fault, a machine check, or
/// any exception trapped from kernel mode): unlike a Rust panic there is
/// no `PanicInfo` location, just the reason string the caller supplies.
pub fn fatal(reason: &str) -> ! {
	banner(format_args!("{}", reason));
	halt();
}

#[panic_handler]
fn rust_panic(info: &PanicInfo) -> ! {
	banner(format_args!("{}", info));
	halt();
}
