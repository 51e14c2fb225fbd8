//! Self-testing: unit and integration tests that run on the kernel
//! itself rather than against a hosted `std`, since there's no other
//! environment `#[no_std]` code this close to the hardware can run
//! under. The kernel can't reset itself between tests, so a test that
//! corrupts shared state (a table, a lock) can make a later one pass or
//! fail for the wrong reason; keep tests independent of each other's
//! side effects where at all possible.
//!
//! Grounded in `examples/maestro-os-maestro/src/selftest.rs`'s
//! `Testable`/`runner` shape; the QEMU-exit path that file gates behind
//! `config_debug_qemu` is dropped here since nothing in this build wires
//! that cfg or an `outl`-capable exit port.

use core::any::type_name;

static mut RUNNING: bool = false;

/// Anything `#[test_case]` can point at; implemented for every `Fn()`
/// closure or fn item so a bare `fn foo() { assert!(...) }` qualifies.
pub trait Testable {
	fn run(&self);
}

impl<T: Fn()> Testable for T {
	fn run(&self) {
		crate::println!("test {} ...", type_name::<T>());
		self();
	}
}

/// The `#[test_runner]` target: runs every collected test in sequence,
/// then halts (there is nothing else for a test build to do once done).
pub fn runner(tests: &[&dyn Testable]) {
	crate::println!("running {} tests", tests.len());
	unsafe {
		RUNNING = true;
	}
	for t in tests {
		t.run();
	}
	unsafe {
		RUNNING = false;
	}
	crate::println!("all tests passed");
	crate::panic::halt();
}

/// Whether `runner` is currently driving the test suite; consulted by
/// code paths that behave differently under test (e.g. to avoid
/// blocking forever on hardware that a test environment doesn't have).
pub fn is_running() -> bool {
	unsafe { RUNNING }
}
