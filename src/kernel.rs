//! The kernel core, compiled as a `dylib` so it can also be linked by
//! `src/bin.rs` as the final executable — matching the teacher's own
//! reason for the split (kernel modules, out of scope here, are loaded
//! as separate objects against the same library).
//!
//! Early boot (entering protected mode, enabling paging, building the
//! GDT, parsing the bootloader's memory map) runs before
//! [`kernel_main`] and is out of scope for this crate; what boot hands
//! off is a physical frame range already carved out for
//! [`memory::phys`] and a raw ASCII command line, the same division of
//! labor the teacher's `kernel_main(magic, multiboot_ptr)` draws against
//! its own (in-scope-there) multiboot parser.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(crate::selftest::runner)]
#![reexport_test_harness_main = "test_main"]

pub mod cmdline;
pub mod config;
pub mod console;
pub mod elf;
pub mod errno;
pub mod file;
pub mod fs;
pub mod gdt;
pub mod idt;
pub mod io;
pub mod logger;
pub mod memory;
pub mod panic;
pub mod pit;
pub mod process;
pub mod selftest;
pub mod syscall;
pub mod util;

use memory::phys;
use process::exec;
use process::scheduler;

const KERNEL_VERSION: &str = "0.1.0";
/// Fallback init binary path, used when the command line carries no
/// `-init`.
const DEFAULT_INIT: &[u8] = b"/sbin/init";

/// Entry point called by the boot contract once protected mode, paging,
/// and the GDT are already live: `mem_base_frame`/`mem_frame_count`
/// describe the physical frames available to [`memory::phys`] (above the
/// kernel image, already excluded by whatever built this range), and
/// `cmdline_ptr`/`cmdline_len` is the raw ASCII command line boot passed
/// through, parsed by [`cmdline::ArgsParser`].
#[no_mangle]
pub extern "C" fn kernel_main(mem_base_frame: u32, mem_frame_count: usize, cmdline_ptr: *const u8, cmdline_len: usize) {
	console::init();

	let raw_cmdline = unsafe { core::slice::from_raw_parts(cmdline_ptr, cmdline_len) };
	let args = cmdline::ArgsParser::parse(raw_cmdline).unwrap_or_else(|e| {
		crate::println!("{}", e);
		panic::fatal("invalid kernel command line");
	});

	logger::init(args.is_silent());
	crate::println!("booting kernel version {}", KERNEL_VERSION);

	phys::init(mem_base_frame, mem_frame_count);
	idt::init();
	pit::init();
	process::tss::init();

	if let Some((major, minor)) = args.root_dev() {
		exec::set_root_dev(((major as u16) << 8) | minor as u16);
	}

	let idle_stack = process::alloc_kernel_stack(process::IDLE_TID).unwrap_or_else(|_| panic::fatal("failed to allocate idle kernel stack"));
	process::init_idle_thread(idle_stack).unwrap_or_else(|_| panic::fatal("failed to install idle thread"));

	let init_pdir = memory::vmem::new_address_space().unwrap_or_else(|_| panic::fatal("failed to build init's address space"));
	let init_stack = process::alloc_kernel_stack(process::pid::INIT_PID).unwrap_or_else(|_| panic::fatal("failed to allocate init's kernel stack"));
	let (init_proc, init_thread) =
		process::bootstrap_init(init_pdir, init_stack).unwrap_or_else(|_| panic::fatal("failed to install init process"));

	let init_path = args.init_path().unwrap_or(DEFAULT_INIT);
	if exec::bootstrap_exec(&init_proc, &init_thread, init_path).is_err() {
		panic::fatal("failed to load init binary");
	}

	#[cfg(test)]
	test_main();

	// `schedule` never returns: the first dispatch drops straight into
	// init's entry point in user mode, and every later tick/yield
	// switches between whichever threads the process/thread tables hold
	// from here on.
	scheduler::schedule();
	unreachable!("schedule() does not return to its caller");
}
