//! This build script links the assembly part of the kernel (context switch,
//! GDT/TSS loading stubs) and turns `kernel-config.toml` into the `pub
//! const`s consumed by `src/config.rs`.

use std::env;
use std::fs;
use std::path::Path;

#[derive(serde::Deserialize)]
struct Config {
	nproc: usize,
	nthread: usize,
	open_max: usize,
	max_memory_maps: usize,
	sched_freq: u32,
	timer_hz: u32,
	kernel_stack_size: usize,
	user_stack_size: usize,
	tls_entries_count: usize,
	redzone_size: usize,
	max_phys_frames: usize,
}

fn generate_config(out_dir: &str) {
	let raw = fs::read_to_string("kernel-config.toml").expect("missing kernel-config.toml");
	let cfg: Config = toml::from_str(&raw).expect("invalid kernel-config.toml");

	let generated = format!(
		"pub const NPROC: usize = {};\n\
		 pub const NTHREAD: usize = {};\n\
		 pub const OPEN_MAX: usize = {};\n\
		 pub const MAX_MEMORY_MAPS: usize = {};\n\
		 pub const SCHED_FREQ: u32 = {};\n\
		 pub const TIMER_HZ: u32 = {};\n\
		 pub const KERNEL_STACK_SIZE: usize = {};\n\
		 pub const USER_STACK_SIZE: usize = {};\n\
		 pub const TLS_ENTRIES_COUNT: usize = {};\n\
		 pub const REDZONE_SIZE: usize = {};\n\
		 pub const MAX_PHYS_FRAMES: usize = {};\n",
		cfg.nproc,
		cfg.nthread,
		cfg.open_max,
		cfg.max_memory_maps,
		cfg.sched_freq,
		cfg.timer_hz,
		cfg.kernel_stack_size,
		cfg.user_stack_size,
		cfg.tls_entries_count,
		cfg.redzone_size,
		cfg.max_phys_frames,
	);
	fs::write(Path::new(out_dir).join("config.rs"), generated).expect("failed to write config.rs");
}

fn main() {
	let out_dir = env::var("OUT_DIR").unwrap();
	generate_config(&out_dir);

	cc::Build::new()
		.file("src/arch/x86/context_switch.s")
		.file("src/arch/x86/syscall_entry.s")
		.file("src/arch/x86/paging.s")
		.file("src/arch/x86/idt_entry.s")
		.compile("arch_x86");

	println!("cargo:rerun-if-changed=kernel-config.toml");
	println!("cargo:rerun-if-changed=src/arch/x86/context_switch.s");
	println!("cargo:rerun-if-changed=src/arch/x86/syscall_entry.s");
	println!("cargo:rerun-if-changed=src/arch/x86/paging.s");
	println!("cargo:rerun-if-changed=src/arch/x86/idt_entry.s");
}
