//! The Interrupt Descriptor Table: gate construction for the 32 CPU
//! exception vectors, the 16 PIC IRQ lines remapped onto 0x20-0x2f, and
//! the syscall trap gate at 0xFF, plus the two dispatch points every
//! `arch::x86::idt_entry` stub calls into (`user_interrupt` for a trap
//! from ring 3, `kernel_interrupt` for one that never left ring 0).
//!
//! Early boot already switched the CPU into protected mode and enabled
//! paging before handing off to [`crate::kernel_main`]; building and
//! loading this table is this core's own responsibility, the same way
//! loading the GDT the boot contract built is not.
//!
//! Grounded in `examples/maestro-os-maestro/src/idt/mod.rs`/`pic.rs`
//! for the module split and remap offsets, and on this core's own
//! `memory::vmem::handle_fault`/`process::mem_space` for what the page
//! fault vector actually does once it's reachable.

pub mod pic;

use crate::errno::Errno;
use crate::fs;
use crate::gdt;
use crate::memory::vmem::{self, FaultAction, FaultIntent};
use crate::memory::PAGE_SIZE;
use crate::process::regs::Regs;
use crate::process::signal::{self, SigNum};
use crate::process;

/// Where the master PIC's IRQ lines land once remapped; IRQs 0-7 occupy
/// `IRQ_BASE..IRQ_BASE+8`, IRQs 8-15 (the slave PIC) the 8 vectors after
/// that. Chosen past the last CPU exception vector (31) with room to
/// spare before the syscall gate at 0xFF.
pub const IRQ_BASE: u8 = 0x20;
/// The vector this core's `int 0xFF` syscall trap is wired to; matches
/// the immediate `arch::x86::syscall_entry.s`'s callers (and the
/// `#[syscall]`-generated dispatch, via `eax`) already assume.
pub const SYSCALL_VECTOR: u8 = 0xff;

const GATE_PRESENT: u8 = 1 << 7;
/// 32-bit interrupt gate (clears IF on entry, unlike a trap gate).
const GATE_TYPE_INTERRUPT32: u8 = 0xe;

fn gate_type_attr(dpl: u8) -> u8 {
	GATE_PRESENT | (dpl << 5) | GATE_TYPE_INTERRUPT32
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct Entry {
	offset_low: u16,
	selector: u16,
	zero: u8,
	type_attr: u8,
	offset_high: u16,
}

impl Entry {
	const fn missing() -> Self {
		Self {
			offset_low: 0,
			selector: 0,
			zero: 0,
			type_attr: 0,
			offset_high: 0,
		}
	}

	fn new(handler: u32, selector: u16, type_attr: u8) -> Self {
		Self {
			offset_low: (handler & 0xffff) as u16,
			selector,
			zero: 0,
			type_attr,
			offset_high: (handler >> 16) as u16,
		}
	}
}

#[repr(C, packed)]
struct IdtPtr {
	limit: u16,
	base: u32,
}

static mut IDT: [Entry; 256] = [Entry::missing(); 256];

// The stub labels are defined in `arch/x86/idt_entry.s`; listing them
// out here is the only way to get their addresses into `init` below
// without a link-time table, matching `syscall_entry`'s same FFI-address
// idiom.
extern "C" {
	fn isr0();
	fn isr1();
	fn isr2();
	fn isr3();
	fn isr4();
	fn isr5();
	fn isr6();
	fn isr7();
	fn isr8();
	fn isr9();
	fn isr10();
	fn isr11();
	fn isr12();
	fn isr13();
	fn isr14();
	fn isr15();
	fn isr16();
	fn isr17();
	fn isr18();
	fn isr19();
	fn isr20();
	fn isr21();
	fn isr22();
	fn isr23();
	fn isr24();
	fn isr25();
	fn isr26();
	fn isr27();
	fn isr28();
	fn isr29();
	fn isr30();
	fn isr31();
	fn irq0();
	fn irq1();
	fn irq2();
	fn irq3();
	fn irq4();
	fn irq5();
	fn irq6();
	fn irq7();
	fn irq8();
	fn irq9();
	fn irq10();
	fn irq11();
	fn irq12();
	fn irq13();
	fn irq14();
	fn irq15();
	fn syscall_entry();
}

/// Builds the IDT, remaps the PIC so IRQs no longer collide with CPU
/// exception vectors, masks every IRQ line but the PIT's, and loads the
/// table with `lidt`. Must run after `gdt`'s segments are in place (the
/// gates below all target [`gdt::KERNEL_CODE_OFFSET`]) and before
/// interrupts are ever enabled.
pub fn init() {
	let isrs: [unsafe extern "C" fn(); 32] = [
		isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7, isr8, isr9, isr10, isr11, isr12, isr13, isr14, isr15, isr16,
		isr17, isr18, isr19, isr20, isr21, isr22, isr23, isr24, isr25, isr26, isr27, isr28, isr29, isr30, isr31,
	];
	let irqs: [unsafe extern "C" fn(); 16] = [
		irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11, irq12, irq13, irq14, irq15,
	];

	let selector = gdt::selector(gdt::KERNEL_CODE_OFFSET, 0);
	unsafe {
		for (i, f) in isrs.iter().enumerate() {
			IDT[i] = Entry::new(*f as usize as u32, selector, gate_type_attr(0));
		}
		for (i, f) in irqs.iter().enumerate() {
			IDT[IRQ_BASE as usize + i] = Entry::new(*f as usize as u32, selector, gate_type_attr(0));
		}
		IDT[SYSCALL_VECTOR as usize] = Entry::new(syscall_entry as usize as u32, selector, gate_type_attr(3));

		let ptr = IdtPtr {
			limit: (core::mem::size_of_val(&IDT) - 1) as u16,
			base: IDT.as_ptr() as u32,
		};
		core::arch::asm!("lidt [{0}]", in(reg) &ptr, options(nomem, nostack, preserves_flags));
	}

	pic::init(IRQ_BASE, IRQ_BASE + 8);
	pic::mask_all_except(0);
}

/// Maps a CPU exception vector to the signal a Unix process would
/// expect to receive for it. Vectors not listed either can't reach user
/// mode with a sensible process-level meaning (alignment checks,
/// reserved vectors) or are handled before this table is ever consulted
/// (14, the page fault).
fn exception_signal(vector: u32) -> SigNum {
	match vector {
		0 => signal::SIGFPE,
		1 | 3 => signal::SIGTRAP,
		4 | 5 | 13 => signal::SIGSEGV,
		6 => signal::SIGILL,
		7 | 16 | 19 => signal::SIGFPE,
		9 | 11 | 12 | 17 => signal::SIGBUS,
		_ => signal::SIGSEGV,
	}
}

/// Resolves a page fault against the faulting process's memory-map
/// records, demand-paging in a mapped-but-not-yet-present page, growing
/// a stack, or reclaiming/copying a copy-on-write page; anything else is
/// reported as [`FaultAction::Unhandled`] so the caller can signal
/// `SIGSEGV` instead.
fn run_page_fault(error_code: u32) -> Result<FaultAction, Errno> {
	let addr = unsafe { crate::memory::cr2_get() };
	let write = error_code & 0b010 != 0;
	let present = error_code & 0b001 != 0;

	let Some(proc) = process::current_proc() else {
		return Ok(FaultAction::Unhandled);
	};

	vmem::handle_fault(
		addr,
		write,
		present,
		|page| {
			let p = proc.lock();
			match p.mem_space.find(page) {
				Some(m) if m.flags & crate::process::mem_space::STACK != 0 && page == m.base.wrapping_sub(PAGE_SIZE as u32) => {
					FaultIntent::GrowStack
				}
				Some(m) => {
					let writable = m.flags & crate::process::mem_space::WRITABLE != 0;
					let rel = (page - m.base) as u64;
					if rel < m.size as u64 {
						let len = if rel < m.file_size as u64 {
							(m.file_size as u64 - rel).min(PAGE_SIZE as u64) as usize
						} else {
							0
						};
						FaultIntent::DemandPage {
							file_offset: m.file_offset + rel,
							len,
							writable,
						}
					} else {
						FaultIntent::Unmapped
					}
				}
				None => FaultIntent::Unmapped,
			}
		},
		|page, file_offset, len| {
			// Zero the whole page first: a demand-paged page always starts
			// clean, whether or not any of it is backed by file content (a
			// segment's tail page mixes file bytes with zero-fill bss).
			let buf = unsafe { core::slice::from_raw_parts_mut(page as *mut u8, PAGE_SIZE) };
			buf.fill(0);
			if len == 0 {
				return Ok(());
			}
			let Some(inode) = proc.lock().mem_space.find(page).and_then(|m| m.inode) else {
				return Ok(());
			};
			let (inode, _) = fs::inode_get(inode.dev, inode.inum)?;
			let result = fs::inode_read(inode, &mut buf[..len], file_offset as u32);
			fs::inode_put(inode);
			result.map(|_| ())
		},
	)
}

/// Delivers `sig` to the current process as the consequence of an
/// exception (as opposed to another process's `kill`): posts it through
/// the same table `signal::deliver` reads, so it takes effect on the
/// very same return-to-user-mode this trap is already on its way back
/// to.
fn raise(sig: SigNum) {
	if let Some(pid) = process::current().and_then(|t| t.lock().owning_process) {
		process::send_proc_signal(pid, sig);
	}
}

/// Called from `arch::x86::idt_entry`'s `user_common` tail for every
/// vector that trapped out of ring 3: `regs` is the full trap frame
/// (including `esp`, since the CPU pushed it on the ring change), ready
/// for `signal::deliver` to rewrite in place before `iret`.
#[no_mangle]
pub extern "C" fn user_interrupt(regs: &mut Regs, vector: u32, error_code: u32) {
	if vector >= IRQ_BASE as u32 && vector < IRQ_BASE as u32 + 16 {
		let irq = (vector - IRQ_BASE as u32) as u8;
		if irq == 0 && crate::process::scheduler::tick() {
			crate::process::scheduler::schedule();
		}
		pic::end_of_interrupt(irq);
	} else if vector == 14 {
		match run_page_fault(error_code) {
			Ok(FaultAction::Resolved) => {}
			_ => raise(signal::SIGSEGV),
		}
	} else if vector == 8 || vector == 18 {
		crate::log_err!("fatal exception {} from user mode, halting", vector);
		crate::panic::fatal("unrecoverable CPU exception");
	} else {
		raise(exception_signal(vector));
	}

	signal::deliver(regs);
}

/// Called from `arch::x86::idt_entry`'s `kernel_common` tail: the
/// interrupted context never left ring 0, so there is no trap frame
/// safe to hand out and no return-to-user-mode signal check to run.
/// Timer ticks still advance scheduler bookkeeping, but an expired
/// quantum is not acted on here: preempting a kernel stack at an
/// arbitrary instruction boundary is unsound under this core's
/// cooperative-in-kernel model, so rescheduling happens on this
/// thread's next voluntary yield or trip back to user mode instead. Any
/// other exception reaching here is a kernel bug.
#[no_mangle]
pub extern "C" fn kernel_interrupt(vector: u32, error_code: u32) {
	if vector >= IRQ_BASE as u32 && vector < IRQ_BASE as u32 + 16 {
		let irq = (vector - IRQ_BASE as u32) as u8;
		if irq == 0 {
			crate::process::scheduler::tick();
		}
		pic::end_of_interrupt(irq);
		return;
	}
	let _ = error_code;
	crate::log_err!("kernel-mode exception {}", vector);
	crate::panic::fatal("unrecoverable CPU exception in kernel mode");
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn exception_signal_maps_divide_error() {
		assert_eq!(exception_signal(0), signal::SIGFPE);
	}

	#[test_case]
	fn exception_signal_maps_general_protection() {
		assert_eq!(exception_signal(13), signal::SIGSEGV);
	}
}
