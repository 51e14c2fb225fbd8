//! Blocking and interrupt-disabling mutexes.
//!
//! `Mutex` is a plain spinlock, suitable for short critical sections shared
//! between threads that may be preempted while holding it (the scheduler
//! only ever preempts at a quantum boundary, so contention is bounded).
//! `IntMutex` additionally disables interrupts for the duration the lock is
//! held, which is required for any data also touched from interrupt context
//! (the page pool, the scheduler run queue, the per-process pending-signal
//! bitfields) — see the lock-granularity table this mirrors.

use core::arch::asm;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Reads the interrupt flag and disables interrupts, returning whether they
/// were previously enabled.
#[inline(always)]
unsafe fn cli_save() -> bool {
	let flags: u32;
	asm!("pushfd", "pop {0}", "cli", out(reg) flags, options(nomem, preserves_flags));
	flags & (1 << 9) != 0
}

/// Restores the interrupt flag to `enabled`.
#[inline(always)]
unsafe fn sti_restore(enabled: bool) {
	if enabled {
		asm!("sti", options(nomem, nostack));
	}
}

/// A spinlock-protected value.
pub struct Mutex<T: ?Sized> {
	locked: AtomicBool,
	data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
	/// Creates a new, unlocked mutex.
	pub const fn new(data: T) -> Self {
		Self {
			locked: AtomicBool::new(false),
			data: UnsafeCell::new(data),
		}
	}
}

impl<T: ?Sized> Mutex<T> {
	/// Acquires the lock, spinning until it is available.
	pub fn lock(&self) -> MutexGuard<'_, T> {
		while self
			.locked
			.compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
			.is_err()
		{
			core::hint::spin_loop();
		}
		MutexGuard { lock: self }
	}

	/// Attempts to acquire the lock without spinning.
	pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
		self.locked
			.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
			.ok()
			.map(|_| MutexGuard { lock: self })
	}

	/// Returns a mutable reference to the inner value, bypassing locking.
	///
	/// # Safety
	///
	/// The caller must ensure no other reference to the data is alive.
	#[allow(clippy::mut_from_ref)]
	pub unsafe fn get_mut_unchecked(&self) -> &mut T {
		&mut *self.data.get()
	}
}

/// RAII guard returned by [`Mutex::lock`]; releases the lock on drop.
pub struct MutexGuard<'m, T: ?Sized> {
	lock: &'m Mutex<T>,
}

impl<'m, T: ?Sized> Deref for MutexGuard<'m, T> {
	type Target = T;

	fn deref(&self) -> &T {
		unsafe { &*self.lock.data.get() }
	}
}

impl<'m, T: ?Sized> DerefMut for MutexGuard<'m, T> {
	fn deref_mut(&mut self) -> &mut T {
		unsafe { &mut *self.lock.data.get() }
	}
}

impl<'m, T: ?Sized> Drop for MutexGuard<'m, T> {
	fn drop(&mut self) {
		self.lock.locked.store(false, Ordering::Release);
	}
}

/// A mutex that disables interrupts for the duration it is held.
///
/// Use this, instead of [`Mutex`], for any state also accessed from the
/// timer ISR or the syscall/fault entry path (the physical page pool, the
/// scheduler's run queue, per-thread pending-signal bitfields).
pub struct IntMutex<T: ?Sized> {
	inner: Mutex<T>,
}

unsafe impl<T: ?Sized + Send> Sync for IntMutex<T> {}
unsafe impl<T: ?Sized + Send> Send for IntMutex<T> {}

impl<T> IntMutex<T> {
	/// Creates a new, unlocked mutex.
	pub const fn new(data: T) -> Self {
		Self {
			inner: Mutex::new(data),
		}
	}
}

impl<T: ?Sized> IntMutex<T> {
	/// Disables interrupts and acquires the lock.
	pub fn lock(&self) -> IntMutexGuard<'_, T> {
		let interrupts_were_enabled = unsafe { cli_save() };
		let guard = self.inner.lock();
		IntMutexGuard {
			guard: Some(guard),
			interrupts_were_enabled,
		}
	}
}

/// RAII guard returned by [`IntMutex::lock`]; releases the lock, then
/// restores the interrupt flag, on drop.
pub struct IntMutexGuard<'m, T: ?Sized> {
	guard: Option<MutexGuard<'m, T>>,
	interrupts_were_enabled: bool,
}

impl<'m, T: ?Sized> Deref for IntMutexGuard<'m, T> {
	type Target = T;

	fn deref(&self) -> &T {
		self.guard.as_ref().unwrap()
	}
}

impl<'m, T: ?Sized> DerefMut for IntMutexGuard<'m, T> {
	fn deref_mut(&mut self) -> &mut T {
		self.guard.as_mut().unwrap()
	}
}

impl<'m, T: ?Sized> Drop for IntMutexGuard<'m, T> {
	fn drop(&mut self) {
		// Release the spinlock before restoring the interrupt flag, so the
		// lock is never held with interrupts already back on.
		self.guard.take();
		unsafe {
			sti_restore(self.interrupts_were_enabled);
		}
	}
}

/// Disables interrupts for the duration of `f`, restoring the previous flag
/// afterwards. Used by code that must touch interrupt-shared state briefly
/// without going through an [`IntMutex`] (e.g. the scheduler's `schedule`
/// entry point, which already holds other locks).
pub fn wrap_disable_interrupts<R>(f: impl FnOnce() -> R) -> R {
	unsafe {
		let enabled = cli_save();
		let r = f();
		sti_restore(enabled);
		r
	}
}
