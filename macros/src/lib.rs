//! Derive and attribute macros for the kernel crate.

#![deny(warnings)]

extern crate proc_macro;

mod syscall;

use proc_macro::TokenStream;

/// Attribute macro to declare a system call handler.
///
/// Lets the handler take its arguments by value, already cast to their
/// declared types, instead of taking the process's raw registers and
/// marshalling them by hand.
#[proc_macro_attribute]
pub fn syscall(_metadata: TokenStream, input: TokenStream) -> TokenStream {
	syscall::syscall(input)
}
