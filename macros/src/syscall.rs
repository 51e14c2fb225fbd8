//! This module implements the macro used to declare a system call.
//!
//! The generated handler takes `&mut Regs`, not `&Regs`: `fork`, `execve`
//! and `sigreturn` all rewrite the calling thread's trap frame in place
//! (new child register state, a jump to an executable's entry point, a
//! restored pre-signal context) rather than only reading it.

use proc_macro::TokenStream;
use proc_macro2::{Ident, Span};
use quote::quote;
use std::iter;
use syn::{
	parse_macro_input, AngleBracketedGenericArguments, FnArg, ItemFn, Path, PathArguments,
	PathSegment, Token, Type, TypePath,
};

/// The register holding each argument, in order, per the kernel's syscall ABI
/// (trap vector `0xFF`, arguments in `ebx`, `ecx`, `edx`).
const REGS: [&str; 3] = ["ebx", "ecx", "edx"];

/// Implementation of the syscall macro.
pub fn syscall(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as ItemFn);

	// Check signature is valid
	if input.sig.constness.is_some() {
		panic!("a system call handler cannot be `const`");
	}
	if !input.sig.generics.params.is_empty() {
		panic!("a system call cannot have generic arguments");
	}
	if input.sig.variadic.is_some() {
		panic!("a system call handler cannot have variadic arguments");
	}
	if input.sig.inputs.len() > REGS.len() {
		panic!(
			"too many arguments for the current target (max: {})",
			REGS.len()
		);
	}

	let args = input
		.sig
		.inputs
		.iter()
		.enumerate()
		.map(|(i, arg)| match arg {
			FnArg::Typed(typed) => {
				let pat = &typed.pat;
				let ty = &typed.ty;
				let reg_name = Ident::new(REGS[i], Span::call_site());
				(pat, ty, reg_name)
			}
			FnArg::Receiver(_) => panic!("a system call handler cannot have a `self` argument"),
		})
		.collect::<Vec<_>>();

	let args_tokens: proc_macro2::TokenStream = args
		.iter()
		.map(|(pat, ty, reg_name)| {
			let mut ty = (*ty).clone();
			match ty.as_mut() {
				// Special cast for userspace pointers
				Type::Path(TypePath {
					path: Path {
						ref mut segments, ..
					},
					..
				}) if segments
					.first()
					.map(|s| s.ident.to_string().starts_with("Syscall"))
					.unwrap_or(false) =>
				{
					// Add colon token to avoid compilation error
					if let PathSegment {
						arguments:
							PathArguments::AngleBracketed(AngleBracketedGenericArguments {
								ref mut colon2_token,
								..
							}),
						..
					} = &mut segments[0]
					{
						*colon2_token = Some(Token![::](Span::call_site()));
					}
					quote! {
						let #pat = #ty::from(regs.#reg_name as usize);
					}
				}
				// Normal argument
				ty => quote! {
					let #pat = regs.#reg_name as #ty;
				},
			}
		})
		.collect();

	let ident = input.sig.ident;
	let code = input.block;

	let toks = if cfg!(feature = "strace") {
		let args_count = input.sig.inputs.len();
		let strace_call_format: String = iter::once("[strace pid {}] {}(")
			.chain((0..args_count).map(|_| "{:?}").intersperse(", "))
			.chain(iter::once(")"))
			.collect();
		let strace_args = args.iter().map(|(pat, ..)| pat).collect::<Vec<_>>();

		quote! {
			pub fn #ident(regs: &mut crate::process::regs::Regs) -> Result<i32, crate::errno::Errno> {
				#args_tokens
				crate::idt::wrap_disable_interrupts(|| {
					let pid = crate::process::current().lock().pid;
					crate::println!(
						#strace_call_format,
						pid,
						stringify!(#ident),
						#(#strace_args),*
					);
				});
				let ret = (|| {
					#code
				})();
				crate::idt::wrap_disable_interrupts(|| {
					let pid = crate::process::current().lock().pid;
					match ret {
						Ok(val) => crate::println!("[strace pid {pid}] -> Ok({val})"),
						Err(errno) => crate::println!("[strace pid {pid}] -> Err({errno})"),
					}
				});
				ret
			}
		}
	} else {
		quote! {
			pub fn #ident(regs: &mut crate::process::regs::Regs) -> Result<i32, crate::errno::Errno> {
				#args_tokens
				#code
			}
		}
	};
	TokenStream::from(toks)
}
