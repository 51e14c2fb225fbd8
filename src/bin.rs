//! Pulls in the kernel, built as a library (see `src/kernel.rs`), as the
//! final linked executable.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kernel::selftest::runner)]
#![reexport_test_harness_main = "test_main"]

extern crate kernel;
