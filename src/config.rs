//! Compile-time kernel tunables.
//!
//! The actual values live in `kernel-config.toml` at the workspace root and
//! are turned into the constants below by `build.rs`, the way the bundled
//! `serde`/`toml` build-dependencies are used to generate this file.

include!(concat!(env!("OUT_DIR"), "/config.rs"));
