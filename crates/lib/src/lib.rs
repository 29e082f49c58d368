//! gocross-lib: cross-compiles a Go package for a list of platforms.
//!
//! The pieces, in the order a run uses them:
//! - `config`: raw inputs to a validated, immutable `BuildConfig`
//! - `platform`: `kernel/arch` targets and host detection
//! - `naming`: artifact and archive file names
//! - `toolchain`: the `go build` invocation and the `Toolchain` seam
//! - `package`: extra file staging, archive writing, cleanup
//! - `build`: the per-platform build-and-package routine
//! - `execute`: sequential or bounded-parallel orchestration
//! - `inventory`: destination directory listing

pub mod build;
pub mod config;
pub mod execute;
pub mod inventory;
pub mod naming;
pub mod package;
pub mod platform;
pub mod toolchain;

#[cfg(test)]
mod testutil;
