//! A local peephole optimizer for an arena-based integer IR.
//!
//! This crate provides a small instruction arena for straight-line integer
//! code together with a single-pass block-local optimizer. The pass tries,
//! on every instruction of every basic block:
//!
//! * **algebraic-identity elimination**: `x + 0`, `x - 0`, `x * 1`, and
//!   `x / 1` forward their uses to `x`;
//! * **strength reduction**: multiplication and signed division by
//!   constants within one of a power of two become shifts, with an add or
//!   sub correction where the constant is `2^k ± 1`;
//! * **inverse-operation cancellation**: a consumer that undoes its
//!   producer with the identical constant, such as `(x + 5) - 5`, forwards
//!   its uses to `x`.
//!
//! ## IR
//!
//! The IR type definitions live in the `local_opts::ir` module. Instructions
//! are allocated in an arena and addressed by stable ids; every instruction
//! tracks its use edges, so the pass can walk the def-use graph in both
//! directions and redirect uses in place.
//!
//! ## Running the pass
//!
//! `local_opts::opt::run` rewrites every function of a module and returns
//! whether anything changed, which is what a caller that caches derived
//! analyses needs in order to invalidate them. The pass makes a single
//! forward sweep per block; callers wanting a fixed point rerun it until it
//! reports no change.
//!
//! ## Emitting a text format
//!
//! When the `stringify` Cargo feature is enabled, the `local_opts::stringify`
//! module provides `Display` implementations that render functions and
//! modules one instruction per line, for debugging and test output.

#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod ir;
pub mod opt;

#[cfg(feature = "stringify")]
pub mod stringify;
