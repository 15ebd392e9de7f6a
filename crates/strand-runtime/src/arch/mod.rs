//! Architecture-specific context switching
//!
//! Each backend exposes the same three items:
//!
//! - `SavedContext` — the callee-saved register set plus stack and
//!   instruction pointers, `#[repr(C)]` because the assembly addresses
//!   fields by fixed offset.
//! - `init_context` — prepare a fresh fiber so the first switch into it
//!   lands in the entry trampoline with the entry function and argument
//!   in callee-saved registers.
//! - `context_switch` — save the current callee-saved state into one
//!   context and resume another. Voluntary only; there is no preemption,
//!   so caller-saved registers need no treatment.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64::{context_switch, init_context, SavedContext};

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::{context_switch, init_context, SavedContext};

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("strand-runtime supports x86_64 and aarch64 only");
