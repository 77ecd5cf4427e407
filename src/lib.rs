//! rtl-lift - semantic lifting of machine instructions to RTL.
//!
//! Decoded instructions are rewritten into architecture-neutral
//! register-transfer statements, and dynamic-linking stubs are recognized in
//! the resulting RTL so calls through them can be redirected to the real
//! target.
//!
//! # Primary Usage
//!
//! ```ignore
//! use rtl_lift::arm32::Arm32Lifter;
//! use rtl_lift::core::ScanSession;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = ScanSession::new(&arena);
//!
//! let lifter = Arm32Lifter::new()?;
//! let instrs = lifter.parse_listing("vadd.i32 q0, q1, q2")?;
//! for cluster in lifter.lift_all(&session, &instrs) {
//!     println!("{cluster}");
//! }
//! println!("{}", session.report());
//! ```
//!
//! # Architecture
//!
//! - [`core`] - RTL model, register files, intrinsic catalog, scan session
//! - [`arm32`] - AArch32 vector instruction rewriters and listing parser
//! - [`trampoline`] - PLT stub recognition for several architectures
//! - [`x64`] - x86-64 stub lifting and PLT walking

pub mod arm32;
pub mod core;
pub mod trampoline;
pub mod x64;

pub use crate::core::{
    // RTL
    Expression, InstrClass, RtlCluster, RtlStatement,
    // Registers and memory
    Address, MemoryImage, MemoryReader, Reg, RegisterFile,
    // Errors
    LiftError, LiftResult, RewriteError,
    // Session management
    LiftOptions, ScanSession, ScanStats,
};
pub use arm32::Arm32Lifter;
pub use trampoline::{resolve, Architecture, ResolvedTarget};
pub use x64::{walk_plt, PltEntry, StubLifter};
