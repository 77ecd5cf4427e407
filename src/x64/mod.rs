//! x86-64 support.
//!
//! This module contains the x86-64 specific code:
//! - The general purpose register file, numbered like iced-x86 numbers it
//! - Stub lifting from machine code decoded with iced-x86
//! - PLT walking over ELF images loaded with `object`

pub mod plt;
pub mod registers;
pub mod stub;

pub use plt::{walk_plt, PltEntry, PltSection, PltWalker};
pub use stub::StubLifter;
