// This module is the shared infrastructure of the lifter, independent of any particular
// processor. It defines the RTL data model (types, expressions, statements), the register
// file description every architecture module fills in, the intrinsic catalog, the
// per-instruction rewrite context, read-only access to the program image, error types,
// and the arena-backed scan session that applies the per-instruction outcome policy.
// Architecture modules (arm32, x64) and the trampoline resolver build on top of it.

//! Core lifting infrastructure
//!
//! # Key Components
//!
//! ## RTL data model (`types`, `expr`, `rtl`)
//! - Primitive and array data types with bit sizes
//! - Expression trees: registers, memory, arithmetic, sequences, slices, intrinsics
//! - Statements grouped into one cluster per machine instruction
//!
//! ## Architecture description (`register_file`)
//! - Registers by bank and id, with aliasing and flag groups
//!
//! ## Intrinsics (`intrinsic`)
//! - Structured descriptors with a single canonical naming function
//!
//! ## Rewriting (`context`, `session`)
//! - Per-instruction context owning the emission buffer and temporaries
//! - Arena-based scan session with statistics and diagnostics
//!
//! ## Program image (`memory`)
//! - Read-only memory accessor used for constant folding

pub mod context;
pub mod error;
pub mod expr;
pub mod intrinsic;
pub mod memory;
pub mod register_file;
pub mod rtl;
pub mod session;
pub mod test_utils;
pub mod types;

// Re-export core components
pub use context::RewriteContext;

pub use error::{LiftError, LiftResult, RewriteError};

pub use expr::{
    BinaryOp,
    Constant,
    Expression,
    FlagGroupRef,
    IntrinsicCall,
    MemoryAccess,
    ProcedureRef,
    RegisterRef,
    Temporary,
    UnaryOp,
};

pub use intrinsic::{IntrinsicCatalog, IntrinsicDescriptor, IntrinsicKind, IntrinsicParam};

pub use memory::{Address, Endianness, MemoryImage, MemoryReader, Segment};

pub use register_file::{
    FlagGroup,
    Reg,
    RegBitSet,
    RegisterDef,
    RegisterFile,
    RegisterFileError,
};

pub use rtl::{InstrClass, RtlCluster, RtlEmitter, RtlStatement};

pub use session::{InstrSample, LiftOptions, ScanSession, ScanStats, TrampolineRecord};

pub use types::{DataType, Domain, ElementType, LaneKind, PrimitiveType};
