// This module defines the error types of the lifting core using the thiserror crate.
// RewriteError is the outcome of a single opcode rewriter: a malformed operand, a
// combination that has no rewriter yet, or a hard fault where the decoder produced an
// encoding the rewriters are contractually never given. The first two are expected
// during scans and turn into an invalid-instruction marker; faults are surfaced to the
// caller as LiftError::ContractViolation so they can be triaged with higher priority.
// LiftError also covers listing parse errors and object-file loading.

//! Error types for the lifting core.

use super::memory::Address;
use super::register_file::RegisterFileError;
use thiserror::Error;

/// Outcome of an opcode rewriter that did not produce RTL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewriteError {
    #[error("Malformed operand: {reason}")]
    Malformed { reason: String },

    #[error("Unimplemented: {mnemonic} {detail}")]
    Unimplemented { mnemonic: String, detail: String },

    #[error("Rewriter contract violated: {reason}")]
    Fault { reason: String },
}

impl RewriteError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        RewriteError::Malformed {
            reason: reason.into(),
        }
    }

    pub fn fault(reason: impl Into<String>) -> Self {
        RewriteError::Fault {
            reason: reason.into(),
        }
    }
}

/// Main error type returned by the library.
#[derive(Error, Debug)]
pub enum LiftError {
    #[error("Contract violation at {address}: {reason}")]
    ContractViolation { address: Address, reason: String },

    #[error("Parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Cannot load image: {reason}")]
    Image { reason: String },

    #[error("Register file error: {0}")]
    Registers(#[from] RegisterFileError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for library operations.
pub type LiftResult<T> = Result<T, LiftError>;
