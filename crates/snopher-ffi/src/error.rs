//! Error taxonomy for the FFI boundary
//!
//! - `LoadError`: library or symbol resolution failed (fatal, before any call)
//! - `FfiError::TypeMismatch` / `FfiError::ArityMismatch`: rejected by the signature before the call
//! - `FfiError::NativeFault`: the native side reported failure through a status field
//! - `FfiError::OwnershipFault`: a native-owned resource was released twice or out of order
//! - `FfiError::UnsupportedSignature`: the descriptor has no matching call shape
//! - `MarshalError`: host data could not be converted to or from its C representation

use thiserror::Error;

/// Library loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Library file does not exist
    #[error("Library not found: {0}")]
    LibraryNotFound(String),

    /// The file exists but the dynamic loader rejected it
    #[error("Failed to load library '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    /// Symbol not found in library
    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    /// A process-wide library handle was installed already
    #[error("A native library is already installed (rejected '{0}')")]
    AlreadyInstalled(String),
}

/// Marshal error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// Null pointer where data was expected
    #[error("Null pointer in {0}")]
    NullPointer(String),

    /// Invalid string (contains a NUL byte, lacks a terminator, or is not UTF-8)
    #[error("Invalid string: {0}")]
    InvalidString(String),

    /// Native output does not fit in the buffer the host supplied
    #[error("Output of {needed} bytes does not fit in a buffer of {capacity} bytes")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// Host length cannot be represented as a C `int64_t`
    #[error("Length {0} does not fit in int64")]
    LengthOverflow(usize),
}

/// Errors surfaced by every FFI operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FfiError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Expected {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    /// The native function reported an error through its status field
    #[error("{function}: {message}")]
    NativeFault { function: String, message: String },

    #[error("Ownership fault: {0}")]
    OwnershipFault(String),

    /// No call shape is wired up for this signature
    #[error("Unsupported FFI signature: {0}")]
    UnsupportedSignature(String),

    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

impl FfiError {
    pub(crate) fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        FfiError::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }
}

/// Result type for FFI operations
pub type FfiResult<T> = Result<T, FfiError>;
