//! Error types for the minibit image builder.

use thiserror::Error;

/// Errors produced while assembling an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A jump names a label that was never bound.
    #[error("unbound label '{label}'")]
    UnboundLabel { label: String },

    /// The same label was bound twice in one function.
    #[error("duplicate label '{label}'")]
    DuplicateLabel { label: String },

    /// A declared function was never given a body.
    #[error("function {id} declared but never defined")]
    UndefinedFunction { id: usize },

    /// A jump target exceeds the 24-bit encodable range.
    #[error("jump to '{label}' lands at word {target}, beyond the 24-bit range")]
    JumpTooFar { label: String, target: usize },

    /// A call target exceeds the 16-bit encodable range.
    #[error("call target at word {offset} is beyond the 16-bit range")]
    CallTooFar { offset: usize },

    /// The string pool outgrew the 8-bit cache index.
    #[error("string pool has {count} entries, more than 256 cache slots")]
    TooManyStrings { count: usize },

    /// The assembled word stream failed image validation.
    #[error(transparent)]
    Decode(#[from] minibit_common::DecodeError),
}
