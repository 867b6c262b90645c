//! Runtime errors for the minibit VM.
//!
//! Every invariant violation in the VM is fatal: errors propagate out of
//! the interpreter and terminate that execution context, nothing is caught
//! and retried internally. [`VmError::code`] exposes the closed numeric
//! (code, subcode) surface the original firmware reported before halting.

use minibit_common::DecodeError;
use thiserror::Error;

/// Subcodes identifying which bounds check failed. Reported alongside
/// the out-of-bounds error code.
pub mod subcode {
    /// Scalar record field load outside `reflen..len`.
    pub const RECORD_LD: u8 = 1;
    /// Reference record field load outside `0..reflen`.
    pub const RECORD_LDREF: u8 = 2;
    /// Scalar record field store outside `reflen..len`.
    pub const RECORD_ST: u8 = 3;
    /// Reference record field store outside `0..reflen`.
    pub const RECORD_STREF: u8 = 4;
    /// Collection `at` outside `0..len`.
    pub const COLLECTION: u8 = 5;
    /// String character index outside `0..len`.
    pub const STRING: u8 = 6;
    /// Global slot index outside the loaded globals table.
    pub const GLOBAL: u8 = 7;
    /// String-literal cache index outside the loaded strings table.
    pub const STRING_TABLE: u8 = 8;
    /// Argument index outside the current call's argument slice.
    pub const ARGUMENT: u8 = 9;
    /// Action captured-slot index outside `0..len`.
    pub const ACTION_ST: u8 = 10;
    /// Second write to an already-captured action slot.
    pub const ACTION_REASSIGN: u8 = 11;
    /// Object exists but is not of the kind the operation expects.
    pub const KIND: u8 = 12;
    /// Reference-mask bit names a slot the call never passed.
    pub const REFMASK: u8 = 13;
    /// Local slot index outside the function's declared local count.
    pub const LOCAL: u8 = 14;
}

/// Errors that occur while loading or executing a binary image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Image version tag does not match the one this build expects.
    #[error("bad binary version {found:#06x}, expected {expected:#06x}")]
    BadVersion { found: u16, expected: u16 },

    /// A function body does not open with the function marker word.
    #[error("bad function header {found:#06x} at word offset {offset}")]
    BadFunctionHeader { offset: usize, found: u16 },

    /// Opcode byte does not name any instruction.
    #[error("illegal opcode {byte:#04x} at word offset {offset}")]
    BadOpcode { byte: u8, offset: usize },

    /// RET0/RET1 executed with the wrong operand-stack height.
    #[error("stack has {depth} values on return, expected {expected}")]
    StackOnReturn { depth: usize, expected: usize },

    /// Push beyond the function's declared stack size.
    #[error("stack overflow (declared size {limit})")]
    StackOverflow { limit: usize },

    /// Pop from an empty operand stack.
    #[error("stack underflow")]
    StackUnderflow,

    /// Reference-count operation on an already-destroyed object.
    #[error("reference to deleted object (slot {slot})")]
    RefDeleted { slot: u32 },

    /// Record/action size parameters violate `reflen <= len <= 255`.
    #[error("illegal size parameters (check {subcode})")]
    SizeInvalid { subcode: u8 },

    /// Index outside the valid range; the subcode names the check.
    #[error("out of bounds access (check {subcode}, index {index})")]
    OutOfBounds { subcode: u8, index: i64 },

    /// Native-call table index beyond the registered entries.
    #[error("native {table} index {index} out of range (table has {len})")]
    NativeIndex {
        table: &'static str,
        index: u8,
        len: usize,
    },

    /// A `contract::assert` native failed.
    #[error("assertion failed: {message}")]
    AssertionFailed { message: String },

    /// Malformed word stream (truncated image, bad literal, stray pc).
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl VmError {
    /// The closed numeric error surface: (code, subcode) as reported by
    /// the halt primitive.
    pub fn code(&self) -> (u8, u8) {
        match self {
            VmError::AssertionFailed { .. } => (1, 0),
            VmError::Decode(_) => (2, 0),
            VmError::BadOpcode { .. } => (3, 0),
            VmError::BadVersion { .. } => (5, 0),
            VmError::BadFunctionHeader { .. } => (6, 0),
            VmError::RefDeleted { .. } => (7, 0),
            VmError::OutOfBounds { subcode, .. } => (8, *subcode),
            VmError::SizeInvalid { subcode } => (9, *subcode),
            VmError::StackOnReturn { .. } => (10, 0),
            VmError::StackOverflow { .. } => (11, 0),
            VmError::StackUnderflow => (12, 0),
            VmError::NativeIndex { .. } => (13, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            VmError::BadVersion {
                found: 0x4208,
                expected: 0x4207
            }
            .to_string(),
            "bad binary version 0x4208, expected 0x4207"
        );
        assert_eq!(
            VmError::StackOnReturn {
                depth: 2,
                expected: 1
            }
            .to_string(),
            "stack has 2 values on return, expected 1"
        );
    }

    #[test]
    fn numeric_codes_are_stable() {
        assert_eq!(VmError::RefDeleted { slot: 0 }.code(), (7, 0));
        assert_eq!(
            VmError::OutOfBounds {
                subcode: subcode::RECORD_LDREF,
                index: 9
            }
            .code(),
            (8, 2)
        );
        assert_eq!(VmError::SizeInvalid { subcode: 2 }.code(), (9, 2));
    }
}
