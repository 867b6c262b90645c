//! The 32-bit machine word and its reference tagging.
//!
//! A word is either an unboxed scalar or a reference. The machine cannot
//! tell an unboxed 0 from a null reference; by convention the word 0 always
//! means "no object" in a reference-typed slot. Every other word, when used
//! as a reference, is tagged by its low bit:
//!
//! - low bit 0: a heap handle, `(slot + 1) << 1`
//! - low bit 1: a bare code pointer, `(offset << 1) | 1`
//!
//! Code pointers are zero-capture closures: just a bytecode offset, no
//! allocation, inert under reference counting. The [`WordRef`] sum type is
//! the explicit discriminant; all representation-specific branching in the
//! runtime goes through [`classify`].

/// The single machine word type. Arguments, locals, globals, fields and
/// native-call values are all words.
pub type Word = u32;

/// A word viewed as a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordRef {
    /// The zero word: no object.
    Null,
    /// A reference-counted heap object, identified by slab slot.
    Object(u32),
    /// A bare code pointer into the bytecode segment (word offset).
    Code(u32),
}

/// Decode a word's reference interpretation.
pub fn classify(w: Word) -> WordRef {
    if w == 0 {
        WordRef::Null
    } else if w & 1 == 1 {
        WordRef::Code(w >> 1)
    } else {
        WordRef::Object((w >> 1) - 1)
    }
}

/// Encode a heap slab slot as a handle word. Always nonzero and even.
pub fn from_slot(slot: u32) -> Word {
    (slot + 1) << 1
}

/// Encode a bytecode word offset as a code-pointer word. Always odd.
pub fn code_ptr(offset: u32) -> Word {
    (offset << 1) | 1
}
