//! minibit common types: machine word, opcode set and image format.
//!
//! This crate provides the foundational data structures shared by the
//! virtual machine, the assembler and the CLI:
//!
//! - [`Word`] / [`WordRef`] — the 32-bit machine word and its reference tagging
//! - [`Op`] — the instruction set, one opcode byte plus a packed direct argument
//! - [`Image`] — the versioned binary image (little-endian u16 word stream)
//! - [`DecodeError`] — errors from decoding byte streams
//!
//! # Dependencies
//!
//! This crate uses `thiserror` (compile-time proc-macro, zero runtime cost)
//! and has no other dependencies.

pub mod error;
pub mod image;
pub mod opcode;
pub mod word;

// Re-export commonly used types at the crate root.
pub use error::DecodeError;
pub use image::{Image, BINARY_V1, ENTRY_OFFSET, FUNCTION_V1, HEADER_WORDS};
pub use opcode::{split_word, Op};
pub use word::{Word, WordRef};
