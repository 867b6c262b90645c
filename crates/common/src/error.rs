//! Errors produced while decoding binary images.

use thiserror::Error;

/// Errors from decoding an image byte stream or walking its word stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Image byte length is not a multiple of 2 (the stream is u16 words).
    #[error("image length {0} is not a whole number of words")]
    OddLength(usize),

    /// Image is shorter than the fixed header.
    #[error("image has {words} words, header needs {needed}")]
    TruncatedHeader { words: usize, needed: usize },

    /// Opcode byte does not name any instruction.
    #[error("unknown opcode byte {0:#04x}")]
    BadOpcode(u8),

    /// A word read ran past the end of the image.
    #[error("word offset {offset} is outside the image")]
    OutOfImage { offset: usize },

    /// A string literal was not NUL-terminated before the image ended.
    #[error("unterminated string literal at word offset {offset}")]
    UnterminatedLiteral { offset: usize },
}
