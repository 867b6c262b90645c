//! The minibit binary image: a little-endian stream of u16 words.
//!
//! Layout:
//!
//! ```text
//! word 0    version tag, must equal BINARY_V1
//! word 1    number of globals
//! word 2    number of string literals
//! words 3-5 reserved
//! word 6..  entry function, then further function bodies and literals
//! ```
//!
//! Each function body starts with a three-word header: the FUNCTION_V1
//! marker, the local count, and the declared operand-stack size. The
//! instruction stream follows. String literals are NUL-terminated byte
//! runs packed two per word, addressed by word offset.

use crate::error::DecodeError;

/// Version tag an image must carry to be accepted by this build.
pub const BINARY_V1: u16 = 0x4207;

/// Marker word opening every function body. Doubles as the prologue
/// check when a code pointer is turned into an action.
pub const FUNCTION_V1: u16 = 0x4210;

/// Number of words in the fixed image header.
pub const HEADER_WORDS: usize = 6;

/// Word offset of the entry function (immediately after the header).
pub const ENTRY_OFFSET: usize = HEADER_WORDS;

/// A loaded binary image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    words: Vec<u16>,
}

impl Image {
    /// Wrap an already-decoded word stream.
    ///
    /// The stream must at least cover the fixed header. Version checking
    /// is the loader's job, not the decoder's.
    pub fn new(words: Vec<u16>) -> Result<Self, DecodeError> {
        if words.len() < HEADER_WORDS {
            return Err(DecodeError::TruncatedHeader {
                words: words.len(),
                needed: HEADER_WORDS,
            });
        }
        Ok(Self { words })
    }

    /// Decode an image from raw bytes (little-endian u16 words).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() % 2 != 0 {
            return Err(DecodeError::OddLength(bytes.len()));
        }
        let words = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Self::new(words)
    }

    /// Encode the image back to raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.words.len() * 2);
        for w in &self.words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    /// Read the word at `offset`.
    pub fn word(&self, offset: usize) -> Result<u16, DecodeError> {
        self.words
            .get(offset)
            .copied()
            .ok_or(DecodeError::OutOfImage { offset })
    }

    /// The image's version tag.
    pub fn version(&self) -> u16 {
        self.words[0]
    }

    /// Number of global slots the loader must allocate.
    pub fn num_globals(&self) -> u16 {
        self.words[1]
    }

    /// Number of string-literal cache slots the loader must allocate.
    pub fn num_strings(&self) -> u16 {
        self.words[2]
    }

    /// Read the NUL-terminated string literal starting at word `offset`.
    ///
    /// Bytes are packed low-then-high within each word. The returned
    /// bytes exclude the terminator.
    pub fn literal(&self, offset: usize) -> Result<Vec<u8>, DecodeError> {
        let mut bytes = Vec::new();
        for off in offset..self.words.len() {
            let w = self.words[off];
            for b in [(w & 0xFF) as u8, (w >> 8) as u8] {
                if b == 0 {
                    return Ok(bytes);
                }
                bytes.push(b);
            }
        }
        Err(DecodeError::UnterminatedLiteral { offset })
    }

    /// Total number of words in the image.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true for a zero-word image (never constructible via `new`).
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
