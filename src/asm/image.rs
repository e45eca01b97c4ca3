//! Program binary format.
//!
//! All fields are little-endian:
//! - Header (4 bytes): format marker `148` (u16), entry point in address
//!   units (u16)
//! - Body: 4-byte instruction words, opcode id (i16) then operand (u16)
//!
//! The header occupies address units 0-1, so the first body word sits at
//! unit 2 and word `n` at unit `2 + 2n`.

use crate::cpu::microcode::Opcode;
use serde::{Serialize, Deserialize};
use std::path::Path;
use thiserror::Error;

/// Format marker stored in the first two bytes of every image.
pub const MAGIC: u16 = 148;

/// Size of the header and of each instruction word, in bytes.
pub const WORD_BYTES: usize = 4;

/// Address units occupied by one instruction word.
pub const WORD_UNITS: u16 = 2;

/// Address unit of the first body word.
pub const BODY_START: u16 = WORD_UNITS;

/// One encoded instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionWord {
    pub opcode: i16,
    pub operand: u16,
}

impl InstructionWord {
    pub fn new(opcode: Opcode, operand: u16) -> Self {
        Self { opcode: opcode.id(), operand }
    }

    /// Instruction with no meaningful operand.
    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, 0)
    }

    /// Decoded opcode, if the id is known.
    pub fn decode(&self) -> Option<Opcode> {
        Opcode::from_id(self.opcode)
    }

    pub fn to_bytes(self) -> [u8; WORD_BYTES] {
        let [a, b] = self.opcode.to_le_bytes();
        let [c, d] = self.operand.to_le_bytes();
        [a, b, c, d]
    }

    pub fn from_bytes(bytes: [u8; WORD_BYTES]) -> Self {
        Self {
            opcode: i16::from_le_bytes([bytes[0], bytes[1]]),
            operand: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// A program image: entry point plus instruction words.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    entry_point: u16,
    words: Vec<InstructionWord>,
}

impl Image {
    /// An image with no entry point set.
    pub fn new(words: Vec<InstructionWord>) -> Self {
        Self { entry_point: 0, words }
    }

    pub fn with_entry_point(mut self, entry_point: u16) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn entry_point(&self) -> u16 {
        self.entry_point
    }

    /// Address unit of the first instruction to fetch. Unit 0 holds the
    /// header, so an entry point of 0 means the start of the body.
    pub fn start_address(&self) -> u16 {
        match self.entry_point {
            0 => BODY_START,
            unit => unit,
        }
    }

    pub fn words(&self) -> &[InstructionWord] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Address unit of body word `index`.
    pub fn address_of(index: usize) -> u16 {
        BODY_START + WORD_UNITS * index as u16
    }

    /// Encode the image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(WORD_BYTES * (self.words.len() + 1));
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&self.entry_point.to_le_bytes());
        for word in &self.words {
            bytes.extend_from_slice(&word.to_bytes());
        }
        bytes
    }

    /// Encode the image, zero-padded or truncated to `size` bytes.
    pub fn to_sized_bytes(&self, size: usize) -> Vec<u8> {
        let mut bytes = self.to_bytes();
        bytes.resize(size, 0);
        bytes
    }

    /// Decode an image. A partial trailing word is zero-padded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() < WORD_BYTES {
            return Err(ImageError::Truncated(bytes.len()));
        }

        let marker = u16::from_le_bytes([bytes[0], bytes[1]]);
        if marker != MAGIC {
            return Err(ImageError::BadMarker(marker));
        }
        let entry_point = u16::from_le_bytes([bytes[2], bytes[3]]);

        let words = bytes[WORD_BYTES..]
            .chunks(WORD_BYTES)
            .map(|chunk| {
                let mut raw = [0u8; WORD_BYTES];
                raw[..chunk.len()].copy_from_slice(chunk);
                InstructionWord::from_bytes(raw)
            })
            .collect();

        Ok(Self { entry_point, words })
    }

    /// Body words with trailing zero padding removed.
    pub fn trimmed_words(&self) -> &[InstructionWord] {
        let end = self
            .words
            .iter()
            .rposition(|w| *w != InstructionWord::default())
            .map_or(0, |i| i + 1);
        &self.words[..end]
    }
}

/// Load an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
    let bytes = std::fs::read(path.as_ref()).map_err(|e| ImageError::Io(e.to_string()))?;
    Image::from_bytes(&bytes)
}

/// Save an image to disk, optionally padded or truncated to `size` bytes.
pub fn save_image<P: AsRef<Path>>(path: P, image: &Image, size: Option<usize>) -> Result<(), ImageError> {
    let bytes = match size {
        Some(size) => image.to_sized_bytes(size),
        None => image.to_bytes(),
    };
    std::fs::write(path.as_ref(), bytes).map_err(|e| ImageError::Io(e.to_string()))
}

/// Errors that can occur while reading an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("image too short: {0} bytes, need at least a 4-byte header")]
    Truncated(usize),

    #[error("bad format marker {0} (expected 148)")]
    BadMarker(u16),
}
