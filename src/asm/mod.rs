//! Program images, assembler and disassembler.
//!
//! This module provides:
//! - The binary image format (header plus 4-byte instruction words)
//! - A two-pass assembler (text → image)
//! - A disassembler (image → assembler text)

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_instruction};
pub use image::{load_image, save_image, Image, ImageError, InstructionWord};
