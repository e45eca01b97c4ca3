//! # microbus
//!
//! Emulator of a small microcoded 16-bit bus computer.
//!
//! Every instruction is fetched by a fixed six-tick microprogram and then
//! executed as up to three control words, each of which asserts a set of
//! control signals against the register bank, memory, ALU and peripheral
//! ports. The crate also carries the tooling around the machine: the
//! binary image format, an assembler and disassembler, two output devices
//! and an interactive debugger.

pub mod asm;
pub mod config;
pub mod cpu;
pub mod io;

#[cfg(feature = "tui")]
pub mod tui;

use thiserror::Error;

// Re-export commonly used types
pub use asm::{assemble, disassemble, load_image, save_image, AssemblerError, Image, ImageError};
pub use config::{ConfigError, MachineConfig};
pub use cpu::{Machine, MachineError, MachineState, MemoryError, Opcode, Register};

#[cfg(feature = "tui")]
pub use tui::run_debugger;

/// Any error produced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Assembler(#[from] AssemblerError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
