//! The emulated machine.
//!
//! A 16-bit bus computer driven by microcode:
//! - nine registers sharing one transient bus
//! - an adder/subtractor whose sign is chosen per instruction
//! - cell-addressed memory and a table of peripheral ports
//! - a control sequencer that runs a six-word fetch, then the opcode's
//!   microprogram, one control word per clock tick

pub mod alu;
pub mod clock;
pub mod execute;
pub mod memory;
pub mod microcode;
pub mod ports;
pub mod registers;

pub use alu::{Alu, AluOp};
pub use clock::Clock;
pub use execute::{Machine, MachineError, MachineState, SequencerState, Snapshot, Tick};
pub use memory::{Memory, MemoryError};
pub use microcode::{ControlWord, Microprogram, Opcode, Signal};
pub use ports::{Peripheral, PortError, PortHandle, PortTable};
pub use registers::{Bus, Register, RegisterBank};
