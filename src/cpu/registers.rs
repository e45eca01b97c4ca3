//! Register bank and the shared data bus.
//!
//! The machine has nine 16-bit registers:
//! - Instruction: opcode, then operand, of the word being fetched
//! - ProgramCounter: address unit of the next word to fetch
//! - Accumulator: ALU result
//! - Address: memory address / output port selector
//! - AddressBackup: holds Address across the fetch sequence
//! - A, B: ALU operands (B also selects the input port)
//! - IO: peripheral transfer buffer
//! - Flags: condition codes, never written by the ALU

use serde::{Serialize, Deserialize};

/// Identity of a register in the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    Instruction,
    ProgramCounter,
    Accumulator,
    Address,
    AddressBackup,
    A,
    B,
    IO,
    Flags,
}

impl Register {
    /// Every register, in bank order.
    pub const ALL: [Register; 9] = [
        Register::Instruction,
        Register::ProgramCounter,
        Register::Accumulator,
        Register::Address,
        Register::AddressBackup,
        Register::A,
        Register::B,
        Register::IO,
        Register::Flags,
    ];

    /// Short display name.
    pub fn name(self) -> &'static str {
        match self {
            Register::Instruction => "INS",
            Register::ProgramCounter => "PC",
            Register::Accumulator => "ACC",
            Register::Address => "ADR",
            Register::AddressBackup => "ABK",
            Register::A => "A",
            Register::B => "B",
            Register::IO => "IO",
            Register::Flags => "FLG",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// The single transient bus value.
///
/// Whatever is placed on the bus lives for one tick only; the sequencer
/// clears it once every signal of the current control word has been asserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bus {
    value: i16,
}

impl Bus {
    pub fn new() -> Self {
        Self { value: 0 }
    }

    #[inline]
    pub fn set(&mut self, value: i16) {
        self.value = value;
    }

    #[inline]
    pub fn get(&self) -> i16 {
        self.value
    }

    /// Reset to 0 at the end of a tick.
    #[inline]
    pub fn clear(&mut self) {
        self.value = 0;
    }
}

/// The register file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBank {
    cells: [i16; 9],
}

impl RegisterBank {
    /// Create a bank with every register zeroed.
    pub fn new() -> Self {
        Self { cells: [0; 9] }
    }

    #[inline]
    pub fn get(&self, id: Register) -> i16 {
        self.cells[id.index()]
    }

    #[inline]
    pub fn set(&mut self, id: Register, value: i16) {
        self.cells[id.index()] = value;
    }

    /// Copy the bus value into `id`.
    #[inline]
    pub fn latch(&mut self, id: Register, bus: &Bus) {
        self.cells[id.index()] = bus.get();
    }

    /// Place the value of `id` onto the bus.
    #[inline]
    pub fn drive(&self, id: Register, bus: &mut Bus) {
        bus.set(self.cells[id.index()]);
    }

    /// Add one to `id`, wrapping at 16 bits.
    pub fn increment(&mut self, id: Register) {
        let cell = &mut self.cells[id.index()];
        *cell = cell.wrapping_add(1);
    }

    /// Iterate over `(register, value)` pairs in bank order.
    pub fn iter(&self) -> impl Iterator<Item = (Register, i16)> + '_ {
        Register::ALL.iter().map(move |&r| (r, self.get(r)))
    }
}
