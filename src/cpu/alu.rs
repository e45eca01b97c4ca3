//! Arithmetic unit.
//!
//! The ALU samples its operands whenever register A or B latches the bus and
//! drives `A + B` or `A - B` when enabled. The sign is not carried by the
//! enable signal: it belongs to the instruction being executed and is fixed
//! when that instruction's microprogram is decoded (see
//! [`Microprogram::operation`](crate::cpu::microcode::Microprogram::operation)).

use serde::{Serialize, Deserialize};

/// Operation performed when the ALU is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    #[default]
    Add,
    Subtract,
}

/// The arithmetic unit and its operand latches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alu {
    a: i16,
    b: i16,
}

impl Alu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample the current A and B register values.
    pub fn capture(&mut self, a: i16, b: i16) {
        self.a = a;
        self.b = b;
    }

    /// Result of `op` over the sampled operands, with 16-bit wraparound.
    pub fn result(&self, op: AluOp) -> i16 {
        match op {
            AluOp::Add => self.a.wrapping_add(self.b),
            AluOp::Subtract => self.a.wrapping_sub(self.b),
        }
    }

    pub fn operands(&self) -> (i16, i16) {
        (self.a, self.b)
    }
}
