//! Disassembler for microbus images.
//!
//! The listing uses assembler syntax with the address unit and raw fields
//! of each word in a trailing comment, so it can be fed back to the
//! assembler as long as it holds no `StoreImmediate` or `Compare` words,
//! which have no mnemonic of their own.

use crate::asm::image::{Image, InstructionWord};
use crate::cpu::microcode::Opcode;
use crate::cpu::registers::Register;

/// Registers that can be named in moves, loads and stores.
const GENERAL: [Register; 5] = [
    Register::A,
    Register::B,
    Register::Accumulator,
    Register::Address,
    Register::IO,
];

/// Disassemble a single instruction word to text.
pub fn disassemble_instruction(word: InstructionWord) -> String {
    match word.decode() {
        Some(op) => format_instruction(op, word.operand),
        None => format!("??? {}, {}", word.opcode, word.operand),
    }
}

/// Disassemble an image, trailing zero padding excluded.
pub fn disassemble(image: &Image) -> String {
    let mut output = String::new();
    output.push_str("# microbus disassembly\n");
    output.push_str(&format!("# entry point {}\n\n", image.entry_point()));

    for (index, word) in image.trimmed_words().iter().enumerate() {
        let addr = Image::address_of(index);
        if addr == image.entry_point() {
            output.push_str("::main\n");
        }
        let line = disassemble_instruction(*word);
        output.push_str(&format!(
            "    {:<20} # {:04}: {} {}\n",
            line, addr, word.opcode, word.operand
        ));
    }

    output
}

fn reg(r: Register) -> &'static str {
    match r {
        Register::A => "$a",
        Register::B => "$b",
        Register::Accumulator => "$acc",
        Register::Address => "$adr",
        Register::IO => "$io",
        Register::Instruction => "$ins",
        Register::ProgramCounter => "$pc",
        Register::AddressBackup => "$abk",
        Register::Flags => "$flags",
    }
}

/// Register operand of a load, immediate load or store.
fn find_register(op: Opcode, lookup: fn(Register) -> Option<Opcode>) -> Option<Register> {
    GENERAL.iter().copied().find(|&r| lookup(r) == Some(op))
}

fn format_instruction(op: Opcode, operand: u16) -> String {
    for src in GENERAL {
        for dst in GENERAL {
            if Opcode::for_move(src, dst) == Some(op) {
                return format!("mov {}, {}", reg(src), reg(dst));
            }
        }
    }
    if let Some(r) = find_register(op, Opcode::for_load) {
        return format!("lod {}, %{:x}", reg(r), operand);
    }
    if let Some(r) = find_register(op, Opcode::for_load_immediate) {
        return format!("ldi {}, {}", reg(r), operand as i16);
    }
    if let Some(r) = find_register(op, Opcode::for_store) {
        return format!("sto {}, %{:x}", reg(r), operand);
    }

    match op {
        Opcode::StoreImmediate => format!("store_immediate {}", operand as i16),
        Opcode::Add => format!("add %{:x}", operand),
        Opcode::Subtract => format!("sub %{:x}", operand),
        Opcode::Sum => "sum".to_string(),
        Opcode::Difference => "dif".to_string(),
        Opcode::Compare => format!("compare %{:x}", operand),
        Opcode::Jump => format!("jmp %{:x}", operand),
        Opcode::JumpZero => format!("jz %{:x}", operand),
        Opcode::JumpCarry => format!("jc %{:x}", operand),
        Opcode::In => "in $io".to_string(),
        Opcode::Out => "out".to_string(),
        Opcode::Halt => "hlt".to_string(),
        // Moves, loads and stores were handled above.
        other => format!("{:?} {}", other, operand),
    }
}
