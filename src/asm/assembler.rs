//! Two-pass assembler for microbus programs.
//!
//! Syntax:
//! ```text
//! # Comment
//! ::main              # Label on its own line; `main` is the entry point
//!     ldi $a, 5       # Immediate load
//!     lod $b, %1f     # Load from hex address
//!     sum             # Acc = A + B
//!     mov $acc, $io
//!     out             # Write IO to the port selected by Address
//!     jmp ::main
//!     hlt
//! ```
//!
//! Labels resolve to the address unit of the instruction that follows them.

use crate::asm::image::{Image, InstructionWord, BODY_START, WORD_UNITS};
use crate::cpu::microcode::Opcode;
use crate::cpu::registers::Register;
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code into a program image.
pub fn assemble(source: &str) -> Result<Image, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// Name of the label that sets the entry point.
pub const ENTRY_LABEL: &str = "main";

/// One operand token.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Register(Register),
    Address(u16),
    Label(String),
    Numeral(i64),
}

impl Operand {
    fn kind(&self) -> &'static str {
        match self {
            Operand::Register(_) => "register",
            Operand::Address(_) => "address",
            Operand::Label(_) => "label",
            Operand::Numeral(_) => "numeral",
        }
    }
}

/// A parsed instruction line.
#[derive(Debug, Clone)]
struct Statement {
    line: usize,
    mnemonic: String,
    operands: Vec<Operand>,
}

struct Assembler {
    /// Address unit of the next emitted word.
    current_addr: u16,
    /// Label name -> address unit.
    symbols: HashMap<String, u16>,
    /// Instructions kept for the emission pass.
    statements: Vec<Statement>,
    output: Vec<InstructionWord>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            current_addr: BODY_START,
            symbols: HashMap::new(),
            statements: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Image, AssemblerError> {
        // Pass 1: parse and collect labels
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: emit with every label known
        let statements = std::mem::take(&mut self.statements);
        for statement in &statements {
            let words = self.encode(&statement.mnemonic, &statement.operands, statement.line)?;
            self.output.extend(words);
        }

        // Without a `main` label the header field stays 0.
        let entry = self.symbols.get(ENTRY_LABEL).copied().unwrap_or(0);
        debug!(target: "asm", "{} words, {} labels, entry {}", self.output.len(), self.symbols.len(), entry);
        Ok(Image::new(std::mem::take(&mut self.output)).with_entry_point(entry))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let tokens: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();

        let Some((&first, rest)) = tokens.split_first() else {
            return Ok(());
        };

        if let Some(name) = first.strip_prefix("::") {
            if !rest.is_empty() {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: "a label must stand on its own line".into(),
                });
            }
            let name = parse_label_name(name, line_num)?;
            if self.symbols.insert(name.clone(), self.current_addr).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label: name });
            }
            return Ok(());
        }

        let mnemonic = first.to_lowercase();
        let operands = rest
            .iter()
            .map(|t| parse_operand(t, line_num))
            .collect::<Result<Vec<_>, _>>()?;

        let words = word_count(&mnemonic).ok_or_else(|| AssemblerError::UnknownMnemonic {
            line: line_num,
            mnemonic: first.to_string(),
        })?;
        self.current_addr = self.current_addr.wrapping_add(words * WORD_UNITS);
        self.statements.push(Statement { line: line_num, mnemonic, operands });
        Ok(())
    }

    fn encode(&self, mnemonic: &str, operands: &[Operand], line_num: usize)
        -> Result<Vec<InstructionWord>, AssemblerError>
    {
        let mismatch = |expected: &str| AssemblerError::SyntaxError {
            line: line_num,
            message: format!(
                "{} expects [{}], got [{}]",
                mnemonic,
                expected,
                operands.iter().map(Operand::kind).collect::<Vec<_>>().join(", ")
            ),
        };
        let bare = |op: Opcode| vec![InstructionWord::bare(op)];

        let words = match (mnemonic, operands) {
            ("mov" | "move", [Operand::Register(src), Operand::Register(dst)]) => {
                let op = Opcode::for_move(*src, *dst).ok_or_else(|| AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("no move from {} to {}", src.name(), dst.name()),
                })?;
                bare(op)
            }
            ("mov" | "move", _) => return Err(mismatch("register, register")),

            ("lod" | "load", [Operand::Register(reg), addr]) => {
                let op = Opcode::for_load(*reg).ok_or_else(|| self.bad_register(*reg, line_num))?;
                vec![InstructionWord::new(op, self.address(addr, line_num)?)]
            }
            ("lod" | "load", _) => return Err(mismatch("register, address")),

            ("ldi" | "load_i", [Operand::Register(reg), Operand::Numeral(n)]) => {
                let op = Opcode::for_load_immediate(*reg).ok_or_else(|| self.bad_register(*reg, line_num))?;
                vec![InstructionWord::new(op, numeral(*n, line_num)?)]
            }
            ("ldi" | "load_i", _) => return Err(mismatch("register, numeral")),

            ("sto" | "store", [Operand::Register(reg), addr]) => {
                let op = Opcode::for_store(*reg).ok_or_else(|| self.bad_register(*reg, line_num))?;
                vec![InstructionWord::new(op, self.address(addr, line_num)?)]
            }
            ("sto" | "store", _) => return Err(mismatch("register, address")),

            ("sti" | "store_i", [addr, Operand::Numeral(n)]) => vec![
                InstructionWord::new(Opcode::LoadAddressImmediate, self.address(addr, line_num)?),
                InstructionWord::new(Opcode::StoreImmediate, numeral(*n, line_num)?),
            ],
            ("sti" | "store_i", _) => return Err(mismatch("address, numeral")),

            ("add", [addr]) => vec![InstructionWord::new(Opcode::Add, self.address(addr, line_num)?)],
            ("sub", [addr]) => vec![InstructionWord::new(Opcode::Subtract, self.address(addr, line_num)?)],
            ("add" | "sub", _) => return Err(mismatch("address")),

            ("sum", []) => bare(Opcode::Sum),
            ("dif" | "difference", []) => bare(Opcode::Difference),
            // The register only documents where the value lands; In always fills IO.
            ("in" | "input", [] | [Operand::Register(_)]) => bare(Opcode::In),
            ("in" | "input", _) => return Err(mismatch("register")),
            ("out" | "output", []) => bare(Opcode::Out),
            ("hlt" | "halt", []) => bare(Opcode::Halt),
            ("sum" | "dif" | "difference" | "out" | "output" | "hlt" | "halt", _) => return Err(mismatch("")),

            ("jmp" | "jump", [target]) => vec![InstructionWord::new(Opcode::Jump, self.address(target, line_num)?)],
            ("jz" | "jump_z", [target]) => vec![InstructionWord::new(Opcode::JumpZero, self.address(target, line_num)?)],
            ("jc" | "jump_c", [target]) => vec![InstructionWord::new(Opcode::JumpCarry, self.address(target, line_num)?)],
            ("jmp" | "jump" | "jz" | "jump_z" | "jc" | "jump_c", _) => return Err(mismatch("label")),

            _ => {
                return Err(AssemblerError::UnknownMnemonic {
                    line: line_num,
                    mnemonic: mnemonic.to_string(),
                })
            }
        };

        Ok(words)
    }

    /// Resolve an address or label operand.
    fn address(&self, operand: &Operand, line_num: usize) -> Result<u16, AssemblerError> {
        match operand {
            Operand::Address(addr) => Ok(*addr),
            Operand::Label(label) => self.symbols.get(label).copied().ok_or_else(|| {
                AssemblerError::UndefinedLabel { line: line_num, label: label.clone() }
            }),
            other => Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("expected an address or label, got a {}", other.kind()),
            }),
        }
    }

    fn bad_register(&self, reg: Register, line_num: usize) -> AssemblerError {
        AssemblerError::SyntaxError {
            line: line_num,
            message: format!("register {} cannot be used here", reg.name()),
        }
    }
}

/// Number of words a mnemonic expands to, if it is known.
fn word_count(mnemonic: &str) -> Option<u16> {
    match mnemonic {
        "sti" | "store_i" => Some(2),
        "mov" | "move" | "lod" | "load" | "ldi" | "load_i" | "sto" | "store" | "add" | "sub"
        | "sum" | "dif" | "difference" | "in" | "input" | "out" | "output" | "jmp" | "jump"
        | "jz" | "jump_z" | "jc" | "jump_c" | "hlt" | "halt" => Some(1),
        _ => None,
    }
}

fn parse_label_name(name: &str, line_num: usize) -> Result<String, AssemblerError> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid label '::{}'", name),
        });
    }
    Ok(name.to_string())
}

fn parse_register(name: &str) -> Option<Register> {
    match name.to_lowercase().as_str() {
        "a" => Some(Register::A),
        "b" => Some(Register::B),
        "acc" | "accumulator" => Some(Register::Accumulator),
        "adr" | "addr" | "address" => Some(Register::Address),
        "io" | "buffer" => Some(Register::IO),
        "ins" | "instruction" => Some(Register::Instruction),
        "pc" | "program_counter" => Some(Register::ProgramCounter),
        _ => None,
    }
}

fn parse_operand(token: &str, line_num: usize) -> Result<Operand, AssemblerError> {
    let syntax = |message: String| AssemblerError::SyntaxError { line: line_num, message };

    if let Some(name) = token.strip_prefix('$') {
        return parse_register(name)
            .map(Operand::Register)
            .ok_or_else(|| syntax(format!("unknown register '{}'", token)));
    }

    if let Some(hex) = token.strip_prefix('%') {
        let value = u32::from_str_radix(hex, 16).map_err(|_| syntax(format!("invalid address '{}'", token)))?;
        return u16::try_from(value)
            .map(Operand::Address)
            .map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value: value as i64 });
    }

    if let Some(name) = token.strip_prefix("::") {
        return parse_label_name(name, line_num).map(Operand::Label);
    }

    parse_numeral(token)
        .map(Operand::Numeral)
        .ok_or_else(|| syntax(format!("unrecognised token '{}'", token)))
}

/// Parse `-?(0[dxbo])?digits`.
fn parse_numeral(token: &str) -> Option<i64> {
    let (negative, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let lower = body.to_lowercase();
    let (radix, digits) = match lower.as_bytes() {
        [b'0', b'd', ..] => (10, &lower[2..]),
        [b'0', b'x', ..] => (16, &lower[2..]),
        [b'0', b'b', ..] => (2, &lower[2..]),
        [b'0', b'o', ..] => (8, &lower[2..]),
        _ => (10, lower.as_str()),
    };
    if digits.is_empty() {
        return None;
    }

    let value = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -value } else { value })
}

/// Encode a numeral as an operand field. Negative values are stored in
/// two's complement.
fn numeral(value: i64, line_num: usize) -> Result<u16, AssemblerError> {
    if value < i16::MIN as i64 || value > u16::MAX as i64 {
        return Err(AssemblerError::ValueOutOfRange { line: line_num, value });
    }
    Ok(value as u16)
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label defined twice on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            # Add two numbers
            ldi $a, 5
            ldi $b, 3
            sum
            out
            hlt
        "#;

        let image = assemble(source).unwrap();
        let ops: Vec<Option<Opcode>> = image.words().iter().map(|w| w.decode()).collect();
        assert_eq!(
            ops,
            vec![
                Some(Opcode::LoadAImmediate),
                Some(Opcode::LoadBImmediate),
                Some(Opcode::Sum),
                Some(Opcode::Out),
                Some(Opcode::Halt),
            ]
        );
        assert_eq!(image.words()[0].operand, 5);
        assert_eq!(image.entry_point(), 0);
        assert_eq!(&image.to_bytes()[2..4], &[0, 0]);
    }

    #[test]
    fn test_main_label_sets_entry_point() {
        let source = "
            hlt
            hlt
            ::main
            ldi $a, 1
            hlt
        ";
        let image = assemble(source).unwrap();
        assert_eq!(image.entry_point(), Image::address_of(2));
        assert_eq!(image.words()[2].decode(), Some(Opcode::LoadAImmediate));

        let decoded = Image::from_bytes(&image.to_bytes()).unwrap();
        assert_eq!(decoded.entry_point(), Image::address_of(2));
    }

    #[test]
    fn test_forward_and_backward_labels() {
        let source = "
            ::top
            jmp ::end
            sum
            ::end
            jz ::top
            hlt
        ";
        let image = assemble(source).unwrap();
        assert_eq!(image.words()[0].operand, Image::address_of(2));
        assert_eq!(image.words()[2].operand, Image::address_of(0));
    }

    #[test]
    fn test_store_immediate_expands() {
        let source = "
            sti %20, -1
            ::after
            jmp ::after
        ";
        let image = assemble(source).unwrap();
        assert_eq!(image.len(), 3);
        assert_eq!(image.words()[0], InstructionWord::new(Opcode::LoadAddressImmediate, 0x20));
        assert_eq!(image.words()[1], InstructionWord::new(Opcode::StoreImmediate, 0xffff));
        // The label accounts for both words
        assert_eq!(image.words()[2].operand, Image::address_of(2));
    }

    #[test]
    fn test_moves_and_aliases() {
        let image = assemble("MOVE $Accumulator, $buffer\nmov $addr, $b\nload $io, %a\nstore $acc, %ff").unwrap();
        let words = image.words();
        assert_eq!(words[0].decode(), Some(Opcode::MoveAccumulatorIo));
        assert_eq!(words[1].decode(), Some(Opcode::MoveAddressB));
        assert_eq!(words[2], InstructionWord::new(Opcode::LoadIo, 10));
        assert_eq!(words[3], InstructionWord::new(Opcode::StoreAccumulator, 255));
    }

    #[test]
    fn test_numeral_bases() {
        assert_eq!(parse_numeral("42"), Some(42));
        assert_eq!(parse_numeral("-0x1f"), Some(-31));
        assert_eq!(parse_numeral("0b101"), Some(5));
        assert_eq!(parse_numeral("0o17"), Some(15));
        assert_eq!(parse_numeral("0d99"), Some(99));
        assert_eq!(parse_numeral("0x"), None);
        assert_eq!(parse_numeral("abc"), None);
    }

    #[test]
    fn test_input_register_is_optional() {
        let image = assemble("in $io\ninput").unwrap();
        assert_eq!(image.words()[0].decode(), Some(Opcode::In));
        assert_eq!(image.words()[1].decode(), Some(Opcode::In));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(assemble("frob $a"), Err(AssemblerError::UnknownMnemonic { line: 1, .. })));
        assert!(matches!(
            assemble("jmp ::nowhere"),
            Err(AssemblerError::UndefinedLabel { line: 1, ref label }) if label == "nowhere"
        ));
        assert!(matches!(
            assemble("::a\n::a"),
            Err(AssemblerError::DuplicateLabel { line: 2, .. })
        ));
        assert!(matches!(
            assemble("ldi $a, 70000"),
            Err(AssemblerError::ValueOutOfRange { line: 1, value: 70000 })
        ));
        assert!(matches!(assemble("mov $a, $a"), Err(AssemblerError::SyntaxError { .. })));
        assert!(matches!(assemble("ldi $a, %10"), Err(AssemblerError::SyntaxError { .. })));
        assert!(matches!(assemble("sum $a"), Err(AssemblerError::SyntaxError { .. })));
        assert!(matches!(assemble("ldi $pc, 1"), Err(AssemblerError::SyntaxError { .. })));
        assert!(matches!(assemble("::main hlt"), Err(AssemblerError::SyntaxError { .. })));
    }

    #[test]
    fn test_assembled_program_runs() {
        use crate::cpu::execute::Machine;
        use crate::cpu::registers::Register;

        let source = "
            ::main
            ldi $a, 20
            ldi $b, 0x7
            dif
            sto $acc, %40
            hlt
        ";
        let image = assemble(source).unwrap();
        let mut machine = Machine::with_image(&image, 256);
        machine.run().unwrap();

        assert_eq!(machine.regs.get(Register::Accumulator), 13);
        assert_eq!(machine.mem.read(0x40).unwrap(), 13);
    }

    #[test]
    fn test_entry_and_forward_jump_run() {
        use crate::cpu::execute::Machine;
        use crate::cpu::registers::Register;

        let source = "
            ldi $a, 99
            ::main
            ldi $b, 4
            jmp ::skip
            ldi $b, 7
            ::skip
            hlt
        ";
        let image = assemble(source).unwrap();
        assert_eq!(image.entry_point(), Image::address_of(1));
        assert_eq!(image.words()[2].operand, Image::address_of(4));

        let mut machine = Machine::with_image(&image, 256);
        machine.run().unwrap();

        assert!(machine.is_halted());
        assert_eq!(machine.regs.get(Register::A), 0);
        assert_eq!(machine.regs.get(Register::B), 4);
        assert_eq!(machine.instructions(), 3);
    }
}
