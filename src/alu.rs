//! ALU implementation

use crate::error::ExecutionError;

/// Performs an atomic ALU operation, returning the result and the zero flag.
/// Signed ADD/SUB overflow is reported instead of producing a result;
/// `pc` only labels the error.
pub fn alu(
    op: ALUOp,
    op1: u32,
    op2: u32,
    pc: u32,
) -> Result<(u32, bool), ExecutionError> {
    let overflow = ExecutionError::ArithmeticOverflow { pc };
    let result = match op {
        ALUOp::ADD => (op1 as i32).checked_add(op2 as i32).ok_or(overflow)? as u32,
        ALUOp::ADDU => op1.wrapping_add(op2),
        ALUOp::SUB => (op1 as i32).checked_sub(op2 as i32).ok_or(overflow)? as u32,
        ALUOp::SUBU => op1.wrapping_sub(op2),
        ALUOp::AND => op1 & op2,
        ALUOp::OR => op1 | op2,
        ALUOp::XOR => op1 ^ op2,
        ALUOp::NOR => !(op1 | op2),
        ALUOp::SLT => ((op1 as i32) < (op2 as i32)) as u32,
        ALUOp::SLTU => (op1 < op2) as u32,
        ALUOp::SLL => op1 << (op2 & 0x1f),
        ALUOp::SRL => op1 >> (op2 & 0x1f),
        ALUOp::SRA => ((op1 as i32) >> (op2 & 0x1f)) as u32,
        ALUOp::LUI => op2 << 16,
    };
    Ok((result, result == 0))
}

/// Selector for the two ALU inputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ALUSrc {
    // rs, rt
    #[default]
    REG,
    // rs, immediate
    IMM,
    // rt, shamt
    SHAMT,
    // pc, 4 (return address)
    LINK,
}

/// Set of ALU operations needed for the MIPS subset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ALUOp {
    // Arithmetic
    ADD,
    #[default]
    ADDU,
    SUB,
    SUBU,
    // Logical
    AND,
    OR,
    XOR,
    NOR,
    // Set
    SLT,
    SLTU,
    // Shift
    SLL,
    SRL,
    SRA,
    // Upper immediate
    LUI,
}
