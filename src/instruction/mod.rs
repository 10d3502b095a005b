//! Instruction representation

use crate::alu::ALUOp;
use crate::alu::ALUSrc;

pub mod decode_helper;
#[cfg(test)]
pub mod encode;

/// NOP: SLL $zero, $zero, 0
pub const NOP: u32 = 0;

/// Link register written by JAL
pub const RA: u32 = 31;

/// MIPS primary opcode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Special,
    J,
    Jal,
    Beq,
    Bne,
    Addi,
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
    Lui,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Sb,
    Sh,
    Sw,
}

/// Instruction mnemonic after decoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Function {
    #[default]
    NOP,
    // R-type
    ADD,
    ADDU,
    SUB,
    SUBU,
    AND,
    OR,
    XOR,
    NOR,
    SLT,
    SLTU,
    SLL,
    SRL,
    SRA,
    JR,
    // I-type
    ADDI,
    ADDIU,
    SLTI,
    SLTIU,
    ANDI,
    ORI,
    XORI,
    LUI,
    LB,
    LH,
    LW,
    LBU,
    LHU,
    SB,
    SH,
    SW,
    BEQ,
    BNE,
    // J-type
    J,
    JAL,
}

impl Function {
    /// Is rs read as a register operand?
    pub fn reads_rs(self) -> bool {
        use Function::*;
        !matches!(self, NOP | SLL | SRL | SRA | LUI | J | JAL)
    }

    /// Is rt read as a register operand?
    pub fn reads_rt(self) -> bool {
        use Function::*;
        matches!(
            self,
            ADD | ADDU
                | SUB
                | SUBU
                | AND
                | OR
                | XOR
                | NOR
                | SLT
                | SLTU
                | SLL
                | SRL
                | SRA
                | SB
                | SH
                | SW
                | BEQ
                | BNE
        )
    }

    /// Access width in bytes and whether a load sign-extends
    pub fn mem_step(self) -> (u32, bool) {
        use Function::*;
        match self {
            LB => (1, true),
            LBU | SB => (1, false),
            LH => (2, true),
            LHU | SH => (2, false),
            LW | SW => (4, false),
            _ => (0, false),
        }
    }
}

/// Fields of a raw instruction, decomposed by fetch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attributes {
    pub opcode: u32,
    pub rs: u32,
    pub rt: u32,
    pub rd: u32,
    pub shamt: u32,
    pub funct: u32,
    /// Sign- or zero-extended 16-bit immediate
    pub immediate: u32,
    /// 26-bit jump target field
    pub address: u32,
}

/// Control signals
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    /// Destination is rd (true) or rt (false)
    pub reg_dst: bool,
    pub alu_src: ALUSrc,
    pub alu_op: ALUOp,
    pub mem_read: bool,
    pub mem_write: bool,
    /// Write back the loaded word instead of the ALU result
    pub mem_to_reg: bool,
    pub reg_write: bool,
    pub jump: bool,
    /// Conditional branch, resolved in decode
    pub branch: bool,
    pub branch_taken: bool,
}
