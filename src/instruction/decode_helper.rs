//! Decoding helper functions.

use super::Attributes;
use super::Controls;
use super::Function;
use super::Opcode;
use crate::alu::ALUOp;
use crate::alu::ALUSrc;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;

/// Splits a raw instruction into every field it could carry.
/// The immediate is zero-extended for the bitwise-immediate
/// and unsigned-compare opcodes, sign-extended otherwise.
pub fn decompose(raw_inst: u32) -> Attributes {
    let opcode = get_opcode(raw_inst);
    let imm16 = raw_inst & 0xffff;
    let immediate = match opcode {
        // sltiu, andi, ori, xori
        0x0b | 0x0c | 0x0d | 0x0e => imm16,
        _ => ((imm16 as i16) as i32) as u32,
    };

    Attributes {
        opcode,
        rs: get_rs(raw_inst),
        rt: get_rt(raw_inst),
        rd: get_rd(raw_inst),
        shamt: get_shamt(raw_inst),
        funct: get_funct(raw_inst),
        immediate,
        address: raw_inst & 0x03ff_ffff,
    }
}

/// Returns the opcode from the primary opcode field
pub fn raw_to_opcode(opcode: u32) -> Option<Opcode> {
    use Opcode::*;
    Some(match opcode {
        0x00 => Special,
        0x02 => J,
        0x03 => Jal,
        0x04 => Beq,
        0x05 => Bne,
        0x08 => Addi,
        0x09 => Addiu,
        0x0a => Slti,
        0x0b => Sltiu,
        0x0c => Andi,
        0x0d => Ori,
        0x0e => Xori,
        0x0f => Lui,
        0x20 => Lb,
        0x21 => Lh,
        0x23 => Lw,
        0x24 => Lbu,
        0x25 => Lhu,
        0x28 => Sb,
        0x29 => Sh,
        0x2b => Sw,
        _ => return None,
    })
}

/// Determines an instruction's mnemonic.
/// Unknown opcodes and R-type function codes are illegal instructions.
pub fn get_function(
    raw_inst: u32,
    attributes: &Attributes,
    pc: u32,
) -> SimulatorResult<Function> {
    use Function::*;

    if raw_inst == super::NOP {
        return Ok(NOP);
    }

    let illegal = || SimulatorError::InvalidInstructionError(raw_inst, pc);
    let opcode = raw_to_opcode(attributes.opcode).ok_or_else(illegal)?;

    Ok(match opcode {
        Opcode::Special => match attributes.funct {
            0x00 => SLL,
            0x02 => SRL,
            0x03 => SRA,
            0x08 => JR,
            0x20 => ADD,
            0x21 => ADDU,
            0x22 => SUB,
            0x23 => SUBU,
            0x24 => AND,
            0x25 => OR,
            0x26 => XOR,
            0x27 => NOR,
            0x2a => SLT,
            0x2b => SLTU,
            _ => return Err(illegal()),
        },
        Opcode::J => J,
        Opcode::Jal => JAL,
        Opcode::Beq => BEQ,
        Opcode::Bne => BNE,
        Opcode::Addi => ADDI,
        Opcode::Addiu => ADDIU,
        Opcode::Slti => SLTI,
        Opcode::Sltiu => SLTIU,
        Opcode::Andi => ANDI,
        Opcode::Ori => ORI,
        Opcode::Xori => XORI,
        Opcode::Lui => LUI,
        Opcode::Lb => LB,
        Opcode::Lh => LH,
        Opcode::Lw => LW,
        Opcode::Lbu => LBU,
        Opcode::Lhu => LHU,
        Opcode::Sb => SB,
        Opcode::Sh => SH,
        Opcode::Sw => SW,
    })
}

/// Sets the full control tuple for a decoded mnemonic.
/// `branch_taken` is resolved later, once operand values are known.
pub fn get_controls(function: Function) -> Controls {
    use Function::*;

    Controls {
        reg_dst: matches!(
            function,
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
                | JAL
        ),
        alu_src: match function {
            SLL | SRL | SRA => ALUSrc::SHAMT,
            JAL => ALUSrc::LINK,
            ADDI | ADDIU | SLTI | SLTIU | ANDI | ORI | XORI | LUI | LB | LH
            | LW | LBU | LHU | SB | SH | SW => ALUSrc::IMM,
            _ => ALUSrc::REG,
        },
        alu_op: match function {
            ADD | ADDI => ALUOp::ADD,
            SUB => ALUOp::SUB,
            SUBU | BEQ | BNE => ALUOp::SUBU,
            AND | ANDI => ALUOp::AND,
            OR | ORI => ALUOp::OR,
            XOR | XORI => ALUOp::XOR,
            NOR => ALUOp::NOR,
            SLT | SLTI => ALUOp::SLT,
            SLTU | SLTIU => ALUOp::SLTU,
            SLL => ALUOp::SLL,
            SRL => ALUOp::SRL,
            SRA => ALUOp::SRA,
            LUI => ALUOp::LUI,
            // Address computation, return address, and the rest
            _ => ALUOp::ADDU,
        },
        mem_read: matches!(function, LB | LH | LW | LBU | LHU),
        mem_write: matches!(function, SB | SH | SW),
        mem_to_reg: matches!(function, LB | LH | LW | LBU | LHU),
        reg_write: !matches!(
            function,
            NOP | JR | J | BEQ | BNE | SB | SH | SW
        ),
        jump: matches!(function, J | JAL | JR),
        branch: matches!(function, BEQ | BNE),
        branch_taken: false,
    }
}

/// Extracts the primary opcode from a raw instruction
fn get_opcode(raw_inst: u32) -> u32 {
    raw_inst >> 26
}

/// Extracts the rs field from a raw instruction
fn get_rs(raw_inst: u32) -> u32 {
    (raw_inst >> 21) & 0x1f
}

/// Extracts the rt field from a raw instruction
fn get_rt(raw_inst: u32) -> u32 {
    (raw_inst >> 16) & 0x1f
}

/// Extracts the rd field from a raw instruction
fn get_rd(raw_inst: u32) -> u32 {
    (raw_inst >> 11) & 0x1f
}

/// Extracts the shift amount from a raw instruction
fn get_shamt(raw_inst: u32) -> u32 {
    (raw_inst >> 6) & 0x1f
}

/// Extracts the R-type function code from a raw instruction
fn get_funct(raw_inst: u32) -> u32 {
    raw_inst & 0x3f
}
