//! Test-only instruction encoder

pub fn r_type(funct: u32, rs: u32, rt: u32, rd: u32, shamt: u32) -> u32 {
    (rs << 21) | (rt << 16) | (rd << 11) | (shamt << 6) | funct
}

pub fn i_type(opcode: u32, rs: u32, rt: u32, imm: u16) -> u32 {
    (opcode << 26) | (rs << 21) | (rt << 16) | imm as u32
}

pub fn j_type(opcode: u32, address: u32) -> u32 {
    (opcode << 26) | (address & 0x03ff_ffff)
}

pub fn add(rd: u32, rs: u32, rt: u32) -> u32 {
    r_type(0x20, rs, rt, rd, 0)
}

pub fn sub(rd: u32, rs: u32, rt: u32) -> u32 {
    r_type(0x22, rs, rt, rd, 0)
}

pub fn sll(rd: u32, rt: u32, shamt: u32) -> u32 {
    r_type(0x00, 0, rt, rd, shamt)
}

pub fn jr(rs: u32) -> u32 {
    r_type(0x08, rs, 0, 0, 0)
}

pub fn addi(rt: u32, rs: u32, imm: i16) -> u32 {
    i_type(0x08, rs, rt, imm as u16)
}

pub fn lui(rt: u32, imm: u16) -> u32 {
    i_type(0x0f, 0, rt, imm)
}

pub fn ori(rt: u32, rs: u32, imm: u16) -> u32 {
    i_type(0x0d, rs, rt, imm)
}

pub fn lw(rt: u32, offset: i16, base: u32) -> u32 {
    i_type(0x23, base, rt, offset as u16)
}

pub fn lb(rt: u32, offset: i16, base: u32) -> u32 {
    i_type(0x20, base, rt, offset as u16)
}

pub fn lbu(rt: u32, offset: i16, base: u32) -> u32 {
    i_type(0x24, base, rt, offset as u16)
}

pub fn lh(rt: u32, offset: i16, base: u32) -> u32 {
    i_type(0x21, base, rt, offset as u16)
}

pub fn sw(rt: u32, offset: i16, base: u32) -> u32 {
    i_type(0x2b, base, rt, offset as u16)
}

pub fn sb(rt: u32, offset: i16, base: u32) -> u32 {
    i_type(0x28, base, rt, offset as u16)
}

pub fn sh(rt: u32, offset: i16, base: u32) -> u32 {
    i_type(0x29, base, rt, offset as u16)
}

pub fn beq(rs: u32, rt: u32, offset: i16) -> u32 {
    i_type(0x04, rs, rt, offset as u16)
}

pub fn bne(rs: u32, rt: u32, offset: i16) -> u32 {
    i_type(0x05, rs, rt, offset as u16)
}

pub fn j(target: u32) -> u32 {
    j_type(0x02, target >> 2)
}

pub fn jal(target: u32) -> u32 {
    j_type(0x03, target >> 2)
}

pub const NOP: u32 = 0;
