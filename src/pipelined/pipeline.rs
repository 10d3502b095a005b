//! Pipeline state
use std::fmt;

use crate::instruction::Attributes;
use crate::instruction::Controls;
use crate::instruction::Function;
use crate::instruction::NOP;
use crate::memory::CacheStatus;

/// Pipeline state = 4 pipeline registers
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct PipelineState {
    pub if_id: PipelineRegister,
    pub id_ex: PipelineRegister,
    pub ex_mem: PipelineRegister,
    pub mem_wb: PipelineRegister,
}

impl PipelineState {
    /// Every register holds a bubble
    pub fn is_empty(&self) -> bool {
        self.if_id.is_bubble()
            && self.id_ex.is_bubble()
            && self.ex_mem.is_bubble()
            && self.mem_wb.is_bubble()
    }

    /// rs of the decoded instruction can be forwarded from the execution result
    /// See P&H p. 300
    pub fn ex_hazard_rs(&self) -> bool {
        self.id_ex.function.reads_rs()
            && Self::ex_forwards(&self.ex_mem, self.id_ex.attributes.rs)
    }

    /// rt of the decoded instruction can be forwarded from the execution result
    /// See P&H p. 300
    pub fn ex_hazard_rt(&self) -> bool {
        self.id_ex.function.reads_rt()
            && Self::ex_forwards(&self.ex_mem, self.id_ex.attributes.rt)
    }

    /// rs can be forwarded from MEM/WB
    /// Precondition: ex_hazard_rs is false
    /// See P&H p. 301
    pub fn mem_hazard_rs(&self) -> bool {
        self.id_ex.function.reads_rs()
            && Self::mem_forwards(&self.mem_wb, self.id_ex.attributes.rs)
    }

    /// rt can be forwarded from MEM/WB
    /// Precondition: ex_hazard_rt is false
    /// See P&H p. 301
    pub fn mem_hazard_rt(&self) -> bool {
        self.id_ex.function.reads_rt()
            && Self::mem_forwards(&self.mem_wb, self.id_ex.attributes.rt)
    }

    /// A load result is not known before MEM, so EX/MEM only forwards ALU results
    fn ex_forwards(producer: &PipelineRegister, reg: u32) -> bool {
        reg != 0
            && producer.controls.reg_write
            && !producer.controls.mem_to_reg
            && producer.dest() == reg
    }

    fn mem_forwards(producer: &PipelineRegister, reg: u32) -> bool {
        reg != 0 && producer.controls.reg_write && producer.dest() == reg
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "IF/ID  {}", self.if_id)?;
        writeln!(f, "ID/EX  {}", self.id_ex)?;
        writeln!(f, "EX/MEM {}", self.ex_mem)?;
        write!(f, "MEM/WB {}", self.mem_wb)
    }
}

/// One pipeline register.
/// The same layout serves all four boundaries; each stage fills in
/// what it computes and copies the rest forward.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct PipelineRegister {
    /// Address of the instruction held here
    pub pc: u32,

    /// Raw instruction
    pub raw_inst: u32,
    pub attributes: Attributes,

    /// Set by decode
    pub function: Function,
    pub controls: Controls,

    /// Register values sampled in decode, patched by forwarding
    pub rs_value: u32,
    pub rt_value: u32,

    /// Successor address: pc + 4, or the resolved branch/jump target
    pub next_pc: u32,

    pub alu_result: u32,
    /// Word produced by a load, lane-extracted
    pub mem_data: u32,

    /// Memory access outcome of the MEM stage
    pub status: CacheStatus,
}

impl PipelineRegister {
    pub fn is_bubble(&self) -> bool {
        self.raw_inst == NOP
    }

    /// Destination register
    pub fn dest(&self) -> u32 {
        if self.controls.reg_dst {
            self.attributes.rd
        } else {
            self.attributes.rt
        }
    }

    /// Value the instruction writes back
    pub fn result(&self) -> u32 {
        if self.controls.mem_to_reg {
            self.mem_data
        } else {
            self.alu_result
        }
    }
}

impl fmt::Display for PipelineRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bubble() {
            write!(f, "(bubble)")
        } else {
            write!(
                f,
                "{:#010x}: {:?} [{:#010x}]",
                self.pc, self.function, self.raw_inst
            )
        }
    }
}
