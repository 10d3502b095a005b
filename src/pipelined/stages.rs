//! 5 stages adapted for piplined execution.
//! Each stage reads the register in front of it and overwrites the one
//! behind it; the driver calls them last stage first.

use log::debug;
use log::trace;
use log::warn;

use super::pipeline::PipelineRegister;
use super::pipeline::PipelineState;
use crate::alu::alu;
use crate::alu::ALUSrc;
use crate::cpu::CPUState;
use crate::error::SimulatorResult;
use crate::instruction::decode_helper;
use crate::instruction::Function;
use crate::instruction::RA;
use crate::memory::CacheStatus;
use crate::memory::Lookup;
use crate::memory::MemorySystem;

/// IF stage.
/// A miss or a PC past the program leaves a bubble and keeps the PC,
/// so the same fetch is issued again next cycle.
pub fn instruction_fetch(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    state: &mut PipelineState,
) -> SimulatorResult<CacheStatus> {
    let pc = cpu.pc.read();
    if cpu.past_program_end() {
        state.if_id = PipelineRegister::default();
        return Ok(CacheStatus::NoAccess);
    }

    let raw_inst = match mem.fetch_instruction(pc)? {
        Lookup::Hit(raw_inst) => raw_inst,
        Lookup::Miss => {
            trace!("Fetch miss at {:#010x}", pc);
            cpu.history.fetch_stall_count += 1;
            state.if_id = PipelineRegister::default();
            return Ok(CacheStatus::Miss);
        }
    };

    trace!("PC: {:#010x}; Instruction: {:#010x}", pc, raw_inst);
    cpu.pc.write(pc.wrapping_add(4));

    // Update IF/ID register
    state.if_id = PipelineRegister {
        pc,
        raw_inst,
        attributes: decode_helper::decompose(raw_inst),
        next_pc: pc.wrapping_add(4),
        ..Default::default()
    };
    Ok(CacheStatus::Hit)
}

/// ID stage
pub fn instruction_decode(
    cpu: &CPUState,
    state: &mut PipelineState,
) -> SimulatorResult<()> {
    let if_id = state.if_id;
    let function =
        decode_helper::get_function(if_id.raw_inst, &if_id.attributes, if_id.pc)?;
    if function == Function::NOP {
        state.id_ex = PipelineRegister::default();
        return Ok(());
    }

    let mut id_ex = if_id;
    id_ex.function = function;
    id_ex.controls = decode_helper::get_controls(function);
    if function == Function::JAL {
        id_ex.attributes.rd = RA;
    }

    // WB already ran this cycle, so the register file is up to date
    id_ex.rs_value = cpu.gpr.read(id_ex.attributes.rs);
    id_ex.rt_value = cpu.gpr.read(id_ex.attributes.rt);

    resolve_branch(&mut id_ex);
    state.id_ex = id_ex;
    Ok(())
}

/// Computes the successor of a decoded instruction from its current
/// operand values. Run again whenever forwarding patches them.
pub fn resolve_branch(reg: &mut PipelineRegister) {
    let fallthrough = reg.pc.wrapping_add(4);
    reg.next_pc = match reg.function {
        Function::BEQ | Function::BNE => {
            let equal = reg.rs_value == reg.rt_value;
            let taken = if reg.function == Function::BEQ { equal } else { !equal };
            reg.controls.branch_taken = taken;
            if taken {
                fallthrough.wrapping_add(reg.attributes.immediate << 2)
            } else {
                fallthrough
            }
        }
        Function::J | Function::JAL => {
            (fallthrough & 0xf000_0000) | (reg.attributes.address << 2)
        }
        Function::JR => reg.rs_value,
        _ => fallthrough,
    };
}

/// EX stage
pub fn execute(cpu: &mut CPUState, state: &mut PipelineState) -> SimulatorResult<()> {
    let mut ex_mem = state.id_ex;
    let attributes = ex_mem.attributes;
    let (op1, op2) = match ex_mem.controls.alu_src {
        ALUSrc::REG => (ex_mem.rs_value, ex_mem.rt_value),
        ALUSrc::IMM => (ex_mem.rs_value, attributes.immediate),
        ALUSrc::SHAMT => (ex_mem.rt_value, attributes.shamt),
        ALUSrc::LINK => (ex_mem.pc, 4),
    };

    match alu(ex_mem.controls.alu_op, op1, op2, ex_mem.pc) {
        Ok((result, _)) => ex_mem.alu_result = result,
        Err(err) => {
            if cpu.policy.halt_on_overflow {
                return Err(err.into());
            }
            // Squash: nothing is written back
            warn!("{}; squashing {:?}", err, ex_mem.function);
            cpu.history.overflow_count += 1;
            ex_mem.alu_result = 0;
            ex_mem.controls.reg_write = false;
        }
    }

    state.ex_mem = ex_mem;
    Ok(())
}

/// MEM stage.
/// Loads and stores go through the data side of the memory system; a store
/// reads the word, merges its lane in and writes the word back. A Miss
/// leaves a bubble in MEM/WB and EX/MEM is retried next cycle.
pub fn memory_access(
    cpu: &CPUState,
    mem: &mut MemorySystem,
    state: &mut PipelineState,
) -> SimulatorResult<CacheStatus> {
    let mut mem_wb = state.ex_mem;
    let controls = mem_wb.controls;
    if !controls.mem_read && !controls.mem_write {
        mem_wb.status = CacheStatus::NoAccess;
        state.mem_wb = mem_wb;
        return Ok(CacheStatus::NoAccess);
    }

    let (step, signed) = mem_wb.function.mem_step();
    let address = mem_wb.alu_result;
    mem.main.check(address, step)?;
    // Only reachable unaligned when sanity checking is off
    let address = address & !(step - 1);
    let aligned = address & !3;
    let shift = (4 - step - (address & 3)) * 8;
    let mask = if step == 4 { u32::MAX } else { (1 << (step * 8)) - 1 };

    let word = match mem.read_data(aligned)? {
        Lookup::Hit(word) => word,
        Lookup::Miss => return Ok(stall(state)),
    };

    let status = if controls.mem_read {
        let lane = (word >> shift) & mask;
        mem_wb.mem_data = if signed {
            let unused = 32 - step * 8;
            (((lane << unused) as i32) >> unused) as u32
        } else {
            lane
        };
        trace!("Load {:#010x} -> {:#010x}", address, mem_wb.mem_data);
        CacheStatus::Hit
    } else {
        let merged = (word & !(mask << shift)) | ((mem_wb.rt_value & mask) << shift);
        trace!("Store {:#010x} <- {:#010x}", aligned, merged);
        mem.write_data(aligned, merged)?
    };

    if status == CacheStatus::Miss {
        return Ok(stall(state));
    }
    debug!(
        "Cycle {}: {:?} at {:#010x} hit",
        cpu.history.cycle_count, mem_wb.function, address
    );
    mem_wb.status = status;
    state.mem_wb = mem_wb;
    Ok(status)
}

fn stall(state: &mut PipelineState) -> CacheStatus {
    state.mem_wb = PipelineRegister {
        status: CacheStatus::Miss,
        ..Default::default()
    };
    CacheStatus::Miss
}

/// WB stage
pub fn write_back(cpu: &mut CPUState, state: &PipelineState) {
    let mem_wb = &state.mem_wb;
    if mem_wb.is_bubble() {
        return;
    }

    cpu.history.inst_count += 1;
    if mem_wb.controls.reg_write {
        trace!("Write back ${} <- {:#010x}", mem_wb.dest(), mem_wb.result());
        cpu.gpr.write(mem_wb.dest(), mem_wb.result());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CPUPolicy;
    use crate::instruction::encode;
    use crate::memory::main_memory::MemoryConfig;
    use crate::memory::CacheConfig;
    use crate::memory::CacheMode;

    fn uncached() -> MemorySystem {
        let config = CacheConfig { mode: CacheMode::Disabled, ..Default::default() };
        MemorySystem::make(config, MemoryConfig::default()).unwrap()
    }

    fn decode(cpu: &CPUState, pc: u32, raw: u32) -> PipelineRegister {
        let mut state = PipelineState::default();
        state.if_id = PipelineRegister {
            pc,
            raw_inst: raw,
            attributes: decode_helper::decompose(raw),
            ..Default::default()
        };
        instruction_decode(cpu, &mut state).unwrap();
        state.id_ex
    }

    /// Runs a decoded instruction through EX and MEM
    fn execute_and_access(
        cpu: &mut CPUState,
        mem: &mut MemorySystem,
        id_ex: PipelineRegister,
    ) -> PipelineRegister {
        let mut state = PipelineState { id_ex, ..Default::default() };
        execute(cpu, &mut state).unwrap();
        memory_access(cpu, mem, &mut state).unwrap();
        state.mem_wb
    }

    #[test]
    fn test_fetch_advances_pc() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        let mut mem = uncached();
        mem.main.write_word(0, encode::addi(8, 0, 7)).unwrap();
        cpu.program_end = 4;

        let mut state = PipelineState::default();
        assert_eq!(
            instruction_fetch(&mut cpu, &mut mem, &mut state).unwrap(),
            CacheStatus::Hit
        );
        assert_eq!(cpu.pc.read(), 4);
        assert_eq!(state.if_id.attributes.rt, 8);

        // Past the end: bubble, PC stays
        instruction_fetch(&mut cpu, &mut mem, &mut state).unwrap();
        assert!(state.if_id.is_bubble());
        assert_eq!(cpu.pc.read(), 4);
    }

    #[test]
    fn test_branch_resolution() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        cpu.gpr.write(17, 5);
        cpu.gpr.write(18, 5);

        let beq = decode(&cpu, 0x100, encode::beq(17, 18, 3));
        assert!(beq.controls.branch_taken);
        assert_eq!(beq.next_pc, 0x100 + 4 + 12);

        let bne = decode(&cpu, 0x100, encode::bne(17, 18, 3));
        assert!(!bne.controls.branch_taken);
        assert_eq!(bne.next_pc, 0x104);

        // Backwards
        let back = decode(&cpu, 0x100, encode::beq(17, 18, -2));
        assert_eq!(back.next_pc, 0x100 + 4 - 8);
    }

    #[test]
    fn test_jumps() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        cpu.gpr.write(31, 0x2000);

        let j = decode(&cpu, 0x1000_0000, encode::j(0x40));
        assert!(j.controls.jump);
        assert_eq!(j.next_pc, 0x1000_0040);

        let jal = decode(&cpu, 0x80, encode::jal(0x200));
        assert_eq!(jal.next_pc, 0x200);
        assert_eq!(jal.dest(), RA);

        let jr = decode(&cpu, 0x80, encode::jr(31));
        assert_eq!(jr.next_pc, 0x2000);
    }

    #[test]
    fn test_jal_links_return_address() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        let mut mem = uncached();
        let jal = decode(&cpu, 0x80, encode::jal(0x200));
        let mem_wb = execute_and_access(&mut cpu, &mut mem, jal);
        assert_eq!(mem_wb.alu_result, 0x84);
        assert!(mem_wb.controls.reg_write);
    }

    #[test]
    fn test_overflow_is_squashed() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        cpu.gpr.write(8, i32::MAX as u32);
        let mut state = PipelineState {
            id_ex: decode(&cpu, 0, encode::addi(9, 8, 1)),
            ..Default::default()
        };
        execute(&mut cpu, &mut state).unwrap();
        assert!(!state.ex_mem.controls.reg_write);
        assert_eq!(cpu.history.overflow_count, 1);
    }

    #[test]
    fn test_overflow_halts_when_asked() {
        let mut cpu = CPUState::make(CPUPolicy {
            halt_on_overflow: true,
            ..Default::default()
        });
        cpu.gpr.write(8, i32::MIN as u32);
        cpu.gpr.write(9, 1);
        let mut state = PipelineState {
            id_ex: decode(&cpu, 0x10, encode::sub(10, 8, 9)),
            ..Default::default()
        };
        assert!(matches!(
            execute(&mut cpu, &mut state),
            Err(crate::error::SimulatorError::ExecutionError(
                crate::error::ExecutionError::ArithmeticOverflow { pc: 0x10 }
            ))
        ));
    }

    #[test]
    fn test_load_lanes_big_endian() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        let mut mem = uncached();
        mem.main.write_word(0x100, 0x8081_f0f1).unwrap();
        cpu.gpr.write(16, 0x100);

        let cases = [
            (encode::lb(8, 0, 16), 0xffff_ff80),
            (encode::lbu(8, 1, 16), 0x81),
            (encode::lb(8, 3, 16), 0xffff_fff1),
            (encode::lh(8, 0, 16), 0xffff_8081),
            (encode::lh(8, 2, 16), 0xffff_f0f1),
            (encode::lw(8, 0, 16), 0x8081_f0f1),
        ];
        for (raw, expected) in cases {
            let id_ex = decode(&cpu, 0, raw);
            let mem_wb = execute_and_access(&mut cpu, &mut mem, id_ex);
            assert_eq!(mem_wb.mem_data, expected, "{:?}", mem_wb.function);
        }
    }

    #[test]
    fn test_partial_stores_merge() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        let mut mem = uncached();
        mem.main.write_word(0x100, 0x1122_3344).unwrap();
        cpu.gpr.write(16, 0x100);
        cpu.gpr.write(9, 0xaabb_ccdd);

        let id_ex = decode(&cpu, 0, encode::sb(9, 1, 16));
        execute_and_access(&mut cpu, &mut mem, id_ex);
        assert_eq!(mem.main.read_word(0x100).unwrap(), 0x11dd_3344);

        let id_ex = decode(&cpu, 0, encode::sh(9, 2, 16));
        execute_and_access(&mut cpu, &mut mem, id_ex);
        assert_eq!(mem.main.read_word(0x100).unwrap(), 0x11dd_ccdd);
    }

    #[test]
    fn test_misaligned_load_is_fatal() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        let mut mem = uncached();
        cpu.gpr.write(16, 0x102);
        let mut state = PipelineState {
            id_ex: decode(&cpu, 0, encode::lw(8, 0, 16)),
            ..Default::default()
        };
        execute(&mut cpu, &mut state).unwrap();
        assert!(memory_access(&cpu, &mut mem, &mut state).is_err());
    }

    #[test]
    fn test_write_back_respects_reg_write() {
        let mut cpu = CPUState::make(CPUPolicy::default());
        let mut mem = uncached();
        cpu.gpr.write(16, 0x100);
        cpu.gpr.write(9, 77);

        // A store retires without touching registers
        let sw = decode(&cpu, 0, encode::sw(9, 0, 16));
        let mem_wb = execute_and_access(&mut cpu, &mut mem, sw);
        let state = PipelineState { mem_wb, ..Default::default() };
        write_back(&mut cpu, &state);
        assert_eq!(cpu.gpr.read(9), 77);
        assert_eq!(cpu.history.inst_count, 1);

        let lw = decode(&cpu, 0, encode::lw(10, 0, 16));
        let mem_wb = execute_and_access(&mut cpu, &mut mem, lw);
        let state = PipelineState { mem_wb, ..Default::default() };
        write_back(&mut cpu, &state);
        assert_eq!(cpu.gpr.read(10), 77);
    }
}
