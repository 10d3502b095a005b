//! Hazard and forwarding unit.
//! Runs once per cycle after all five stages, on their fresh outputs,
//! and is the only place that overrides the PC.

use log::debug;

use super::pipeline::PipelineRegister;
use super::pipeline::PipelineState;
use super::stages;
use crate::cpu::CPUState;

/// Applies load-use stalling, forwarding and control flushes, in that order
pub fn resolve(cpu: &mut CPUState, state: &mut PipelineState) {
    if load_use_hazard(state) {
        stall_load_use(cpu, state);
    }
    if forward(state) {
        // Branch and jr outcomes depend on the operands just patched
        stages::resolve_branch(&mut state.id_ex);
    }
    if control_hazard(state) {
        flush(cpu, state);
    }
}

/// The load now in ID/EX writes a register the instruction in IF/ID names.
/// IF/ID fields are matched raw, before decoding.
pub fn load_use_hazard(state: &PipelineState) -> bool {
    let load = &state.id_ex;
    let next = &state.if_id;
    // j and jal name no registers
    let jumps = matches!(next.attributes.opcode, 0x02 | 0x03);

    load.controls.mem_read
        && load.attributes.rt != 0
        && !next.is_bubble()
        && !jumps
        && (next.attributes.rs == load.attributes.rt
            || next.attributes.rt == load.attributes.rt)
}

/// Nulls IF/ID; with refetching on, the PC goes back so the nulled
/// instruction is fetched again next cycle.
fn stall_load_use(cpu: &mut CPUState, state: &mut PipelineState) {
    let pc = state.if_id.pc;
    debug!("Load-use stall on {:#010x}", pc);
    cpu.history.load_use_stall_count += 1;
    state.if_id = PipelineRegister::default();
    if cpu.policy.refetch_on_load_use {
        cpu.pc.write(pc);
    }
}

/// Patches the operands of ID/EX with results not yet written back.
/// EX/MEM wins over MEM/WB. Returns whether anything was forwarded.
pub fn forward(state: &mut PipelineState) -> bool {
    let mut forwarded = false;

    if state.ex_hazard_rs() {
        state.id_ex.rs_value = state.ex_mem.alu_result;
        debug!("Forward EX/MEM -> rs ${}", state.id_ex.attributes.rs);
        forwarded = true;
    } else if state.mem_hazard_rs() {
        state.id_ex.rs_value = state.mem_wb.result();
        debug!("Forward MEM/WB -> rs ${}", state.id_ex.attributes.rs);
        forwarded = true;
    }

    if state.ex_hazard_rt() {
        state.id_ex.rt_value = state.ex_mem.alu_result;
        debug!("Forward EX/MEM -> rt ${}", state.id_ex.attributes.rt);
        forwarded = true;
    } else if state.mem_hazard_rt() {
        state.id_ex.rt_value = state.mem_wb.result();
        debug!("Forward MEM/WB -> rt ${}", state.id_ex.attributes.rt);
        forwarded = true;
    }

    forwarded
}

/// ID/EX holds a jump or a taken branch
pub fn control_hazard(state: &PipelineState) -> bool {
    state.id_ex.controls.jump || state.id_ex.controls.branch_taken
}

fn flush(cpu: &mut CPUState, state: &mut PipelineState) {
    let id_ex = &state.id_ex;
    debug!(
        "{:?} at {:#010x} redirects to {:#010x}",
        id_ex.function, id_ex.pc, id_ex.next_pc
    );
    cpu.history.flush_count += 1;
    cpu.pc.write(id_ex.next_pc);
    state.if_id = PipelineRegister::default();
}
