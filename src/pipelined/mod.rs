//! Pipelined implementation

use log::debug;

use crate::cpu::CPUState;
use crate::error::ExecutionError;
use crate::error::SimulatorResult;
use crate::memory::CacheStatus;
use crate::memory::MemorySystem;
use crate::pipelined::pipeline::PipelineState;

pub mod hazard;
pub mod pipeline;
pub mod stages;

/// Advances the whole machine by one clock cycle.
/// Stages run last to first, so each sees this cycle's downstream
/// results and last cycle's upstream ones. The memory system digests
/// once at the end.
pub fn tick(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    state: &mut PipelineState,
) -> SimulatorResult<()> {
    cpu.history.cycle_count += 1;
    debug!(
        "Cycle {}; PC: {:#010x}",
        cpu.history.cycle_count,
        cpu.pc.read()
    );

    stages::write_back(cpu, state);
    if stages::memory_access(cpu, mem, state)? == CacheStatus::Miss {
        // The data side holds everything behind it
        debug!("Data stall on {:#010x}", state.ex_mem.pc);
        cpu.history.mem_stall_count += 1;
    } else {
        stages::execute(cpu, state)?;
        stages::instruction_decode(cpu, state)?;
        stages::instruction_fetch(cpu, mem, state)?;
        hazard::resolve(cpu, state);
    }

    mem.tick()
}

/// Runs exactly `cycles` cycles
pub fn run_cycles(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    state: &mut PipelineState,
    cycles: u64,
) -> SimulatorResult<()> {
    for _ in 0..cycles {
        tick(cpu, mem, state)?;
    }
    Ok(())
}

/// Runs until the program has drained out of the pipeline
pub fn run(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    state: &mut PipelineState,
) -> SimulatorResult<()> {
    while !is_drained(cpu, mem, state) {
        if cpu.history.cycle_count >= cpu.policy.max_cycles {
            return Err(
                ExecutionError::ExecutionLimitReached(cpu.history.cycle_count).into()
            );
        }
        tick(cpu, mem, state)?;
    }
    debug!("Drained after {} cycles", cpu.history.cycle_count);
    Ok(())
}

/// Nothing left to fetch, nothing in flight, nothing waiting on memory
pub fn is_drained(cpu: &CPUState, mem: &MemorySystem, state: &PipelineState) -> bool {
    cpu.past_program_end() && state.is_empty() && mem.is_idle()
}
