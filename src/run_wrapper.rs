//! A simulator wrapper

use std::path::Path;

use log::info;

use crate::cpu::CPUPolicy;
use crate::cpu::CPUState;
use crate::error::SimulatorResult;
use crate::loader;
use crate::memory::cache::CacheHistory;
use crate::memory::main_memory::MemoryConfig;
use crate::memory::CacheConfig;
use crate::memory::MemorySystem;
use crate::pipelined;
use crate::pipelined::pipeline::PipelineState;

/// Summary of a finished run
#[derive(Clone, Copy, Debug)]
pub struct RunStats {
    pub cycles: u64,
    pub instructions: u64,
    pub cpi: f64,
    pub fetch_stalls: u64,
    pub mem_stalls: u64,
    pub icache: Option<CacheHistory>,
    pub dcache: Option<CacheHistory>,
}

/// Builds the machine and loads the program into it
pub fn prepare(
    program: &Path,
    policy: CPUPolicy,
    cache_config: CacheConfig,
    memory_config: MemoryConfig,
) -> SimulatorResult<(CPUState, MemorySystem)> {
    let mut cpu = CPUState::make(policy);
    let mut mem = MemorySystem::make(cache_config, memory_config)?;
    loader::load_program(program, &mut cpu, &mut mem.main)?;
    info!(
        "Program {} spans {:#010x}..{:#010x}",
        program.display(),
        cpu.pc.read(),
        cpu.program_end
    );
    Ok((cpu, mem))
}

/// Run simulation on the given program until it drains
pub fn run(
    program: &Path,
    policy: CPUPolicy,
    cache_config: CacheConfig,
    memory_config: MemoryConfig,
) -> SimulatorResult<RunStats> {
    let (mut cpu, mut mem) = prepare(program, policy, cache_config, memory_config)?;
    let mut state = PipelineState::default();
    pipelined::run(&mut cpu, &mut mem, &mut state)?;

    let stats = collect_stats(&cpu, &mem);
    if policy.history {
        print_history(&cpu, &stats);
    }
    Ok(stats)
}

pub fn collect_stats(cpu: &CPUState, mem: &MemorySystem) -> RunStats {
    let history = cpu.history;
    RunStats {
        cycles: history.cycle_count,
        instructions: history.inst_count,
        cpi: history.cpi(),
        fetch_stalls: history.fetch_stall_count,
        mem_stalls: history.mem_stall_count,
        icache: mem.icache().ok().map(|cache| cache.history),
        dcache: mem.dcache().ok().map(|cache| cache.history),
    }
}

pub fn print_history(cpu: &CPUState, stats: &RunStats) {
    let history = &cpu.history;
    eprintln!(
        "[HISTORY] # cycles = {}, # instructions = {}, CPI = {:.2}",
        stats.cycles, stats.instructions, stats.cpi
    );
    eprintln!(
        "[HISTORY] Stalls: fetch = {}, memory = {}, load-use = {}; flushes = {}; overflows = {}",
        history.fetch_stall_count,
        history.mem_stall_count,
        history.load_use_stall_count,
        history.flush_count,
        history.overflow_count
    );
    for (name, cache) in [("I-cache", stats.icache), ("D-cache", stats.dcache)] {
        if let Some(cache) = cache {
            eprintln!(
                "[HISTORY] {}: {} hits, {} misses, miss rate = {:.3}",
                name,
                cache.num_hit,
                cache.num_miss,
                cache.get_miss_rate()
            );
        }
    }
}
