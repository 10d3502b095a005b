use std::error::Error;

use env_logger::Env;
use mips_sim::cpu::CPUState;
use mips_sim::flags::MipsSimArgs;
use mips_sim::memory::MemorySystem;
use mips_sim::pipelined;
use mips_sim::pipelined::pipeline::PipelineState;
use mips_sim::run_wrapper;
use text_io::try_read;

fn main() -> Result<(), Box<dyn Error>> {
    let args = MipsSimArgs::from_env_or_exit();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let policy = args.cpu_policy();
    let (mut cpu, mut mem) = run_wrapper::prepare(
        &args.program,
        policy,
        args.cache_config(),
        args.memory_config(),
    )?;
    let mut state = PipelineState::default();

    if args.step {
        step(&mut cpu, &mut mem, &mut state)?;
    } else if let Some(cycles) = args.cycles {
        pipelined::run_cycles(&mut cpu, &mut mem, &mut state, cycles)?;
    } else {
        pipelined::run(&mut cpu, &mut mem, &mut state)?;
    }

    print_registers(&cpu);
    for range in &args.dump {
        for i in 0..range.words {
            let address = range.address.wrapping_add(4 * i);
            println!("[{:#010x}] {:#010x}", address, mem.peek_word(address)?);
        }
    }

    if policy.history {
        let stats = run_wrapper::collect_stats(&cpu, &mem);
        run_wrapper::print_history(&cpu, &stats);
    }

    Ok(())
}

/// Shows the pipeline and asks how many cycles to run next, until 0 or EOF
fn step(
    cpu: &mut CPUState,
    mem: &mut MemorySystem,
    state: &mut PipelineState,
) -> Result<(), Box<dyn Error>> {
    loop {
        println!("Cycle {}; PC: {:#010x}", cpu.history.cycle_count, cpu.pc.read());
        println!("{}", state);
        if pipelined::is_drained(cpu, mem, state) {
            println!("Pipeline drained");
            return Ok(());
        }

        println!("Cycles to run (0 to quit):");
        let cycles: Result<u64, _> = try_read!();
        match cycles {
            Ok(0) | Err(_) => return Ok(()),
            Ok(cycles) => pipelined::run_cycles(cpu, mem, state, cycles)?,
        }
    }
}

fn print_registers(cpu: &CPUState) {
    println!("PC: {:#010x}", cpu.pc.read());
    for (name, value) in cpu.gpr.non_zero() {
        println!("${:<4} = {:#010x} ({})", name, value, value as i32);
    }
}
