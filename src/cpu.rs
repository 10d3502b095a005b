//! MIPS CPU state

/// Default cycle limit for a run that never drains
pub const DEFAULT_MAX_CYCLES: u64 = 10_000_000;

/// Register names following the MIPS calling convention
pub const REGISTER_NAMES: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3",
    "t4", "t5", "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7",
    "t8", "t9", "k0", "k1", "gp", "sp", "fp", "ra",
];

/// CPU state
#[derive(Clone, Copy)]
pub struct CPUState {
    /// Program counter
    pub pc: Register,
    /// General purpose registers
    pub gpr: RegisterFile,
    /// First address past the loaded program text
    pub program_end: u32,

    /// CPU policy
    pub policy: CPUPolicy,

    /// History of execution
    pub history: CPUHistory,
}

impl CPUState {
    pub fn make(policy: CPUPolicy) -> Self {
        Self {
            pc: Register::new(0),
            gpr: RegisterFile::default(),
            program_end: 0,
            policy,
            history: CPUHistory::default(),
        }
    }

    /// Is the PC past the end of the program?
    pub fn past_program_end(&self) -> bool {
        self.pc.read() >= self.program_end
    }
}

/// A single 32-bit register
#[derive(Clone, Copy, Default)]
pub struct Register {
    /// Current data in the register
    data: u32,
}

impl Register {
    pub fn new(data: u32) -> Self {
        Self { data }
    }

    /// Reads the register
    pub fn read(&self) -> u32 {
        self.data
    }

    /// Writes to register
    pub fn write(&mut self, value: u32) {
        self.data = value;
    }
}

/// 32-entry register file; $zero ignores writes
#[derive(Clone, Copy, Default)]
pub struct RegisterFile {
    regs: [Register; 32],
}

impl RegisterFile {
    pub fn read(&self, index: u32) -> u32 {
        self.regs[(index & 0x1f) as usize].read()
    }

    pub fn write(&mut self, index: u32, value: u32) {
        let index = (index & 0x1f) as usize;
        // You don't write to $zero
        if index != 0 {
            self.regs[index].write(value);
        }
    }

    /// (name, value) pairs of every non-zero register
    pub fn non_zero(&self) -> Vec<(&'static str, u32)> {
        (0..32)
            .filter(|&i| self.regs[i].read() != 0)
            .map(|i| (REGISTER_NAMES[i], self.regs[i].read()))
            .collect()
    }
}

/// Looks up a register index by its ABI name, with or without `$`
pub fn register_index(name: &str) -> Option<u32> {
    let name = name.trim_start_matches('$');
    REGISTER_NAMES
        .iter()
        .position(|&n| n == name)
        .map(|i| i as u32)
        .or_else(|| name.parse::<u32>().ok().filter(|&i| i < 32))
}

/// CPU policy
#[derive(Clone, Copy)]
pub struct CPUPolicy {
    /// Print statistics after the run
    pub history: bool,
    /// Rewind the PC so the instruction nulled by a load-use stall is fetched again
    pub refetch_on_load_use: bool,
    /// Stop the run on signed overflow instead of squashing the instruction
    pub halt_on_overflow: bool,
    pub max_cycles: u64,
}

impl Default for CPUPolicy {
    fn default() -> Self {
        Self {
            history: false,
            refetch_on_load_use: true,
            halt_on_overflow: false,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

/// History module
#[derive(Clone, Copy, Default, Debug)]
pub struct CPUHistory {
    pub cycle_count: u64,
    pub inst_count: u64,
    /// Cycles in which fetch produced a bubble because of an I-cache miss
    pub fetch_stall_count: u64,
    /// Cycles in which the whole pipeline waited on the data side
    pub mem_stall_count: u64,
    pub load_use_stall_count: u64,
    pub flush_count: u64,
    pub overflow_count: u64,
}

impl CPUHistory {
    pub fn cpi(&self) -> f64 {
        if self.inst_count == 0 {
            0.0
        } else {
            self.cycle_count as f64 / self.inst_count as f64
        }
    }
}
