use std::path::PathBuf;
use std::str::FromStr;

use crate::cpu::CPUPolicy;
use crate::memory::cache::CachePolicy;
use crate::memory::main_memory::MemoryConfig;
use crate::memory::CacheConfig;
use crate::memory::CacheMode;
use crate::memory::WritePolicy;

xflags::xflags! {
    /// Cycle-accurate MIPS five-stage pipeline simulator.
    cmd MipsSimArgs {
        /// Path to the program: a big-endian MIPS ELF file or a text file of hex words.
        required program: PathBuf

        /// Stops after exactly this many cycles instead of running to completion.
        optional --cycles cycles: u64

        /// Fails the run once this many cycles have passed (default 10000000).
        optional --max-cycles max_cycles: u64

        /// Cache organisation: off, split (default) or unified.
        optional --cache mode: CacheMode

        /// Instruction cache size in words.
        optional --icache-size icache_size: usize

        /// Data (or unified) cache size in words.
        optional --dcache-size dcache_size: usize

        /// Block size in words, for both caches.
        optional --block-size block_size: usize

        /// Write policy: wb (write-back, default) or wt (write-through).
        optional --write-policy write_policy: WritePolicy

        /// Fetches instructions straight from memory in split mode.
        optional --no-icache

        /// Accesses data straight from memory in split mode.
        optional --no-dcache

        /// Base address of main memory.
        optional --mem-start mem_start: NumberArg

        /// Size of main memory in bytes.
        optional --mem-size mem_size: NumberArg

        /// Ignores out-of-range and misaligned accesses instead of failing.
        optional --no-sanity-check

        /// Drops the instruction behind a load-use stall instead of fetching it again.
        optional --lossy-load-use

        /// Stops on signed overflow instead of squashing the instruction.
        optional --halt-on-overflow

        /// Interactive mode, printing the pipeline and asking how many cycles to run.
        optional --step

        /// Enables history module, printing cycle, stall and cache counters after simulation.
        optional --history

        /// Prints memory words after the run, as ADDR:WORDS.
        repeated --dump range: DumpArg

        /// Enables debug logging.
        optional -v, --verbose
    }
}

impl MipsSimArgs {
    pub fn cpu_policy(&self) -> CPUPolicy {
        let defaults = CPUPolicy::default();
        CPUPolicy {
            history: self.history,
            refetch_on_load_use: !self.lossy_load_use,
            halt_on_overflow: self.halt_on_overflow,
            max_cycles: self.max_cycles.unwrap_or(defaults.max_cycles),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        let defaults = CacheConfig::default();
        let block_size = self.block_size.unwrap_or(defaults.dcache.block_size);
        let policy = |size: Option<usize>, default: &CachePolicy, disabled: bool| {
            let mut policy =
                CachePolicy::make(size.unwrap_or(default.size), block_size);
            policy.enabled = !disabled;
            policy
        };

        CacheConfig {
            mode: self.cache.unwrap_or(defaults.mode),
            icache: policy(self.icache_size, &defaults.icache, self.no_icache),
            dcache: policy(self.dcache_size, &defaults.dcache, self.no_dcache),
            write_policy: self.write_policy.unwrap_or(defaults.write_policy),
            ..defaults
        }
    }

    pub fn memory_config(&self) -> MemoryConfig {
        let defaults = MemoryConfig::default();
        MemoryConfig {
            start: self.mem_start.map_or(defaults.start, |arg| arg.0),
            size: self.mem_size.map_or(defaults.size, |arg| arg.0),
            sanity_check: !self.no_sanity_check,
        }
    }
}

/// A decimal or `0x`-prefixed hexadecimal number
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumberArg(pub u32);

impl FromStr for NumberArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => s.parse::<u32>(),
        };
        parsed
            .map(NumberArg)
            .map_err(|_| format!("Invalid number: '{}'", s))
    }
}

/// A memory range to print: start address and word count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DumpArg {
    pub address: u32,
    pub words: u32,
}

impl FromStr for DumpArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, words) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid dump range: '{}'. Expected ADDR:WORDS.", s))?;
        Ok(DumpArg {
            address: address.parse::<NumberArg>()?.0,
            words: words.parse::<NumberArg>()?.0,
        })
    }
}
