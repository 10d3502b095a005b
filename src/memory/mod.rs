//! Memory structure

pub mod arbiter;
pub mod cache;
pub mod main_memory;
pub mod write_buffer;

use std::str::FromStr;

use arbiter::Arbiter;
use arbiter::Pending;
use cache::Cache;
use cache::CacheKind;
use cache::CachePolicy;
use main_memory::MainMemory;
use main_memory::MemoryConfig;
use write_buffer::WriteBuffer;

use crate::error::MemoryError;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;

/// Outcome of a memory access as seen by the pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheStatus {
    #[default]
    NoAccess,
    Hit,
    Miss,
}

/// Outcome of a read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Hit(u32),
    Miss,
}

/// Reference: <https://inst.eecs.berkeley.edu/~cs61c/su20/pdfs/lectures/lec15.pdf>
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WritePolicy {
    #[default]
    WriteBack,
    WriteThrough,
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wb" | "write-back" => Ok(WritePolicy::WriteBack),
            "wt" | "write-through" => Ok(WritePolicy::WriteThrough),
            _ => Err(format!("Unknown write policy '{}' (expected wb or wt)", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheMode {
    Disabled,
    #[default]
    Split,
    /// One cache shared by both streams, configured by the data cache policy
    Unified,
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" | "disabled" => Ok(CacheMode::Disabled),
            "split" => Ok(CacheMode::Split),
            "unified" => Ok(CacheMode::Unified),
            _ => Err(format!(
                "Unknown cache mode '{}' (expected off, split or unified)",
                s
            )),
        }
    }
}

pub const MISS_PENALTY: u32 = 30;
pub const SUBSEQUENT_PENALTY: u32 = 4;

#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub mode: CacheMode,
    pub icache: CachePolicy,
    pub dcache: CachePolicy,
    pub write_policy: WritePolicy,
    /// Cycles until the first word of a block transfer
    pub miss_penalty: u32,
    /// Cycles for each following word
    pub subsequent_penalty: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::default(),
            icache: CachePolicy::default(),
            dcache: CachePolicy::default(),
            write_policy: WritePolicy::default(),
            miss_penalty: MISS_PENALTY,
            subsequent_penalty: SUBSEQUENT_PENALTY,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> SimulatorResult<()> {
        if self.miss_penalty <= self.subsequent_penalty {
            return Err(SimulatorError::ConfigError(format!(
                "First-word penalty {} must exceed the subsequent-word penalty {}",
                self.miss_penalty, self.subsequent_penalty
            )));
        }
        if self.subsequent_penalty == 0 {
            return Err(SimulatorError::ConfigError(
                "Subsequent-word penalty must be at least one cycle".into(),
            ));
        }
        Ok(())
    }

    fn build(&self, policy: CachePolicy, kind: CacheKind) -> SimulatorResult<Option<Cache>> {
        if !policy.enabled {
            return Ok(None);
        }
        Cache::make(
            policy,
            kind,
            self.write_policy,
            self.miss_penalty,
            self.subsequent_penalty,
        )
        .map(Some)
    }
}

/// Caches, write buffer and arbiter in front of main memory
pub struct MemorySystem {
    pub config: CacheConfig,
    pub main: MainMemory,
    icache: Option<Cache>,
    dcache: Option<Cache>,
    write_buffer: WriteBuffer,
    arbiter: Arbiter,
}

impl MemorySystem {
    pub fn make(config: CacheConfig, memory: MemoryConfig) -> SimulatorResult<Self> {
        config.validate()?;
        let (icache, dcache) = match config.mode {
            CacheMode::Disabled => (None, None),
            CacheMode::Split => (
                config.build(config.icache, CacheKind::Instruction)?,
                config.build(config.dcache, CacheKind::Data)?,
            ),
            CacheMode::Unified => (None, config.build(config.dcache, CacheKind::Data)?),
        };

        Ok(Self {
            config,
            main: MainMemory::make(memory)?,
            icache,
            dcache,
            write_buffer: WriteBuffer::make(
                config.write_policy,
                config.miss_penalty,
                config.subsequent_penalty,
            ),
            arbiter: Arbiter::default(),
        })
    }

    pub fn icache(&self) -> SimulatorResult<&Cache> {
        self.icache
            .as_ref()
            .ok_or(MemoryError::CacheNotInitialized("instruction").into())
    }

    pub fn dcache(&self) -> SimulatorResult<&Cache> {
        self.dcache
            .as_ref()
            .ok_or(MemoryError::CacheNotInitialized("data").into())
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn write_buffer(&self) -> &WriteBuffer {
        &self.write_buffer
    }

    pub fn fetch_instruction(&mut self, pc: u32) -> SimulatorResult<Lookup> {
        self.main.check(pc, 4)?;
        let buffer = &mut self.write_buffer;
        // Unified mode fetches through the shared data cache
        let cache = match self.config.mode {
            CacheMode::Unified => self.dcache.as_mut(),
            _ => self.icache.as_mut(),
        };
        match cache {
            Some(cache) => Ok(cache.read_word(pc, buffer)),
            None => Ok(Lookup::Hit(self.main.read_word(pc)?)),
        }
    }

    /// Reads the word containing `address`
    pub fn read_data(&mut self, address: u32) -> SimulatorResult<Lookup> {
        self.main.check(address, 4)?;
        match self.dcache.as_mut() {
            Some(cache) => Ok(cache.read_word(address, &mut self.write_buffer)),
            None => Ok(Lookup::Hit(self.main.read_word(address)?)),
        }
    }

    /// Writes a whole word. With a data cache the word must already be
    /// cached; callers read it first.
    pub fn write_data(&mut self, address: u32, word: u32) -> SimulatorResult<CacheStatus> {
        self.main.check(address, 4)?;
        match self.dcache.as_mut() {
            Some(cache) => Ok(cache.write_word(address, word, &mut self.write_buffer)),
            None => {
                self.main.write_word(address, word)?;
                Ok(CacheStatus::Hit)
            }
        }
    }

    /// One digest cycle: the arbiter picks an owner, then every component
    /// that holds the port makes progress.
    pub fn tick(&mut self) -> SimulatorResult<()> {
        self.arbiter.update(Pending {
            dcache_fetching: self.dcache.as_ref().is_some_and(Cache::is_fetching),
            icache_fetching: self.icache.as_ref().is_some_and(Cache::is_fetching),
            buffer_writing: self.write_buffer.is_writing(),
        });

        if let Some(cache) = self.dcache.as_mut() {
            cache.tick(&mut self.arbiter, &self.main)?;
        }
        if let Some(cache) = self.icache.as_mut() {
            cache.tick(&mut self.arbiter, &self.main)?;
        }
        self.write_buffer.tick(&mut self.arbiter, &mut self.main)
    }

    /// No fill and no drain in flight
    pub fn is_idle(&self) -> bool {
        !self.write_buffer.is_writing()
            && !self.dcache.as_ref().is_some_and(Cache::is_fetching)
            && !self.icache.as_ref().is_some_and(Cache::is_fetching)
    }

    /// The freshest value of a word, without any timing side effect
    pub fn peek_word(&self, address: u32) -> SimulatorResult<u32> {
        if let Some(word) = self.dcache.as_ref().and_then(|cache| cache.peek(address)) {
            return Ok(word);
        }
        if let Some(word) = self.write_buffer.peek(address) {
            return Ok(word);
        }
        self.main.read_word(address)
    }
}
