//! Direct-mapped cache implementation

use log::debug;
use log::trace;

use super::arbiter::Arbiter;
use super::arbiter::MemoryState;
use super::main_memory::MainMemory;
use super::write_buffer::WriteBuffer;
use super::CacheStatus;
use super::Lookup;
use super::WritePolicy;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;

pub fn get_log_2(value: u32) -> usize {
    assert!(value > 0);
    31 - value.leading_zeros() as usize
}

pub fn is_pow_2(value: u32) -> bool {
    value != 0 && value & (value - 1) == 0
}

pub fn get_mask(bits: usize) -> u32 {
    ((1u64 << bits) - 1) as u32
}

/// Which stream a cache serves; decides the arbiter state it waits for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKind {
    Instruction,
    Data,
}

impl CacheKind {
    fn port_state(self) -> MemoryState {
        match self {
            CacheKind::Instruction => MemoryState::ReadingInstruction,
            CacheKind::Data => MemoryState::ReadingData,
        }
    }
}

/// Cache implementation
pub struct Cache {
    pub policy: CachePolicy,
    pub kind: CacheKind,
    write_policy: WritePolicy,
    miss_penalty: u32,
    subsequent_penalty: u32,

    pub history: CacheHistory,

    // Constants
    offset_bits: usize,
    index_bits: usize,

    pub offset_mask: u32,
    pub index_mask: u32,

    pub blocks: Vec<Block>,

    // In-flight fill
    fetching: bool,
    penalty: u32,
    /// Words of the current block already filled
    subsequent: usize,
    fetch_address: u32,

    /// Addresses whose miss is already counted, awaiting their retry.
    /// At most one per client (fetch and data in unified mode).
    outstanding: Vec<u32>,
}

// Assume that address is 32-bit, word-addressed inside a block,
// and looks like this:
// | tag | index | word offset | byte (2 bits) |
impl Cache {
    pub fn make(
        policy: CachePolicy,
        kind: CacheKind,
        write_policy: WritePolicy,
        miss_penalty: u32,
        subsequent_penalty: u32,
    ) -> SimulatorResult<Self> {
        policy.validate()?;

        let offset_bits = get_log_2(policy.block_size as u32);
        let index_bits = get_log_2(policy.block_num() as u32);
        if 2 + offset_bits + index_bits > 32 {
            return Err(SimulatorError::ConfigError(format!(
                "Cache of {} words does not fit a 32-bit address",
                policy.size
            )));
        }

        Ok(Self {
            policy,
            kind,
            write_policy,
            miss_penalty,
            subsequent_penalty,
            history: CacheHistory::default(),
            offset_bits,
            index_bits,
            offset_mask: get_mask(offset_bits),
            index_mask: get_mask(index_bits),
            blocks: vec![Block::make(policy.block_size); policy.block_num()],
            fetching: false,
            penalty: 0,
            subsequent: 0,
            fetch_address: 0,
            outstanding: Vec::with_capacity(2),
        })
    }

    pub fn get_offset(&self, address: u32) -> usize {
        ((address >> 2) & self.offset_mask) as usize
    }

    pub fn get_index(&self, address: u32) -> usize {
        ((address >> (2 + self.offset_bits)) & self.index_mask) as usize
    }

    pub fn get_tag(&self, address: u32) -> u32 {
        let shift = (2 + self.offset_bits + self.index_bits) as u32;
        address.checked_shr(shift).unwrap_or(0)
    }

    /// First address of the block with the given tag at the given index
    pub fn get_address(&self, tag: u32, index: usize) -> u32 {
        let shift = (2 + self.offset_bits + self.index_bits) as u32;
        tag.checked_shl(shift).unwrap_or(0)
            | ((index as u32) << (2 + self.offset_bits))
    }

    fn block_bytes(&self) -> u32 {
        (self.policy.block_size * 4) as u32
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    pub fn penalty(&self) -> u32 {
        self.penalty
    }

    /// The cached word at `address`, if present and valid
    pub fn peek(&self, address: u32) -> Option<u32> {
        let block = &self.blocks[self.get_index(address)];
        let offset = self.get_offset(address);
        (block.tag == self.get_tag(address) && block.valid[offset])
            .then(|| block.words[offset])
    }

    /// Reads the word at `address`. A miss queues a block fill unless one is
    /// already in flight, the write buffer is still draining, or a dirty
    /// victim had to be handed to the write buffer first. The caller retries.
    /// Each access counts once: as a miss if any attempt missed.
    pub fn read_word(&mut self, address: u32, buffer: &mut WriteBuffer) -> Lookup {
        if let Some(word) = self.peek(address) {
            if !self.served(address) {
                self.history.record_hit();
            }
            return Lookup::Hit(word);
        }

        if self.fetching {
            return self.miss(address);
        }

        // Never read memory that a pending write is about to change
        if buffer.is_writing() {
            trace!("{:?} cache miss at {:#010x} waits on write buffer", self.kind, address);
            return self.miss(address);
        }

        let index = self.get_index(address);
        if self.write_policy == WritePolicy::WriteBack && self.blocks[index].dirty {
            let victim = self.get_address(self.blocks[index].tag, index);
            let block = &mut self.blocks[index];
            if buffer.enqueue(block, victim) == CacheStatus::Hit {
                debug!("{:?} cache evicting dirty block {:#010x}", self.kind, victim);
                block.dirty = false;
            }
            return self.miss(address);
        }

        self.fetch_address = address & !(self.block_bytes() - 1);
        self.fetching = true;
        self.penalty = 0;
        self.subsequent = 0;
        // The slot changes owner now: its old contents are clean or already
        // in the write buffer, and nothing may hit on them during the fill
        let tag = self.get_tag(self.fetch_address);
        let block = &mut self.blocks[index];
        block.tag = tag;
        block.valid.fill(false);
        block.dirty = false;
        debug!(
            "{:?} cache miss at {:#010x}, filling block {:#010x}",
            self.kind, address, self.fetch_address
        );
        self.miss(address)
    }

    fn miss(&mut self, address: u32) -> Lookup {
        if !self.outstanding.contains(&address) {
            self.history.record_miss();
            self.remember(address);
        }
        Lookup::Miss
    }

    fn remember(&mut self, address: u32) {
        if self.outstanding.len() == 2 {
            // A fetch abandoned by a redirect never retries
            self.outstanding.remove(0);
        }
        self.outstanding.push(address);
    }

    /// Is this hit the retry of an access already counted as a miss?
    fn served(&mut self, address: u32) -> bool {
        match self.outstanding.iter().position(|&a| a == address) {
            Some(i) => {
                self.outstanding.remove(i);
                true
            }
            None => false,
        }
    }

    /// Writes a word that is already cached; the caller turns a Miss into
    /// a read first, and that read is what the history counts.
    /// Write-through also queues the word in the write buffer.
    pub fn write_word(
        &mut self,
        address: u32,
        data: u32,
        buffer: &mut WriteBuffer,
    ) -> CacheStatus {
        if self.peek(address).is_none() {
            return CacheStatus::Miss;
        }

        let offset = self.get_offset(address);
        let index = self.get_index(address);
        let block = &mut self.blocks[index];
        block.words[offset] = data;
        block.dirty = true;

        let status = match self.write_policy {
            WritePolicy::WriteBack => CacheStatus::Hit,
            WritePolicy::WriteThrough => buffer.enqueue(block, address),
        };
        if status == CacheStatus::Miss && !self.outstanding.contains(&address) {
            // The store's read retries too; it already counted
            self.remember(address);
        }
        status
    }

    /// Per-cycle digest; only progresses while the port is granted to this cache
    pub fn tick(
        &mut self,
        arbiter: &mut Arbiter,
        memory: &MainMemory,
    ) -> SimulatorResult<()> {
        let port = self.kind.port_state();
        if !self.fetching || !arbiter.grants(port) {
            return Ok(());
        }

        self.penalty += 1;
        let target = if self.subsequent == 0 {
            self.miss_penalty
        } else {
            self.subsequent_penalty
        };
        if self.penalty < target {
            return Ok(());
        }

        let word = memory.read_word(self.fetch_address)?;
        let offset = self.get_offset(self.fetch_address);
        let index = self.get_index(self.fetch_address);
        let block = &mut self.blocks[index];
        block.words[offset] = word;
        block.valid[offset] = true;
        trace!("{:?} cache filled {:#010x}", self.kind, self.fetch_address);

        self.penalty = 0;
        if offset + 1 < self.policy.block_size {
            self.fetch_address += 4;
            self.subsequent += 1;
        } else {
            self.fetching = false;
            arbiter.release(port);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub tag: u32,
    pub dirty: bool,
    pub valid: Vec<bool>,
    pub words: Vec<u32>,
}

impl Block {
    pub fn make(block_size: usize) -> Self {
        Self {
            tag: 0,
            dirty: false,
            valid: vec![false; block_size],
            words: vec![0; block_size],
        }
    }

    pub fn all_valid(&self) -> bool {
        self.valid.iter().all(|&v| v)
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct CacheHistory {
    pub num_hit: u64,
    pub num_miss: u64,
}

impl CacheHistory {
    pub fn record_hit(&mut self) {
        self.num_hit += 1;
    }

    pub fn record_miss(&mut self) {
        self.num_miss += 1;
    }

    /// Computes the current miss rate of the cache
    pub fn get_miss_rate(&self) -> f64 {
        let total = self.num_hit + self.num_miss;
        if total == 0 {
            0.0
        } else {
            self.num_miss as f64 / total as f64
        }
    }
}

/// Geometry of one cache; sizes are in words
#[derive(Clone, Copy, Debug)]
pub struct CachePolicy {
    pub enabled: bool,
    pub size: usize,
    pub block_size: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::make(256, 4)
    }
}

impl CachePolicy {
    pub fn make(size: usize, block_size: usize) -> Self {
        Self { enabled: true, size, block_size }
    }

    pub fn block_num(&self) -> usize {
        if self.block_size == 0 {
            0
        } else {
            self.size / self.block_size
        }
    }

    pub fn validate(&self) -> SimulatorResult<()> {
        // Block size must be a power of 2
        if !is_pow_2(self.block_size as u32) {
            return Err(SimulatorError::ConfigError(format!(
                "Cache block size {} is not a power of two",
                self.block_size
            )));
        }
        // Cache size must be a multiple of block size
        if self.size % self.block_size != 0 {
            return Err(SimulatorError::ConfigError(format!(
                "Cache size {} is not a multiple of the block size {}",
                self.size, self.block_size
            )));
        }
        // Number of blocks must be a power of 2
        if !is_pow_2(self.block_num() as u32) {
            return Err(SimulatorError::ConfigError(format!(
                "Cache block count {} is not a power of two",
                self.block_num()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::arbiter::Pending;
    use crate::memory::main_memory::MemoryConfig;

    const MISS: u32 = 5;
    const NEXT: u32 = 2;

    struct Rig {
        cache: Cache,
        buffer: WriteBuffer,
        arbiter: Arbiter,
        memory: MainMemory,
    }

    impl Rig {
        fn new(size: usize, block_size: usize, write_policy: WritePolicy) -> Self {
            let cache = Cache::make(
                CachePolicy::make(size, block_size),
                CacheKind::Data,
                write_policy,
                MISS,
                NEXT,
            )
            .unwrap();
            let mut memory = MainMemory::make(MemoryConfig::default()).unwrap();
            for i in 0..256 {
                memory.write_word(i * 4, 0x1000 + i).unwrap();
            }
            Self {
                cache,
                buffer: WriteBuffer::make(write_policy, MISS, NEXT),
                arbiter: Arbiter::default(),
                memory,
            }
        }

        /// One digest cycle, the way the memory system runs it
        fn tick(&mut self) {
            self.arbiter.update(Pending {
                dcache_fetching: self.cache.is_fetching(),
                icache_fetching: false,
                buffer_writing: self.buffer.is_writing(),
            });
            self.cache.tick(&mut self.arbiter, &self.memory).unwrap();
            self.buffer.tick(&mut self.arbiter, &mut self.memory).unwrap();
        }

        fn read(&mut self, address: u32) -> Lookup {
            self.cache.read_word(address, &mut self.buffer)
        }

        fn write(&mut self, address: u32, data: u32) -> CacheStatus {
            self.cache.write_word(address, data, &mut self.buffer)
        }

        /// Retries a read every cycle until it hits; returns the cycles spent
        fn read_until_hit(&mut self, address: u32) -> (u32, u32) {
            let mut cycles = 0;
            loop {
                if let Lookup::Hit(word) = self.read(address) {
                    return (word, cycles);
                }
                self.tick();
                cycles += 1;
                assert!(cycles < 1000, "read never completed");
            }
        }
    }

    #[test]
    fn test_get_log_2() {
        for n in 1..100_000u32 {
            let expected = {
                let mut count = 0;
                let mut t = n;
                while t > 1 {
                    count += 1;
                    t >>= 1;
                }
                count
            };
            assert_eq!(expected, get_log_2(n));
        }
    }

    #[test]
    fn test_validate() {
        assert!(CachePolicy::default().validate().is_ok());
        assert!(CachePolicy::make(256, 3).validate().is_err());
        assert!(CachePolicy::make(24, 4).validate().is_err());
        assert!(CachePolicy::make(30, 4).validate().is_err());
        assert!(Cache::make(
            CachePolicy::make(96, 1),
            CacheKind::Data,
            WritePolicy::WriteBack,
            MISS,
            NEXT
        )
        .is_err());
    }

    #[test]
    fn test_address_decomposition() {
        // 16 blocks of 4 words: offset bits [2, 4), index bits [4, 8)
        let rig = Rig::new(64, 4, WritePolicy::WriteBack);
        let address = 0xabcd_1234;
        assert_eq!(rig.cache.get_offset(address), 1);
        assert_eq!(rig.cache.get_index(address), 3);
        assert_eq!(rig.cache.get_tag(address), 0xabcd_12);
        assert_eq!(rig.cache.get_address(0xabcd_12, 3), 0xabcd_1230);
    }

    #[test]
    fn test_miss_then_hit_after_penalty() {
        let mut rig = Rig::new(16, 1, WritePolicy::WriteBack);
        assert_eq!(rig.read(0x20), Lookup::Miss);
        for _ in 0..MISS - 1 {
            rig.tick();
            assert_eq!(rig.read(0x20), Lookup::Miss);
        }
        rig.tick();
        assert_eq!(rig.read(0x20), Lookup::Hit(0x1008));
        assert_eq!(rig.arbiter.state(), MemoryState::Idle);
        assert_eq!(rig.cache.history.num_miss, 1);
    }

    #[test]
    fn test_multi_word_fill_timing() {
        let mut rig = Rig::new(16, 4, WritePolicy::WriteBack);
        // Ask for the last word of the block at 0x40
        assert_eq!(rig.read(0x4c), Lookup::Miss);
        for _ in 0..MISS {
            rig.tick();
        }
        // First word arrives first
        assert_eq!(rig.cache.peek(0x40), Some(0x1010));
        assert_eq!(rig.cache.peek(0x44), None);
        for _ in 0..2 * NEXT {
            rig.tick();
        }
        assert_eq!(rig.read(0x4c), Lookup::Miss);
        for _ in 0..NEXT {
            rig.tick();
        }
        assert_eq!(rig.read(0x4c), Lookup::Hit(0x1013));
        assert!(!rig.cache.is_fetching());
    }

    #[test]
    fn test_in_flight_miss_does_not_restart() {
        let mut rig = Rig::new(16, 1, WritePolicy::WriteBack);
        rig.read(0x20);
        rig.tick();
        rig.tick();
        // A second miss neither restarts nor redirects the fill
        assert_eq!(rig.read(0x30), Lookup::Miss);
        assert_eq!(rig.cache.penalty(), 2);
        let (word, _) = rig.read_until_hit(0x20);
        assert_eq!(word, 0x1008);
    }

    #[test]
    fn test_refill_invalidates_old_words() {
        // 4 blocks of 4 words; 0x00 and 0x40 share index 0
        let mut rig = Rig::new(16, 4, WritePolicy::WriteBack);
        rig.read_until_hit(0x0c);
        assert!(rig.cache.blocks[0].all_valid());

        rig.read(0x40);
        for _ in 0..MISS {
            rig.tick();
        }
        // Only the first new word is valid; nothing of the old tag survives
        assert_eq!(rig.cache.blocks[0].valid, vec![true, false, false, false]);
        assert_eq!(rig.cache.peek(0x04), None);
        assert_eq!(rig.cache.peek(0x0c), None);
        assert_eq!(rig.cache.peek(0x40), Some(0x1010));
    }

    #[test]
    fn test_write_hit_marks_dirty() {
        let mut rig = Rig::new(16, 4, WritePolicy::WriteBack);
        assert_eq!(rig.write(0x08, 7), CacheStatus::Miss);
        rig.read_until_hit(0x08);
        assert!(!rig.cache.blocks[0].dirty);
        assert_eq!(rig.write(0x08, 7), CacheStatus::Hit);
        assert!(rig.cache.blocks[0].dirty);
        assert_eq!(rig.read(0x08), Lookup::Hit(7));
        // Write-back leaves memory untouched
        assert_eq!(rig.memory.read_word(0x08).unwrap(), 0x1002);
        assert!(!rig.buffer.is_writing());
    }

    #[test]
    fn test_dirty_eviction_reaches_memory_before_fill() {
        let mut rig = Rig::new(16, 4, WritePolicy::WriteBack);
        // The last word arrives last, so the whole block is resident
        rig.read_until_hit(0x0c);
        for (i, value) in [0xa0, 0xa1, 0xa2, 0xa3].into_iter().enumerate() {
            assert_eq!(rig.write(i as u32 * 4, value), CacheStatus::Hit);
        }

        // Conflicting miss: the dirty block goes to the buffer first
        assert_eq!(rig.read(0x40), Lookup::Miss);
        assert!(rig.buffer.is_writing());
        assert!(!rig.cache.is_fetching());

        let mut cycles = 0;
        loop {
            if rig.cache.is_fetching() {
                // The fill may only start once the whole block is in memory
                for i in 0..4 {
                    assert_eq!(rig.memory.read_word(i * 4).unwrap(), 0xa0 + i);
                }
            }
            if let Lookup::Hit(word) = rig.read(0x40) {
                assert_eq!(word, 0x1010);
                break;
            }
            rig.tick();
            cycles += 1;
            assert!(cycles < 1000);
        }
        assert!(cycles >= MISS + 3 * NEXT + MISS);
        assert!(!rig.cache.blocks[0].dirty);
    }

    #[test]
    fn test_write_through_enqueues_word() {
        let mut rig = Rig::new(16, 1, WritePolicy::WriteThrough);
        rig.read_until_hit(0x08);
        rig.read_until_hit(0x0c);
        assert_eq!(rig.write(0x08, 99), CacheStatus::Hit);
        assert!(rig.buffer.is_writing());

        // Buffer is busy: the second write lands in the cache but reports Miss
        assert_eq!(rig.write(0x0c, 100), CacheStatus::Miss);
        assert_eq!(rig.cache.peek(0x0c), Some(100));

        for _ in 0..MISS {
            rig.tick();
        }
        assert_eq!(rig.memory.read_word(0x08).unwrap(), 99);
        // Retry succeeds once the buffer is free
        assert_eq!(rig.write(0x0c, 100), CacheStatus::Hit);
    }

    #[test]
    fn test_instruction_cache_waits_for_its_own_grant() {
        let mut cache = Cache::make(
            CachePolicy::make(16, 1),
            CacheKind::Instruction,
            WritePolicy::WriteBack,
            MISS,
            NEXT,
        )
        .unwrap();
        let memory = MainMemory::make(MemoryConfig::default()).unwrap();
        let mut buffer = WriteBuffer::make(WritePolicy::WriteBack, MISS, NEXT);
        let mut arbiter = Arbiter::default();
        cache.read_word(0, &mut buffer);

        // Port held by the data side
        arbiter.update(Pending { dcache_fetching: true, ..Default::default() });
        cache.tick(&mut arbiter, &memory).unwrap();
        assert_eq!(cache.penalty(), 0);

        arbiter.release(MemoryState::ReadingData);
        arbiter.update(Pending { icache_fetching: true, ..Default::default() });
        cache.tick(&mut arbiter, &memory).unwrap();
        assert_eq!(cache.penalty(), 1);
    }
}
