//! Single-slot write buffer between the data cache and main memory

use log::debug;
use log::trace;

use super::arbiter::Arbiter;
use super::arbiter::MemoryState;
use super::cache::Block;
use super::main_memory::MainMemory;
use super::CacheStatus;
use super::WritePolicy;
use crate::error::SimulatorResult;

pub struct WriteBuffer {
    policy: WritePolicy,
    miss_penalty: u32,
    subsequent_penalty: u32,

    writing: bool,
    /// Address of the first buffered word
    address: u32,
    data: Vec<u32>,
    penalty: u32,
    /// Words already drained
    subsequent: usize,
}

impl WriteBuffer {
    pub fn make(
        policy: WritePolicy,
        miss_penalty: u32,
        subsequent_penalty: u32,
    ) -> Self {
        Self {
            policy,
            miss_penalty,
            subsequent_penalty,
            writing: false,
            address: 0,
            data: Vec::new(),
            penalty: 0,
            subsequent: 0,
        }
    }

    pub fn is_writing(&self) -> bool {
        self.writing
    }

    pub fn penalty(&self) -> u32 {
        self.penalty
    }

    /// Takes over a write from `block`, which holds `address`.
    /// Write-back buffers the whole block from its aligned address,
    /// write-through only the word at `address`.
    /// Returns Miss while another write is pending or the block is still filling.
    pub fn enqueue(&mut self, block: &Block, address: u32) -> CacheStatus {
        if self.writing || !block.all_valid() {
            trace!("Write buffer busy, rejecting {:#010x}", address);
            return CacheStatus::Miss;
        }

        let block_bytes = (block.words.len() * 4) as u32;
        match self.policy {
            WritePolicy::WriteBack => {
                self.address = address & !(block_bytes - 1);
                self.data.clear();
                self.data.extend_from_slice(&block.words);
            }
            WritePolicy::WriteThrough => {
                let offset = ((address % block_bytes) / 4) as usize;
                self.address = address & !3;
                self.data.clear();
                self.data.push(block.words[offset]);
            }
        }

        debug!(
            "Write buffer: {} word(s) queued for {:#010x}",
            self.data.len(),
            self.address
        );
        self.writing = true;
        self.penalty = 0;
        self.subsequent = 0;
        CacheStatus::Hit
    }

    /// Per-cycle digest; only progresses while the port is granted to writes
    pub fn tick(
        &mut self,
        arbiter: &mut Arbiter,
        memory: &mut MainMemory,
    ) -> SimulatorResult<()> {
        if !self.writing || !arbiter.grants(MemoryState::Writing) {
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

        let address = self.address + 4 * self.subsequent as u32;
        memory.write_word(address, self.data[self.subsequent])?;
        trace!("Write buffer drained {:#010x}", address);
        self.penalty = 0;
        self.subsequent += 1;

        if self.subsequent >= self.data.len() {
            self.writing = false;
            self.data.clear();
            arbiter.release(MemoryState::Writing);
        }
        Ok(())
    }

    /// The buffered value for `address`, if it has not been drained yet
    pub fn peek(&self, address: u32) -> Option<u32> {
        if !self.writing || address < self.address {
            return None;
        }
        let i = ((address - self.address) / 4) as usize;
        if i >= self.subsequent && i < self.data.len() {
            Some(self.data[i])
        } else {
            None
        }
    }
}
