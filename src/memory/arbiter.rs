//! Single-port memory arbiter.
//!
//! The instruction cache, the data cache and the write buffer share one
//! port to main memory. Each digest cycle the arbiter picks at most one of
//! them; a granted transaction runs to completion and the owner hands the
//! port back with [`Arbiter::release`].

use log::debug;

/// Who currently owns the memory port
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemoryState {
    #[default]
    Idle,
    ReadingData,
    ReadingInstruction,
    Writing,
}

/// Pending work observed at the start of a digest cycle
#[derive(Clone, Copy, Debug, Default)]
pub struct Pending {
    pub dcache_fetching: bool,
    pub icache_fetching: bool,
    pub buffer_writing: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Arbiter {
    state: MemoryState,
}

impl Arbiter {
    pub fn state(&self) -> MemoryState {
        self.state
    }

    /// May the component owning `state` make progress this cycle?
    pub fn grants(&self, state: MemoryState) -> bool {
        state != MemoryState::Idle && self.state == state
    }

    /// Applies the transition table once per digest cycle.
    /// The current owner keeps the port while it still has work;
    /// otherwise reads win over writes and data over instructions.
    pub fn update(&mut self, pending: Pending) {
        use MemoryState::*;

        let next = match self.state {
            ReadingData if pending.dcache_fetching => ReadingData,
            ReadingInstruction if pending.icache_fetching => ReadingInstruction,
            Writing if pending.buffer_writing => Writing,
            _ => {
                if pending.dcache_fetching {
                    ReadingData
                } else if pending.icache_fetching {
                    ReadingInstruction
                } else if pending.buffer_writing {
                    Writing
                } else {
                    Idle
                }
            }
        };

        if next != self.state {
            debug!("Memory port: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    /// Gives the port back once `owner` has finished its transaction
    pub fn release(&mut self, owner: MemoryState) {
        if self.state == owner {
            debug!("Memory port: {:?} -> Idle", owner);
            self.state = MemoryState::Idle;
        }
    }
}
