use log::debug;

use crate::error::BatchError;

/// Outcome of reading a chunk.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ChunkStatus {
    /// The chunk reached the configured chunk size, more items may follow.
    Full,
    /// The reader is exhausted, the chunk holds the last items (possibly none).
    Finished,
}

/// Lifecycle of a chunk inside a chunk-oriented step.
///
/// ```text
/// Idle -> Reading -> Processing -> Writing -> Committed
///            |           |            |
///            +-----------+------------+----> RolledBack
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ChunkState {
    Idle,
    Reading,
    Processing,
    Writing,
    Committed,
    RolledBack,
}

impl ChunkState {
    pub fn can_transition_to(self, next: ChunkState) -> bool {
        use ChunkState::*;

        matches!(
            (self, next),
            (Idle, Reading)
                | (Reading, Processing)
                | (Processing, Writing)
                | (Writing, Committed)
                | (Reading | Processing | Writing, RolledBack)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ChunkState::Committed | ChunkState::RolledBack)
    }
}

// Upper bound of the capacity reserved up front; larger chunks grow on demand.
const MAX_PREALLOCATED_ITEMS: usize = 4096;

/// A bounded batch of items processed and written as one transactional unit.
pub struct Chunk<T> {
    number: usize,
    items: Vec<T>,
    state: ChunkState,
}

impl<T> Chunk<T> {
    pub fn new(number: usize, capacity: usize) -> Chunk<T> {
        Chunk {
            number,
            items: Vec::with_capacity(capacity.min(MAX_PREALLOCATED_ITEMS)),
            state: ChunkState::Idle,
        }
    }

    pub fn transition(&mut self, next: ChunkState) -> Result<(), BatchError> {
        if !self.state.can_transition_to(next) {
            return Err(BatchError::InvalidChunkTransition(format!(
                "chunk {} cannot go from {:?} to {:?}",
                self.number, self.state, next
            )));
        }

        debug!("Chunk {}: {:?} -> {:?}", self.number, self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Hands the items over to the processing phase, leaving the chunk empty.
    pub fn take_items(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    /// Carries the chunk number and state over to a chunk of processed items.
    pub fn with_items<O>(self, items: Vec<O>) -> Chunk<O> {
        Chunk {
            number: self.number,
            items,
            state: self.state,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }
}
