use log::{debug, error};

use crate::error::BatchError;

/// Demarcates the transaction that makes a chunk atomic.
///
/// A chunk-oriented step calls `begin` before processing a chunk, then either
/// `commit` once the writer succeeded or `rollback` on any failure. A writer
/// that persists data should implement this trait as well, so that its writes
/// run inside the transaction it opened.
pub trait TransactionManager {
    fn begin(&self) -> Result<(), BatchError>;

    fn commit(&self) -> Result<(), BatchError>;

    fn rollback(&self) -> Result<(), BatchError>;
}

/// Transaction manager for writers without transactional resources.
#[derive(Default, Debug, Clone, Copy)]
pub struct ResourcelessTransactionManager;

impl TransactionManager for ResourcelessTransactionManager {
    fn begin(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        Ok(())
    }
}

/// Scoped chunk transaction.
///
/// Ends with an explicit [`commit`](ChunkTransaction::commit) or
/// [`rollback`](ChunkTransaction::rollback). If dropped while still open, for
/// instance while unwinding, it rolls back.
pub struct ChunkTransaction<'t> {
    manager: &'t dyn TransactionManager,
    open: bool,
}

impl<'t> ChunkTransaction<'t> {
    pub fn begin(manager: &'t dyn TransactionManager) -> Result<Self, BatchError> {
        manager.begin()?;
        debug!("Transaction opened");
        Ok(Self {
            manager,
            open: true,
        })
    }

    /// Commits the transaction. If the commit fails, the transaction is
    /// rolled back before the commit error is returned.
    pub fn commit(mut self) -> Result<(), BatchError> {
        // Still open on error: dropping `self` rolls back.
        self.manager.commit()?;
        self.open = false;
        debug!("Transaction committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), BatchError> {
        self.open = false;
        self.manager.rollback()?;
        debug!("Transaction rolled back");
        Ok(())
    }
}

impl Drop for ChunkTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.manager.rollback() {
                error!("Rollback of abandoned transaction failed: {}", err);
            }
        }
    }
}
