use std::cell::{Cell, RefCell};

use log::debug;

use crate::{
    core::{
        item::{ItemWriter, ItemWriterResult},
        page::{KeyedRecord, Page, PageSource},
        transaction::TransactionManager,
    },
    BatchError,
};

/// Page source over records held in memory, sorted by key.
///
/// Behaves like a keyed table queried with
/// `WHERE key > :cursor ORDER BY key LIMIT :page_size`.
pub struct InMemoryPageSource<R: KeyedRecord> {
    records: Vec<R>,
    queries: Cell<usize>,
}

impl<R: KeyedRecord + Clone> InMemoryPageSource<R> {
    pub fn new(mut records: Vec<R>) -> Self {
        records.sort_by_key(|record| record.key());
        Self {
            records,
            queries: Cell::new(0),
        }
    }

    /// Number of page queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.get()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<R: KeyedRecord + Clone> PageSource<R> for InMemoryPageSource<R> {
    fn next_page(&self, cursor: Option<R::Key>, page_size: usize) -> Result<Page<R>, BatchError> {
        self.queries.set(self.queries.get() + 1);

        let start = match cursor {
            Some(cursor) => self.records.partition_point(|record| record.key() <= cursor),
            None => 0,
        };
        let end = start.saturating_add(page_size).min(self.records.len());

        Ok(Page::new(self.records[start..end].to_vec()))
    }
}

/// Transactional in-memory sink.
///
/// Items written inside a transaction are staged and only become visible in
/// [`committed`](InMemoryItemWriter::committed) once the transaction commits.
/// A rollback discards them. The writer is its own [`TransactionManager`].
pub struct InMemoryItemWriter<T> {
    committed: RefCell<Vec<T>>,
    pending: RefCell<Vec<T>>,
    in_transaction: Cell<bool>,
    write_sizes: RefCell<Vec<usize>>,
    commits: Cell<usize>,
    rollbacks: Cell<usize>,
}

impl<T> Default for InMemoryItemWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryItemWriter<T> {
    pub fn new() -> Self {
        Self {
            committed: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            in_transaction: Cell::new(false),
            write_sizes: RefCell::new(Vec::new()),
            commits: Cell::new(0),
            rollbacks: Cell::new(0),
        }
    }

    pub fn committed(&self) -> std::cell::Ref<'_, Vec<T>> {
        self.committed.borrow()
    }

    pub fn into_committed(self) -> Vec<T> {
        self.committed.into_inner()
    }

    /// Number of items passed to each call of `write`, in call order.
    pub fn write_sizes(&self) -> Vec<usize> {
        self.write_sizes.borrow().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.get()
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.get()
    }
}

impl<T: Clone> ItemWriter<T> for InMemoryItemWriter<T> {
    fn write(&self, items: &[T]) -> ItemWriterResult {
        self.write_sizes.borrow_mut().push(items.len());

        if self.in_transaction.get() {
            self.pending.borrow_mut().extend_from_slice(items);
        } else {
            self.committed.borrow_mut().extend_from_slice(items);
        }

        Ok(())
    }
}

impl<T> TransactionManager for InMemoryItemWriter<T> {
    fn begin(&self) -> Result<(), BatchError> {
        if self.in_transaction.replace(true) {
            return Err(BatchError::Transaction(
                "a transaction is already open".to_string(),
            ));
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        if !self.in_transaction.replace(false) {
            return Err(BatchError::Transaction("no open transaction".to_string()));
        }

        let mut pending = self.pending.borrow_mut();
        debug!("Committing {} staged items", pending.len());
        self.committed.borrow_mut().append(&mut pending);
        self.commits.set(self.commits.get() + 1);

        Ok(())
    }

    fn rollback(&self) -> Result<(), BatchError> {
        self.in_transaction.set(false);

        let mut pending = self.pending.borrow_mut();
        debug!("Discarding {} staged items", pending.len());
        pending.clear();
        self.rollbacks.set(self.rollbacks.get() + 1);

        Ok(())
    }
}
