use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use log::debug;

use crate::{
    core::{
        item::{ItemReader, ItemReaderResult},
        page::{KeyedRecord, PageSource},
    },
    BatchError,
};

/// Item reader over a [`PageSource`] using keyset pagination.
///
/// Pages are fetched on demand, one at a time, and buffered. After each page
/// the cursor moves to the key of its last record, so the next query asks for
/// records strictly after it. Once the source is exhausted every further read
/// returns `Ok(None)` without querying the source again.
///
/// A page shorter than the page size is the last one.
pub struct KeysetPagingItemReader<'a, R: KeyedRecord> {
    source: &'a dyn PageSource<R>,
    page_size: usize,
    buffer: RefCell<VecDeque<R>>,
    cursor: Cell<Option<R::Key>>,
    exhausted: Cell<bool>,
}

impl<R: KeyedRecord> KeysetPagingItemReader<'_, R> {
    /// Current cursor: key of the last record fetched from the source.
    pub fn cursor(&self) -> Option<R::Key> {
        self.cursor.get()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn fetch_page(&self) -> Result<(), BatchError> {
        let cursor = self.cursor.get();
        let page = self.source.next_page(cursor, self.page_size)?;

        debug!(
            "Fetched page of {} records after cursor {:?}",
            page.len(),
            cursor
        );

        if page.is_empty() {
            self.exhausted.set(true);
            return Ok(());
        }

        if let (Some(previous), Some(next)) = (cursor, page.cursor()) {
            if next <= previous {
                self.exhausted.set(true);
                return Err(BatchError::SourceUnavailable(format!(
                    "page cursor did not advance: {:?} after {:?}",
                    next, previous
                )));
            }
        }

        if page.len() < self.page_size {
            self.exhausted.set(true);
        }

        self.cursor.set(page.cursor());
        self.buffer.borrow_mut().extend(page.into_items());

        Ok(())
    }
}

impl<R: KeyedRecord> ItemReader<R> for KeysetPagingItemReader<'_, R> {
    fn read(&self) -> ItemReaderResult<R> {
        if let Some(record) = self.buffer.borrow_mut().pop_front() {
            return Ok(Some(record));
        }

        if self.exhausted.get() {
            return Ok(None);
        }

        self.fetch_page()?;

        Ok(self.buffer.borrow_mut().pop_front())
    }
}

pub struct KeysetPagingItemReaderBuilder<'a, R: KeyedRecord> {
    source: Option<&'a dyn PageSource<R>>,
    page_size: usize,
}

impl<R: KeyedRecord> Default for KeysetPagingItemReaderBuilder<'_, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, R: KeyedRecord> KeysetPagingItemReaderBuilder<'a, R> {
    pub fn new() -> Self {
        Self {
            source: None,
            page_size: 100,
        }
    }

    pub fn source(mut self, source: &'a impl PageSource<R>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// # Panics
    ///
    /// Panics if no source has been set or if the page size is 0.
    pub fn build(self) -> KeysetPagingItemReader<'a, R> {
        assert!(self.page_size > 0, "Page size must be greater than 0");

        KeysetPagingItemReader {
            source: self.source.expect("Page source is required"),
            page_size: self.page_size,
            buffer: RefCell::new(VecDeque::new()),
            cursor: Cell::new(None),
            exhausted: Cell::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::page::Page;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(i64);

    impl KeyedRecord for Row {
        type Key = i64;

        fn key(&self) -> i64 {
            self.0
        }
    }

    /// Answers with prepared pages and records the cursors it was queried with.
    struct ScriptedSource {
        pages: RefCell<VecDeque<Result<Page<Row>, BatchError>>>,
        queries: RefCell<Vec<Option<i64>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Vec<i64>, BatchError>>) -> Self {
            Self {
                pages: RefCell::new(
                    pages
                        .into_iter()
                        .map(|page| page.map(|keys| Page::new(keys.into_iter().map(Row).collect())))
                        .collect(),
                ),
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageSource<Row> for ScriptedSource {
        fn next_page(&self, cursor: Option<i64>, _page_size: usize) -> Result<Page<Row>, BatchError> {
            self.queries.borrow_mut().push(cursor);
            self.pages
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Page::empty()))
        }
    }

    fn drain(reader: &KeysetPagingItemReader<Row>) -> Result<Vec<i64>, BatchError> {
        let mut keys = Vec::new();
        while let Some(row) = reader.read()? {
            keys.push(row.0);
        }
        Ok(keys)
    }

    #[test]
    fn advances_the_cursor_page_after_page() {
        let source = ScriptedSource::new(vec![Ok(vec![1, 2, 3]), Ok(vec![5, 8, 13]), Ok(vec![])]);
        let reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(3)
            .build();

        assert_eq!(drain(&reader), Ok(vec![1, 2, 3, 5, 8, 13]));
        assert_eq!(*source.queries.borrow(), vec![None, Some(3), Some(13)]);
        assert_eq!(reader.cursor(), Some(13));
    }

    #[test]
    fn short_page_ends_reading_without_another_query() {
        let source = ScriptedSource::new(vec![Ok(vec![10, 20, 30]), Ok(vec![40])]);
        let reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(3)
            .build();

        assert_eq!(drain(&reader), Ok(vec![10, 20, 30, 40]));
        assert_eq!(*source.queries.borrow(), vec![None, Some(30)]);
    }

    #[test]
    fn huge_page_size_reads_a_small_source() {
        let source = ScriptedSource::new(vec![Ok(vec![1, 2, 3])]);
        let reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(usize::MAX)
            .build();

        assert_eq!(drain(&reader), Ok(vec![1, 2, 3]));
        assert_eq!(source.queries.borrow().len(), 1);
    }

    #[test]
    fn exhaustion_is_idempotent() {
        let source = ScriptedSource::new(vec![Ok(vec![])]);
        let reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(5)
            .build();

        assert_eq!(reader.read(), Ok(None));
        assert_eq!(reader.read(), Ok(None));
        assert_eq!(reader.read(), Ok(None));
        assert_eq!(source.queries.borrow().len(), 1);
    }

    #[test]
    fn propagates_source_failures() {
        let source = ScriptedSource::new(vec![
            Ok(vec![1, 2]),
            Err(BatchError::SourceUnavailable("connection refused".to_string())),
        ]);
        let reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(2)
            .build();

        assert_eq!(reader.read(), Ok(Some(Row(1))));
        assert_eq!(reader.read(), Ok(Some(Row(2))));
        assert_eq!(
            reader.read(),
            Err(BatchError::SourceUnavailable("connection refused".to_string()))
        );
    }

    #[test]
    fn rejects_a_cursor_that_does_not_advance() {
        let source = ScriptedSource::new(vec![Ok(vec![4, 5]), Ok(vec![3, 5])]);
        let reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(2)
            .build();

        let result = drain(&reader);

        assert!(matches!(result, Err(BatchError::SourceUnavailable(msg)) if msg.contains("did not advance")));
        assert_eq!(reader.read(), Ok(None));
    }

    #[test]
    #[should_panic(expected = "Page size must be greater than 0")]
    fn requires_a_positive_page_size() {
        let source = ScriptedSource::new(vec![]);
        let _reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(0)
            .build();
    }
}
