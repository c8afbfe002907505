use std::fmt::Debug;

use crate::error::BatchError;

/// A record identified by a unique, totally ordered key.
///
/// The key is the cursor used by keyset pagination: a page query returns the
/// records whose key is strictly greater than the last key already seen.
pub trait KeyedRecord {
    type Key: Ord + Copy + Debug;

    fn key(&self) -> Self::Key;
}

/// An ordered slice of a keyed data set, as returned by a [`PageSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Page<R: KeyedRecord> {
    items: Vec<R>,
    cursor: Option<R::Key>,
}

impl<R: KeyedRecord> Page<R> {
    /// Builds a page from records already sorted by ascending key.
    pub fn new(items: Vec<R>) -> Self {
        let cursor = items.last().map(KeyedRecord::key);
        Self { items, cursor }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            cursor: None,
        }
    }

    /// Key of the last record of the page, `None` for an empty page.
    pub fn cursor(&self) -> Option<R::Key> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[R] {
        &self.items
    }

    pub fn into_items(self) -> Vec<R> {
        self.items
    }
}

/// A backing store that can be read page by page with keyset pagination.
///
/// Implementations must return at most `page_size` records whose key is
/// strictly greater than `cursor` (all records when `cursor` is `None`),
/// sorted by ascending key. An empty page means the source is exhausted for
/// that cursor. Connectivity or query failures are reported as
/// [`BatchError::SourceUnavailable`].
pub trait PageSource<R: KeyedRecord> {
    fn next_page(&self, cursor: Option<R::Key>, page_size: usize) -> Result<Page<R>, BatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(u32);

    impl KeyedRecord for Row {
        type Key = u32;

        fn key(&self) -> u32 {
            self.0
        }
    }

    #[test]
    fn cursor_is_the_key_of_the_last_record() {
        let page = Page::new(vec![Row(3), Row(7), Row(12)]);

        assert_eq!(page.cursor(), Some(12));
        assert_eq!(page.len(), 3);
        assert!(!page.is_empty());
    }

    #[test]
    fn empty_page_has_no_cursor() {
        let page: Page<Row> = Page::new(Vec::new());

        assert_eq!(page.cursor(), None);
        assert!(page.is_empty());
        assert_eq!(page, Page::empty());
    }
}
