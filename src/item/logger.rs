use std::thread;

use log::info;

use crate::core::item::{ItemWriter, ItemWriterResult};

/// Writer that only reports the size of each chunk and the thread writing it.
///
/// Items themselves are not logged.
#[derive(Default)]
pub struct LoggerWriter {}

impl<T> ItemWriter<T> for LoggerWriter {
    fn write(&self, items: &[T]) -> ItemWriterResult {
        let current = thread::current();
        let name = current.name().unwrap_or("unnamed");

        info!(
            "Processing {} items on thread {} ({:?})",
            items.len(),
            name,
            current.id()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_any_item_type() {
        let writer = LoggerWriter::default();

        assert_eq!(writer.write(&[1u8, 2, 3]), Ok(()));
        assert_eq!(ItemWriter::<String>::write(&writer, &[]), Ok(()));
    }
}
