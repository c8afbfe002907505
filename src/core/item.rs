use crate::error::BatchError;

/// Result of a read: `Ok(None)` once the reader is exhausted.
pub type ItemReaderResult<I> = Result<Option<I>, BatchError>;

pub type ItemProcessorResult<O> = Result<O, BatchError>;

pub type ItemWriterResult = Result<(), BatchError>;

/// Retrieval of the input of a step, one item at a time.
pub trait ItemReader<I> {
    fn read(&self) -> ItemReaderResult<I>;
}

/// Business logic applied to every item read by a step.
///
/// Items of a chunk are processed concurrently by the step's task executor,
/// so implementations must not share mutable state between calls.
pub trait ItemProcessor<I, O>: Send + Sync {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Output of a step, one chunk of items at a time.
///
/// `write` is called once per chunk, inside the chunk transaction, followed by
/// `flush`. `open` and `close` frame the whole step.
pub trait ItemWriter<O> {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Processor used when a step is built without one: returns a copy of the item.
#[derive(Default)]
pub struct PassThroughProcessor;

impl<T: Clone> ItemProcessor<T, T> for PassThroughProcessor {
    fn process(&self, item: &T) -> ItemProcessorResult<T> {
        Ok(item.clone())
    }
}
