#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Chunk Batch

 A small batch core for long-running, chunk-oriented jobs over keyed data
 sets: records are read page by page with keyset pagination, processed in
 parallel, and written one chunk per transaction.

 ## Core Concepts

- **Job:** The whole batch process, a sequence of `Step`s. Every run gets a
  run number and ends as `Completed` or `Failed`.
- **Step:** An independent phase of a job. The chunk-oriented step reads a
  chunk, processes its items concurrently, then writes and commits it before
  reading the next one.
- **PageSource:** A keyed store queried page by page, each page starting
  strictly after the last key of the previous one.
- **ItemReader:** The retrieval of input for a `Step`, one item at a time.
- **ItemProcessor:** The business logic applied to every item. It must be
  `Send + Sync`: items of a chunk are processed on several workers.
- **ItemWriter:** The output of a `Step`, one chunk of items at a time,
  inside the chunk transaction.
- **TaskExecutor:** How items are scheduled, either a fixed pool of worker
  threads or one lightweight task per item.

 ## Features

| **Feature**   | **Description**                                                   |
|---------------|-------------------------------------------------------------------|
| rdbc-postgres | Enables a keyset `PageSource` and a transactional writer for PostgreSQL |
| rdbc-sqlite   | Enables a keyset `PageSource` and a transactional writer for SQLite |
| logger        | Enables a logger `ItemWriter` reporting chunk sizes               |
| cli           | Builds the `person-job` binary                                    |
| full          | Enables all available features                                    |

 ## Configuration

`BatchConfig::from_env` reads a `.env` file if present, then:

| **Variable**                    | **Default**    |
|---------------------------------|----------------|
| `BATCH_CHUNK_SIZE`              | 2000           |
| `BATCH_PAGE_SIZE`               | the chunk size |
| `BATCH_THREADS_COUNT`           | 10             |
| `BATCH_VIRTUAL_THREADS_ENABLED` | true           |

 ## Getting Started

```rust
# use chunk_batch::{
#     core::{
#         item::{ItemProcessor, ItemProcessorResult},
#         job::{BatchStatus, Job, JobBuilder},
#         page::KeyedRecord,
#         step::{ChunkOrientedStep, StepBuilder},
#     },
#     error::BatchError,
#     item::{
#         memory::{InMemoryItemWriter, InMemoryPageSource},
#         paging::KeysetPagingItemReaderBuilder,
#     },
# };
#[derive(Debug, Clone, PartialEq)]
struct Order {
    id: u64,
    amount: u32,
}

impl KeyedRecord for Order {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}

struct WithTax;

impl ItemProcessor<Order, Order> for WithTax {
    fn process(&self, item: &Order) -> ItemProcessorResult<Order> {
        Ok(Order { id: item.id, amount: item.amount * 120 / 100 })
    }
}

fn main() -> Result<(), BatchError> {
    let source = InMemoryPageSource::new(
        (1..=25).map(|id| Order { id, amount: 100 }).collect(),
    );
    let reader = KeysetPagingItemReaderBuilder::new()
        .source(&source)
        .page_size(10)
        .build();
    let writer = InMemoryItemWriter::new();

    let step: ChunkOrientedStep<Order, Order> = StepBuilder::new("orders")
        .chunk(10)
        .reader(&reader)
        .processor(WithTax)
        .writer(&writer)
        .transaction_manager(&writer)
        .build();

    let job = JobBuilder::new().start(&step).build();
    let execution = job.run()?;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(writer.committed().len(), 25);
    assert!(writer.committed().iter().all(|order| order.amount == 120));

    Ok(())
}
```
 */

/// Batch configuration loaded from the environment
pub mod config;

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of page sources, readers and writers
pub mod item;

#[cfg(feature = "rdbc")]
/// Sample `person` record and CPU-bound processor
pub mod person;
