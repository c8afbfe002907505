use std::sync::Arc;

use log::{debug, warn};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};

use crate::{
    config::BatchConfig,
    core::{
        block_on,
        item::{ItemProcessor, ItemProcessorResult},
    },
    error::BatchError,
};

type TaskOutput<O> = (usize, ItemProcessorResult<O>);

/// Scheduling strategy for the processing phase of a chunk.
///
/// Both strategies process every item of a chunk independently and hand the
/// results back in submission order. They differ only in how work is
/// scheduled:
///
/// - `Pooled` runs at most `threads` items at a time on blocking worker
///   threads. Submission waits for a free worker, which bounds memory and
///   applies backpressure.
/// - `Lightweight` spawns one task per item right away and lets the runtime
///   scheduler interleave them. Nothing bounds the number of pending tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskExecutor {
    Pooled {
        threads: usize,
    },
    #[default]
    Lightweight,
}

impl From<&BatchConfig> for TaskExecutor {
    fn from(config: &BatchConfig) -> Self {
        if config.virtual_threads_enabled {
            TaskExecutor::Lightweight
        } else {
            TaskExecutor::pooled(config.threads_count)
        }
    }
}

impl TaskExecutor {
    pub fn pooled(threads: usize) -> Self {
        TaskExecutor::Pooled {
            threads: threads.max(1),
        }
    }

    /// Processes all items of a chunk and returns the results in input order.
    ///
    /// Fails fast: the first processing error stops submission, cancels the
    /// tasks that have not started yet and waits for the running ones before
    /// returning it.
    pub fn process_all<I, O>(
        &self,
        processor: &Arc<dyn ItemProcessor<I, O>>,
        items: Vec<I>,
    ) -> Result<Vec<O>, BatchError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        block_on(self.run_tasks(processor, items))?
    }

    async fn run_tasks<I, O>(
        &self,
        processor: &Arc<dyn ItemProcessor<I, O>>,
        items: Vec<I>,
    ) -> Result<Vec<O>, BatchError>
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let mut slots: Vec<Option<O>> = std::iter::repeat_with(|| None).take(items.len()).collect();
        let mut tasks: JoinSet<TaskOutput<O>> = JoinSet::new();
        let mut failure: Option<BatchError> = None;

        match self {
            TaskExecutor::Pooled { threads } => {
                let workers = Arc::new(Semaphore::new((*threads).min(Semaphore::MAX_PERMITS)));

                for (index, item) in items.into_iter().enumerate() {
                    while let Some(joined) = tasks.try_join_next() {
                        if let Err(err) = collect(joined, &mut slots) {
                            failure = Some(err);
                            break;
                        }
                    }
                    if failure.is_some() {
                        debug!("Stopping submission at item {} after a failure", index);
                        break;
                    }

                    let permit = Arc::clone(&workers)
                        .acquire_owned()
                        .await
                        .map_err(|err| BatchError::ItemProcessor(err.to_string()))?;
                    let processor = Arc::clone(processor);
                    tasks.spawn_blocking(move || {
                        let _permit = permit;
                        (index, processor.process(&item))
                    });
                }
            }
            TaskExecutor::Lightweight => {
                for (index, item) in items.into_iter().enumerate() {
                    let processor = Arc::clone(processor);
                    tasks.spawn(async move { (index, processor.process(&item)) });
                }
            }
        }

        if failure.is_some() {
            tasks.abort_all();
        }

        // Tasks that already started cannot be interrupted: always drain the set.
        while let Some(joined) = tasks.join_next().await {
            if failure.is_some() {
                continue;
            }
            if let Err(err) = collect(joined, &mut slots) {
                failure = Some(err);
                tasks.abort_all();
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<O>>>()
            .ok_or_else(|| BatchError::ItemProcessor("missing result for a processed item".to_string()))
    }
}

fn collect<O>(
    joined: Result<TaskOutput<O>, JoinError>,
    slots: &mut [Option<O>],
) -> Result<(), BatchError> {
    match joined {
        Ok((index, Ok(item))) => {
            slots[index] = Some(item);
            Ok(())
        }
        Ok((index, Err(err))) => {
            warn!("Error processing item {}: {}", index, err);
            Err(err)
        }
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => Err(BatchError::ItemProcessor(format!(
            "processing task panicked: {}",
            err
        ))),
    }
}
