use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::{config::BatchConfig, error::BatchError};

use super::{
    build_name,
    chunk::{Chunk, ChunkState, ChunkStatus},
    executor::TaskExecutor,
    item::{ItemProcessor, ItemReader, ItemWriter},
    transaction::{ChunkTransaction, ResourcelessTransactionManager, TransactionManager},
};

static RESOURCELESS_TRANSACTION_MANAGER: ResourcelessTransactionManager =
    ResourcelessTransactionManager;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StepStatus {
    /// The step has been created but not executed yet
    Starting,
    /// The step is reading, processing and writing chunks
    Started,
    /// Every chunk has been committed
    Success,
    /// The reader failed, the current chunk has been abandoned
    ReadError,
    /// An item could not be processed, the current chunk has been rolled back
    ProcessorError,
    /// The writer or the transaction failed, the current chunk has been rolled back
    WriteError,
}

/// Execution details of one step run.
#[derive(Debug, Clone)]
pub struct StepExecution {
    /// Unique identifier for this step execution
    pub id: Uuid,
    /// Human-readable name for the step
    pub name: String,
    /// Current status of the step execution
    pub status: StepStatus,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Number of items successfully read
    pub read_count: usize,
    /// Number of items written by committed chunks
    pub write_count: usize,
    /// Number of committed chunks
    pub commit_count: usize,
    /// Number of chunks rolled back or abandoned
    pub rollback_count: usize,
    /// Number of errors encountered during reading
    pub read_error_count: usize,
    /// Number of errors encountered during processing
    pub process_error_count: usize,
    /// Number of errors encountered during writing
    pub write_error_count: usize,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: StepStatus::Starting,
            start_time: now,
            end_time: now,
            duration: Duration::default(),
            read_count: 0,
            write_count: 0,
            commit_count: 0,
            rollback_count: 0,
            read_error_count: 0,
            process_error_count: 0,
            write_error_count: 0,
        }
    }
}

/// An independent, sequential phase of a job.
pub trait Step {
    fn get_name(&self) -> &str;

    /// Executes the step.
    ///
    /// # Returns
    /// - `Ok(())`: the step completed successfully
    /// - `Err(BatchError)`: the step failed, with the error that stopped it
    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError>;
}

/// Chunk orchestrator: reads a chunk, processes its items in parallel and
/// writes it inside a transaction, until the reader is exhausted.
///
/// Reading and writing are sequential; only processing fans out to the task
/// executor. Any failure rolls back the current chunk and stops the step.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    /// Component responsible for reading items from the source
    reader: &'a dyn ItemReader<I>,
    /// Component responsible for processing items, shared with worker tasks
    processor: Arc<dyn ItemProcessor<I, O>>,
    /// Component responsible for writing items to the destination
    writer: &'a dyn ItemWriter<O>,
    /// Transaction boundary of each chunk
    transaction_manager: &'a dyn TransactionManager,
    task_executor: TaskExecutor,
    /// Number of items to process in each chunk
    chunk_size: usize,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let start_time = Instant::now();
        step_execution.start_time = start_time;
        step_execution.status = StepStatus::Started;

        info!(
            "Start of step: {}, id: {}",
            step_execution.name, step_execution.id
        );

        let result = match self.writer.open() {
            Ok(()) => {
                let result = self.run_chunks(step_execution);
                if let Err(err) = self.writer.close() {
                    warn!("Non-fatal error while closing writer: {}", err);
                }
                result
            }
            Err(err) => {
                error!("Unable to open writer: {}", err);
                step_execution.status = StepStatus::WriteError;
                Err(err)
            }
        };

        if result.is_ok() {
            step_execution.status = StepStatus::Success;
        }

        step_execution.end_time = Instant::now();
        step_execution.duration = start_time.elapsed();

        info!(
            "End of step: {}, id: {}, status: {:?}, read: {}, written: {}, commits: {}, rollbacks: {}",
            step_execution.name,
            step_execution.id,
            step_execution.status,
            step_execution.read_count,
            step_execution.write_count,
            step_execution.commit_count,
            step_execution.rollback_count
        );

        result
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn run_chunks(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
        let mut chunk_number = 0;

        loop {
            chunk_number += 1;
            let mut chunk = Chunk::new(chunk_number, self.chunk_size);
            chunk.transition(ChunkState::Reading)?;

            let chunk_status = match self.read_chunk(step_execution, &mut chunk) {
                Ok(status) => status,
                Err(err) => {
                    chunk.transition(ChunkState::RolledBack)?;
                    step_execution.rollback_count += 1;
                    step_execution.status = StepStatus::ReadError;
                    return Err(err);
                }
            };

            if chunk.is_empty() {
                debug!("Reader exhausted, no chunk {} to write", chunk_number);
                return Ok(());
            }

            self.process_and_write_chunk(step_execution, chunk)?;

            if chunk_status == ChunkStatus::Finished {
                return Ok(());
            }
        }
    }

    /// Reads items until the chunk is full or the reader is exhausted.
    ///
    /// A read error abandons the chunk: items already read are dropped.
    fn read_chunk(
        &self,
        step_execution: &mut StepExecution,
        chunk: &mut Chunk<I>,
    ) -> Result<ChunkStatus, BatchError> {
        debug!("Start reading chunk {}", chunk.number());

        while chunk.len() < self.chunk_size {
            match self.reader.read() {
                Ok(Some(item)) => {
                    chunk.push(item);
                    step_execution.read_count += 1;
                }
                Ok(None) => {
                    debug!("End reading chunk {}: FINISHED", chunk.number());
                    return Ok(ChunkStatus::Finished);
                }
                Err(err) => {
                    error!("Error reading chunk {}: {}", chunk.number(), err);
                    step_execution.read_error_count += 1;
                    return Err(err);
                }
            }
        }

        debug!("End reading chunk {}: FULL", chunk.number());
        Ok(ChunkStatus::Full)
    }

    /// Processes and writes one chunk inside its own transaction.
    fn process_and_write_chunk(
        &self,
        step_execution: &mut StepExecution,
        mut chunk: Chunk<I>,
    ) -> Result<(), BatchError> {
        let transaction = match ChunkTransaction::begin(self.transaction_manager) {
            Ok(transaction) => transaction,
            Err(err) => {
                error!("Unable to open transaction for chunk {}: {}", chunk.number(), err);
                chunk.transition(ChunkState::RolledBack)?;
                step_execution.rollback_count += 1;
                step_execution.status = StepStatus::WriteError;
                return Err(err);
            }
        };

        chunk.transition(ChunkState::Processing)?;
        debug!("Processing chunk {} of {} items", chunk.number(), chunk.len());

        let items = chunk.take_items();
        let processed = match self.task_executor.process_all(&self.processor, items) {
            Ok(processed) => processed,
            Err(err) => {
                error!("Error processing chunk {}: {}", chunk.number(), err);
                step_execution.process_error_count += 1;
                step_execution.status = StepStatus::ProcessorError;
                return self.roll_back(step_execution, chunk, transaction, err);
            }
        };

        let mut chunk = chunk.with_items(processed);
        chunk.transition(ChunkState::Writing)?;
        debug!("Writing chunk {} of {} items", chunk.number(), chunk.len());

        let written = self
            .writer
            .write(chunk.items())
            .and_then(|()| self.writer.flush());
        if let Err(err) = written {
            error!("Error writing chunk {}: {}", chunk.number(), err);
            step_execution.write_error_count += chunk.len();
            step_execution.status = StepStatus::WriteError;
            return self.roll_back(step_execution, chunk, transaction, err);
        }

        if let Err(err) = transaction.commit() {
            error!("Unable to commit chunk {}: {}", chunk.number(), err);
            chunk.transition(ChunkState::RolledBack)?;
            step_execution.write_error_count += chunk.len();
            step_execution.rollback_count += 1;
            step_execution.status = StepStatus::WriteError;
            return Err(err);
        }

        chunk.transition(ChunkState::Committed)?;
        step_execution.commit_count += 1;
        step_execution.write_count += chunk.len();

        Ok(())
    }

    fn roll_back<T>(
        &self,
        step_execution: &mut StepExecution,
        mut chunk: Chunk<T>,
        transaction: ChunkTransaction<'_>,
        cause: BatchError,
    ) -> Result<(), BatchError> {
        if let Err(err) = transaction.rollback() {
            error!("Rollback of chunk {} failed: {}", chunk.number(), err);
        }
        chunk.transition(ChunkState::RolledBack)?;
        step_execution.rollback_count += 1;

        Err(cause)
    }
}

pub struct ChunkOrientedStepBuilder<'a, I, O> {
    /// Optional name for the step (generated randomly if not specified)
    name: String,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<Arc<dyn ItemProcessor<I, O>>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    transaction_manager: Option<&'a dyn TransactionManager>,
    task_executor: TaskExecutor,
    chunk_size: usize,
}

impl<'a, I, O> ChunkOrientedStepBuilder<'a, I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: None,
            writer: None,
            transaction_manager: None,
            task_executor: TaskExecutor::default(),
            chunk_size: 10,
        }
    }

    pub fn reader(mut self, reader: &'a impl ItemReader<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor<P>(mut self, processor: P) -> Self
    where
        P: ItemProcessor<I, O> + 'static,
    {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn writer(mut self, writer: &'a impl ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Transaction boundary of every chunk. Writers persisting data usually
    /// act as their own transaction manager.
    pub fn transaction_manager(mut self, transaction_manager: &'a impl TransactionManager) -> Self {
        self.transaction_manager = Some(transaction_manager);
        self
    }

    pub fn task_executor(mut self, task_executor: TaskExecutor) -> Self {
        self.task_executor = task_executor;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Applies the chunk size and the task executor of a batch configuration.
    pub fn config(self, config: &BatchConfig) -> Self {
        self.chunk_size(config.chunk_size)
            .task_executor(TaskExecutor::from(config))
    }

    /// # Panics
    ///
    /// Panics if the reader, the processor or the writer is missing, or if the
    /// chunk size is 0. Use
    /// [`PassThroughProcessor`](super::item::PassThroughProcessor) to write items as read.
    pub fn build(self) -> ChunkOrientedStep<'a, I, O> {
        assert!(self.chunk_size > 0, "Chunk size must be greater than 0");

        ChunkOrientedStep {
            name: self.name,
            reader: self.reader.expect("Reader is required for building a step"),
            processor: self
                .processor
                .expect("Processor is required for building a step"),
            writer: self.writer.expect("Writer is required for building a step"),
            transaction_manager: self
                .transaction_manager
                .unwrap_or(&RESOURCELESS_TRANSACTION_MANAGER),
            task_executor: self.task_executor,
            chunk_size: self.chunk_size,
        }
    }
}

/// Entry point for building steps.
pub struct StepBuilder {
    name: String,
}

impl Default for StepBuilder {
    fn default() -> Self {
        Self { name: build_name() }
    }
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn chunk<'a, I, O>(self, chunk_size: usize) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).chunk_size(chunk_size)
    }

    pub fn config<'a, I, O>(self, config: &BatchConfig) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).config(config)
    }
}
