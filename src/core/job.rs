use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use log::{error, info};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    step::{Step, StepExecution},
};

/// Type alias for job execution results.
///
/// A `JobResult` is a `Result` that contains either:
/// - A `JobExecution` carrying the terminal status of the run
/// - A `BatchError` when the run could not start at all
type JobResult<T> = Result<T, BatchError>;

/// Represents a job that can be executed.
///
/// A job is a container for a sequence of steps that are executed in order.
/// The job is responsible for orchestrating the steps and reporting the
/// overall result.
pub trait Job {
    /// Runs the job and returns the result of the job execution.
    ///
    /// # Returns
    /// - `Ok(JobExecution)` once the run reached a terminal status, either
    ///   [`BatchStatus::Completed`] or [`BatchStatus::Failed`]
    /// - `Err(BatchError::JobAlreadyRunning)` when a run of this job is still
    ///   in progress
    fn run(&self) -> JobResult<JobExecution>;
}

/// Status of a job run.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BatchStatus {
    /// Status of a job prior to its execution.
    Starting,
    /// Status of a job that is running.
    Started,
    /// The job has successfully completed its execution.
    Completed,
    /// The job has failed during its execution.
    Failed,
}

/// Represents one run of a job.
#[derive(Debug, Clone)]
pub struct JobExecution {
    /// Unique identifier of this run
    pub id: Uuid,
    pub job_name: String,
    /// Run number, increasing with every run of the same job instance
    pub run_id: u64,
    pub status: BatchStatus,
    /// The time when the job started executing
    pub start: Instant,
    /// The time when the job finished executing
    pub end: Instant,
    /// The total duration of the job execution
    pub duration: Duration,
    /// Executions of the steps that ran, in order
    pub step_executions: Vec<StepExecution>,
    /// Error that failed the run
    pub failure: Option<BatchError>,
}

impl JobExecution {
    fn new(job_name: &str, run_id: u64) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            run_id,
            status: BatchStatus::Starting,
            start: now,
            end: now,
            duration: Duration::default(),
            step_executions: Vec::new(),
            failure: None,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    /// Process exit code for this run: 0 when completed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_successful() { 0 } else { 1 }
    }
}

/// Callbacks around a job run.
///
/// `after_job` is called exactly once per run, with the terminal execution.
pub trait JobExecutionListener {
    fn before_job(&self, _job_execution: &JobExecution) {}

    fn after_job(&self, job_execution: &JobExecution);
}

/// Logs the outcome of every run.
#[derive(Default)]
pub struct LoggingJobListener;

impl JobExecutionListener for LoggingJobListener {
    fn after_job(&self, job_execution: &JobExecution) {
        let written: usize = job_execution
            .step_executions
            .iter()
            .map(|step| step.write_count)
            .sum();

        match &job_execution.failure {
            None => info!(
                "Job {} (run {}) finished: {} items written in {:?}",
                job_execution.job_name, job_execution.run_id, written, job_execution.duration
            ),
            Some(err) => error!(
                "Job {} (run {}) failed after {:?}: {}",
                job_execution.job_name, job_execution.run_id, job_execution.duration, err
            ),
        }
    }
}

/// Represents an instance of a job.
///
/// A `JobInstance` defines a specific configuration of a job that can be
/// executed. It contains:
/// - A unique identifier
/// - A name for the job
/// - A sequence of steps to be executed
/// - The listeners notified around each run
pub struct JobInstance<'a> {
    /// Unique identifier for this job instance
    id: Uuid,
    /// Human-readable name for the job
    name: String,
    /// Collection of steps that make up this job, in execution order
    steps: Vec<&'a dyn Step>,
    listeners: Vec<&'a dyn JobExecutionListener>,
    next_run_id: Cell<u64>,
    running: Cell<bool>,
}

/// Clears the running flag of a job when a run ends, however it ends.
struct RunningGuard<'g>(&'g Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl JobInstance<'_> {
    pub fn get_id(&self) -> Uuid {
        self.id
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }
}

impl Job for JobInstance<'_> {
    /// Runs the job by executing its steps in sequence.
    ///
    /// The first failing step stops the job: later steps are not executed and
    /// the run ends as [`BatchStatus::Failed`] with the step error attached.
    fn run(&self) -> JobResult<JobExecution> {
        if self.running.replace(true) {
            return Err(BatchError::JobAlreadyRunning(self.name.clone()));
        }
        let _running = RunningGuard(&self.running);

        let run_id = self.next_run_id.get();
        self.next_run_id.set(run_id + 1);

        let mut job_execution = JobExecution::new(&self.name, run_id);

        info!(
            "Start of job: {}, id: {}, run: {}",
            self.name, self.id, run_id
        );

        for listener in &self.listeners {
            listener.before_job(&job_execution);
        }

        job_execution.status = BatchStatus::Started;

        for step in &self.steps {
            let mut step_execution = StepExecution::new(step.get_name());
            let result = step.execute(&mut step_execution);
            job_execution.step_executions.push(step_execution);

            if let Err(err) = result {
                error!("Step {} failed: {}", step.get_name(), err);
                job_execution.failure = Some(err);
                break;
            }
        }

        job_execution.status = if job_execution.failure.is_some() {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        };
        job_execution.end = Instant::now();
        job_execution.duration = job_execution.start.elapsed();

        info!(
            "End of job: {}, id: {}, run: {}, status: {:?}",
            self.name, self.id, run_id, job_execution.status
        );

        for listener in &self.listeners {
            listener.after_job(&job_execution);
        }

        Ok(job_execution)
    }
}

/// Builder for creating a job instance.
///
/// # Example
///
/// ```rust
/// use chunk_batch::{
///     core::{
///         item::PassThroughProcessor,
///         job::{BatchStatus, Job, JobBuilder, LoggingJobListener},
///         page::KeyedRecord,
///         step::{ChunkOrientedStep, StepBuilder},
///     },
///     item::{
///         memory::{InMemoryItemWriter, InMemoryPageSource},
///         paging::KeysetPagingItemReaderBuilder,
///     },
/// };
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Customer(u64);
///
/// impl KeyedRecord for Customer {
///     type Key = u64;
///
///     fn key(&self) -> u64 {
///         self.0
///     }
/// }
///
/// let source = InMemoryPageSource::new((1..=5).map(Customer).collect());
/// let reader = KeysetPagingItemReaderBuilder::new().source(&source).page_size(2).build();
/// let imported = InMemoryItemWriter::new();
/// let exported = InMemoryItemWriter::new();
/// let empty = InMemoryPageSource::new(Vec::<Customer>::new());
/// let no_more = KeysetPagingItemReaderBuilder::new().source(&empty).build();
///
/// let import_step: ChunkOrientedStep<Customer, Customer> = StepBuilder::new("import")
///     .chunk(2)
///     .reader(&reader)
///     .processor(PassThroughProcessor)
///     .writer(&imported)
///     .transaction_manager(&imported)
///     .build();
/// let export_step: ChunkOrientedStep<Customer, Customer> = StepBuilder::new("export")
///     .chunk(2)
///     .reader(&no_more)
///     .processor(PassThroughProcessor)
///     .writer(&exported)
///     .build();
/// let listener = LoggingJobListener;
///
/// let job = JobBuilder::new()
///     .name("import-customers".to_string())
///     .start(&import_step)
///     .next(&export_step)
///     .listener(&listener)
///     .build();
///
/// let execution = job.run().unwrap();
/// assert_eq!(execution.status, BatchStatus::Completed);
/// assert_eq!(execution.step_executions.len(), 2);
/// assert_eq!(imported.committed().len(), 5);
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    /// Collection of steps to be executed, in order
    steps: Vec<&'a dyn Step>,
    listeners: Vec<&'a dyn JobExecutionListener>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Sets the first step of the job.
    ///
    /// Identical to `next()`, reads better for the initial step.
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Adds a step to the job. Steps are executed in the order they are added.
    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn listener(mut self, listener: &'a dyn JobExecutionListener) -> JobBuilder<'a> {
        self.listeners.push(listener);
        self
    }

    /// Builds and returns a `JobInstance` based on the configured parameters.
    ///
    /// If no name has been provided, a random name is generated.
    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
            listeners: self.listeners,
            next_run_id: Cell::new(1),
            running: Cell::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        rc::{Rc, Weak},
    };

    use super::*;
    use crate::core::step::StepStatus;

    struct FixedStep {
        name: &'static str,
        outcome: Result<(), BatchError>,
        executions: Cell<usize>,
    }

    impl FixedStep {
        fn new(name: &'static str, outcome: Result<(), BatchError>) -> Self {
            Self {
                name,
                outcome,
                executions: Cell::new(0),
            }
        }
    }

    impl Step for FixedStep {
        fn get_name(&self) -> &str {
            self.name
        }

        fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
            self.executions.set(self.executions.get() + 1);
            step_execution.status = if self.outcome.is_ok() {
                StepStatus::Success
            } else {
                StepStatus::ProcessorError
            };
            self.outcome.clone()
        }
    }

    #[derive(Default)]
    struct CountingListener {
        before: Cell<usize>,
        after: RefCell<Vec<(u64, BatchStatus)>>,
    }

    impl JobExecutionListener for CountingListener {
        fn before_job(&self, job_execution: &JobExecution) {
            assert_eq!(job_execution.status, BatchStatus::Starting);
            self.before.set(self.before.get() + 1);
        }

        fn after_job(&self, job_execution: &JobExecution) {
            self.after
                .borrow_mut()
                .push((job_execution.run_id, job_execution.status));
        }
    }

    #[test]
    fn completes_when_every_step_succeeds() {
        let first = FixedStep::new("first", Ok(()));
        let second = FixedStep::new("second", Ok(()));
        let listener = CountingListener::default();

        let job = JobBuilder::new()
            .name("complete".to_string())
            .start(&first)
            .next(&second)
            .listener(&listener)
            .build();
        let execution = job.run().unwrap();

        assert_eq!(execution.status, BatchStatus::Completed);
        assert_eq!(execution.exit_code(), 0);
        assert_eq!(execution.job_name, "complete");
        assert_eq!(execution.step_executions.len(), 2);
        assert_eq!(execution.failure, None);
        assert_eq!(listener.before.get(), 1);
        assert_eq!(*listener.after.borrow(), vec![(1, BatchStatus::Completed)]);
        assert!(!job.is_running());
    }

    #[test]
    fn stops_at_the_first_failing_step() {
        let failing = FixedStep::new(
            "failing",
            Err(BatchError::ItemProcessor("bad record".to_string())),
        );
        let skipped = FixedStep::new("skipped", Ok(()));
        let listener = CountingListener::default();

        let job = JobBuilder::new()
            .start(&failing)
            .next(&skipped)
            .listener(&listener)
            .build();
        let execution = job.run().unwrap();

        assert_eq!(execution.status, BatchStatus::Failed);
        assert_eq!(execution.exit_code(), 1);
        assert_eq!(
            execution.failure,
            Some(BatchError::ItemProcessor("bad record".to_string()))
        );
        assert_eq!(skipped.executions.get(), 0);
        assert_eq!(execution.step_executions.len(), 1);
        assert_eq!(*listener.after.borrow(), vec![(1, BatchStatus::Failed)]);
    }

    #[test]
    fn numbers_successive_runs() {
        let step = FixedStep::new("step", Ok(()));
        let listener = CountingListener::default();
        let job = JobBuilder::new().start(&step).listener(&listener).build();

        let first = job.run().unwrap();
        let second = job.run().unwrap();
        let third = job.run().unwrap();

        assert_eq!((first.run_id, second.run_id, third.run_id), (1, 2, 3));
        assert_ne!(first.id, second.id);
        assert_eq!(listener.before.get(), 3);
        assert_eq!(listener.after.borrow().len(), 3);
        assert_eq!(job.get_name().len(), 8);
    }

    struct ReentrantStep {
        job: RefCell<Weak<JobInstance<'static>>>,
        observed: RefCell<Option<BatchError>>,
    }

    impl Step for ReentrantStep {
        fn get_name(&self) -> &str {
            "reentrant"
        }

        fn execute(&self, _step_execution: &mut StepExecution) -> Result<(), BatchError> {
            if let Some(job) = self.job.borrow().upgrade() {
                assert!(job.is_running());
                *self.observed.borrow_mut() = job.run().err();
            }
            Ok(())
        }
    }

    #[test]
    fn refuses_to_run_while_already_running() {
        let step: &'static ReentrantStep = Box::leak(Box::new(ReentrantStep {
            job: RefCell::new(Weak::new()),
            observed: RefCell::new(None),
        }));
        let job = Rc::new(JobBuilder::new().name("single".to_string()).start(step).build());
        *step.job.borrow_mut() = Rc::downgrade(&job);

        let execution = job.run().unwrap();

        assert_eq!(execution.status, BatchStatus::Completed);
        assert_eq!(
            *step.observed.borrow(),
            Some(BatchError::JobAlreadyRunning("single".to_string()))
        );
        assert_eq!(job.run().unwrap().run_id, 2);
    }
}
