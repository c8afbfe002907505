//! Reads every row of the `person` table page by page, runs the CPU-bound
//! person processor on each record and logs the size of every chunk.
//!
//! Usage:
//!   DATABASE_URL=postgres://user:password@db/batchdb person-job --threads 10
//!
//! Exits with status 1 when the job fails.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chunk_batch::{
    config::BatchConfig,
    core::{
        job::{Job, JobBuilder, JobExecution, LoggingJobListener},
        step::{ChunkOrientedStep, StepBuilder},
    },
    item::{
        logger::LoggerWriter, paging::KeysetPagingItemReaderBuilder,
        rdbc::postgres::PostgresPageSource,
    },
    person::{person_query, Person, PersonProcessor},
};
use clap::Parser;
use log::{error, info};
use sqlx::postgres::PgPoolOptions;

#[derive(Parser, Debug)]
#[command(name = "person-job")]
#[command(version, about = "Chunk-oriented processing of the person table")]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Items per chunk, overrides BATCH_CHUNK_SIZE
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Rows per page query, overrides BATCH_PAGE_SIZE
    #[arg(long)]
    page_size: Option<usize>,

    /// Worker pool size, overrides BATCH_THREADS_COUNT
    #[arg(long)]
    threads: Option<usize>,

    /// One lightweight task per item instead of a fixed pool
    #[arg(long)]
    virtual_threads: Option<bool>,
}

impl Cli {
    fn batch_config(&self) -> Result<BatchConfig> {
        let mut config = BatchConfig::from_env()?;

        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
            if self.page_size.is_none() {
                config.page_size = chunk_size;
            }
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(threads) = self.threads {
            config.threads_count = threads;
        }
        if let Some(virtual_threads) = self.virtual_threads {
            config.virtual_threads_enabled = virtual_threads;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(&cli).await {
        Ok(execution) if execution.is_successful() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("Person job could not run: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<JobExecution> {
    let config = cli.batch_config()?;
    info!("Batch configuration: {:?}", config);

    let max_connections = u32::try_from(config.threads_count.saturating_add(2)).unwrap_or(u32::MAX);
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;

    let execution = {
        let source = PostgresPageSource::<Person>::new(pool.clone(), person_query());
        let reader = KeysetPagingItemReaderBuilder::new()
            .source(&source)
            .page_size(config.page_size)
            .build();
        let writer = LoggerWriter::default();
        let listener = LoggingJobListener;

        let step: ChunkOrientedStep<Person, Person> = StepBuilder::new("person-step")
            .config(&config)
            .reader(&reader)
            .processor(PersonProcessor)
            .writer(&writer)
            .build();

        let job = JobBuilder::new()
            .name("person-job".to_string())
            .start(&step)
            .listener(&listener)
            .build();

        job.run()?
    };

    pool.close().await;

    Ok(execution)
}
