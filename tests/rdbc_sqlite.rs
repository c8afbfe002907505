use std::path::Path;

use chrono::NaiveDate;
use chunk_batch::{
    core::{
        executor::TaskExecutor,
        item::{ItemProcessor, ItemProcessorResult},
        job::{BatchStatus, Job, JobBuilder},
        step::{ChunkOrientedStep, StepBuilder, StepStatus},
    },
    item::{
        paging::KeysetPagingItemReaderBuilder,
        rdbc::sqlite::{SqliteItemWriter, SqliteItemWriterBuilder, SqlitePageSource},
    },
    person::{person_query, Person, PersonProcessor, SqlitePersonBinder, PERSON_COLUMNS},
    BatchError,
};
use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, SqlitePool};
use tempfile::NamedTempFile;

async fn prepare_database(file: &NamedTempFile, persons: i64) -> Result<SqlitePool, sqlx::Error> {
    let connection_uri = format!("sqlite://{}", file.path().display());
    let pool = SqlitePoolOptions::new()
        .max_connections(3)
        .connect(&connection_uri)
        .await?;

    let migrator = Migrator::new(Path::new("tests/migrations/sqlite")).await?;
    migrator.run(&pool).await?;

    let created_at = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|date| date.and_hms_opt(8, 30, 0));

    let mut tx = pool.begin().await?;
    for id in 1..=persons {
        sqlx::query(
            "INSERT INTO person (id, first_name, last_name, email, age, address, job_title, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(format!("First{}", id))
        .bind(format!("Last{}", id))
        .bind(format!("person{}@example.com", id))
        .bind(if id % 10 == 0 { None } else { Some(20 + (id % 50) as i32) })
        .bind(format!("{} Main Street", id))
        .bind(if id % 3 == 0 { Some("Engineer") } else { None })
        .bind(created_at)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(pool)
}

async fn fetch_all(pool: &SqlitePool, table: &str) -> Result<Vec<Person>, sqlx::Error> {
    sqlx::query_as::<_, Person>(&format!(
        "SELECT {} FROM {} ORDER BY id",
        PERSON_COLUMNS.join(", "),
        table
    ))
    .fetch_all(pool)
    .await
}

fn copy_writer<'a>(pool: &'a SqlitePool, binder: &'a SqlitePersonBinder) -> SqliteItemWriter<'a, Person> {
    PERSON_COLUMNS
        .iter()
        .fold(
            SqliteItemWriterBuilder::new().pool(pool).table("person_copy"),
            |builder, column| builder.add_column(column),
        )
        .item_binder(binder)
        .build()
}

struct RejectingProcessor {
    rejected_id: i64,
}

impl ItemProcessor<Person, Person> for RejectingProcessor {
    fn process(&self, item: &Person) -> ItemProcessorResult<Person> {
        if item.id == self.rejected_id {
            return Err(BatchError::ItemProcessor(format!("person {} rejected", item.id)));
        }
        PersonProcessor.process(item)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn copies_every_person_exactly_once() -> Result<(), sqlx::Error> {
    let _ = env_logger::try_init();
    let database_file = NamedTempFile::new()?;
    let pool = prepare_database(&database_file, 1234).await?;

    let source = SqlitePageSource::<Person>::new(pool.clone(), person_query());
    let reader = KeysetPagingItemReaderBuilder::new()
        .source(&source)
        .page_size(100)
        .build();
    let binder = SqlitePersonBinder;
    let writer = copy_writer(&pool, &binder);

    let step: ChunkOrientedStep<Person, Person> = StepBuilder::new("copy-persons")
        .chunk(250)
        .reader(&reader)
        .processor(PersonProcessor)
        .writer(&writer)
        .transaction_manager(&writer)
        .task_executor(TaskExecutor::pooled(4))
        .build();
    let job = JobBuilder::new().start(&step).build();

    let execution = job.run().unwrap();

    assert_eq!(execution.status, BatchStatus::Completed);
    let step_execution = &execution.step_executions[0];
    assert_eq!(step_execution.status, StepStatus::Success);
    assert_eq!(step_execution.read_count, 1234);
    assert_eq!(step_execution.write_count, 1234);
    assert_eq!(step_execution.commit_count, 5);

    assert_eq!(fetch_all(&pool, "person_copy").await?, fetch_all(&pool, "person").await?);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_chunk_leaves_no_rows_behind() -> Result<(), sqlx::Error> {
    let database_file = NamedTempFile::new()?;
    let pool = prepare_database(&database_file, 1000).await?;

    let source = SqlitePageSource::<Person>::new(pool.clone(), person_query());
    let reader = KeysetPagingItemReaderBuilder::new()
        .source(&source)
        .page_size(250)
        .build();
    let binder = SqlitePersonBinder;
    let writer = copy_writer(&pool, &binder);

    let step: ChunkOrientedStep<Person, Person> = StepBuilder::new("copy-persons")
        .chunk(250)
        .reader(&reader)
        .processor(RejectingProcessor { rejected_id: 600 })
        .writer(&writer)
        .transaction_manager(&writer)
        .build();
    let job = JobBuilder::new().start(&step).build();

    let execution = job.run().unwrap();

    assert_eq!(execution.status, BatchStatus::Failed);
    assert_eq!(
        execution.failure,
        Some(BatchError::ItemProcessor("person 600 rejected".to_string()))
    );

    let copied = fetch_all(&pool, "person_copy").await?;
    assert_eq!(copied.len(), 500);
    assert_eq!(copied.last().map(|person| person.id), Some(500));

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_table_fails_the_job() -> Result<(), sqlx::Error> {
    let database_file = NamedTempFile::new()?;
    let pool = prepare_database(&database_file, 10).await?;
    sqlx::query("DROP TABLE person").execute(&pool).await?;

    let source = SqlitePageSource::<Person>::new(pool.clone(), person_query());
    let reader = KeysetPagingItemReaderBuilder::new()
        .source(&source)
        .page_size(5)
        .build();
    let binder = SqlitePersonBinder;
    let writer = copy_writer(&pool, &binder);

    let step: ChunkOrientedStep<Person, Person> = StepBuilder::new("copy-persons")
        .chunk(5)
        .reader(&reader)
        .processor(PersonProcessor)
        .writer(&writer)
        .transaction_manager(&writer)
        .build();
    let job = JobBuilder::new().start(&step).build();

    let execution = job.run().unwrap();

    assert_eq!(execution.status, BatchStatus::Failed);
    assert!(matches!(execution.failure, Some(BatchError::SourceUnavailable(_))));
    assert_eq!(execution.step_executions[0].status, StepStatus::ReadError);

    Ok(())
}
