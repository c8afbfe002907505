//! Sample `person` workload.
//!
//! A keyed record read from the `person` table, a processor burning a fixed
//! amount of CPU per record, and the binders needed to copy records into
//! another table.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        item::{ItemProcessor, ItemProcessorResult},
        page::KeyedRecord,
    },
    item::rdbc::KeysetQuery,
};

/// Columns read and written for a [`Person`], in binding order.
pub const PERSON_COLUMNS: [&str; 9] = [
    "id",
    "first_name",
    "last_name",
    "email",
    "age",
    "address",
    "job_title",
    "created_at",
    "updated_at",
];

/// Number of square roots summed per processed record.
pub const BUSY_LOOP_ITERATIONS: u32 = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: Option<i32>,
    pub address: Option<String>,
    pub job_title: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl KeyedRecord for Person {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

/// Keyset query over the `person` table, sorted by `id`.
pub fn person_query() -> KeysetQuery {
    KeysetQuery::new(&PERSON_COLUMNS.join(", "), "person", "id")
}

/// Simulates CPU-bound work, then returns the person unchanged.
#[derive(Default)]
pub struct PersonProcessor;

impl PersonProcessor {
    fn busy_loop() -> f64 {
        (0..BUSY_LOOP_ITERATIONS).map(|i| f64::from(i).sqrt()).sum()
    }
}

impl ItemProcessor<Person, Person> for PersonProcessor {
    fn process(&self, item: &Person) -> ItemProcessorResult<Person> {
        std::hint::black_box(Self::busy_loop());
        Ok(item.clone())
    }
}

#[cfg(feature = "rdbc-postgres")]
mod postgres_binder {
    use sqlx::{query_builder::Separated, Postgres};

    use super::Person;
    use crate::item::rdbc::DatabaseItemBinder;

    /// Binds every column of [`Person`] in [`PERSON_COLUMNS`](super::PERSON_COLUMNS) order.
    pub struct PostgresPersonBinder;

    impl DatabaseItemBinder<Person, Postgres> for PostgresPersonBinder {
        fn bind(&self, item: &Person, mut query_builder: Separated<Postgres, &str>) {
            query_builder.push_bind(item.id);
            query_builder.push_bind(item.first_name.clone());
            query_builder.push_bind(item.last_name.clone());
            query_builder.push_bind(item.email.clone());
            query_builder.push_bind(item.age);
            query_builder.push_bind(item.address.clone());
            query_builder.push_bind(item.job_title.clone());
            query_builder.push_bind(item.created_at);
            query_builder.push_bind(item.updated_at);
        }
    }
}

#[cfg(feature = "rdbc-sqlite")]
mod sqlite_binder {
    use sqlx::{query_builder::Separated, Sqlite};

    use super::Person;
    use crate::item::rdbc::DatabaseItemBinder;

    pub struct SqlitePersonBinder;

    impl DatabaseItemBinder<Person, Sqlite> for SqlitePersonBinder {
        fn bind(&self, item: &Person, mut query_builder: Separated<Sqlite, &str>) {
            query_builder.push_bind(item.id);
            query_builder.push_bind(item.first_name.clone());
            query_builder.push_bind(item.last_name.clone());
            query_builder.push_bind(item.email.clone());
            query_builder.push_bind(item.age);
            query_builder.push_bind(item.address.clone());
            query_builder.push_bind(item.job_title.clone());
            query_builder.push_bind(item.created_at);
            query_builder.push_bind(item.updated_at);
        }
    }
}

#[cfg(feature = "rdbc-postgres")]
pub use postgres_binder::PostgresPersonBinder;
#[cfg(feature = "rdbc-sqlite")]
pub use sqlite_binder::SqlitePersonBinder;
