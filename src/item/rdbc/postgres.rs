use std::{cell::RefCell, marker::PhantomData};

use log::{debug, warn};
use sqlx::{postgres::PgRow, FromRow, Pool, Postgres, Transaction};

use crate::{
    core::{
        block_on,
        item::{ItemWriter, ItemWriterResult},
        page::{KeyedRecord, Page, PageSource},
        transaction::TransactionManager,
    },
    item::rdbc::{insert_queries, DatabaseItemBinder, KeysetQuery},
    BatchError,
};

// The number of parameters in PostgreSQL must fit in a `u16`.
const BIND_LIMIT: usize = 65535;

/// Page source reading a PostgreSQL table with keyset pagination.
///
/// Rows are decoded with `FromRow`; the record key must be the query's sort key.
pub struct PostgresPageSource<R> {
    pool: Pool<Postgres>,
    query: KeysetQuery,
    _phantom: PhantomData<R>,
}

impl<R> PostgresPageSource<R> {
    pub fn new(pool: Pool<Postgres>, query: KeysetQuery) -> Self {
        Self {
            pool,
            query,
            _phantom: PhantomData,
        }
    }
}

impl<R> PageSource<R> for PostgresPageSource<R>
where
    for<'r> R: FromRow<'r, PgRow> + KeyedRecord<Key = i64> + Send + Unpin,
{
    fn next_page(&self, cursor: Option<i64>, page_size: usize) -> Result<Page<R>, BatchError> {
        let mut query_builder = self.query.page_query::<Postgres>(cursor, page_size);

        let rows = block_on(async {
            query_builder
                .build_query_as::<R>()
                .fetch_all(&self.pool)
                .await
        })?
        .map_err(|err| BatchError::SourceUnavailable(err.to_string()))?;

        Ok(Page::new(rows))
    }
}

/// Multi-row `INSERT` writer for PostgreSQL.
///
/// The writer is also the transaction manager of the step writing with it:
/// while a chunk transaction is open, inserts run on that transaction and
/// become visible only when the chunk commits.
pub struct PostgresItemWriter<'a, O> {
    pool: &'a Pool<Postgres>,
    table: &'a str,
    columns: Vec<&'a str>,
    item_binder: &'a dyn DatabaseItemBinder<O, Postgres>,
    transaction: RefCell<Option<Transaction<'static, Postgres>>>,
}

impl<O> ItemWriter<O> for PostgresItemWriter<'_, O> {
    fn write(&self, items: &[O]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        let mut queries = insert_queries(self.table, &self.columns, items, BIND_LIMIT, self.item_binder);
        let mut transaction = self.transaction.borrow_mut();
        if transaction.is_none() {
            warn!(
                "Writing {} items to {} outside a transaction, {} insert(s) commit on their own",
                items.len(),
                self.table,
                queries.len()
            );
        }

        let result = block_on(async {
            for query_builder in queries.iter_mut() {
                let query = query_builder.build();
                match transaction.as_mut() {
                    Some(tx) => query.execute(&mut **tx).await?,
                    None => query.execute(self.pool).await?,
                };
            }
            Ok::<(), sqlx::Error>(())
        })?;

        result.map_err(|err| BatchError::ItemWriter(err.to_string()))
    }
}

impl<O> PostgresItemWriter<'_, O> {
    /// Whether a chunk transaction is currently open on this writer.
    pub fn in_transaction(&self) -> bool {
        self.transaction.borrow().is_some()
    }
}

impl<O> TransactionManager for PostgresItemWriter<'_, O> {
    fn begin(&self) -> Result<(), BatchError> {
        let transaction = block_on(self.pool.begin())?
            .map_err(|err| BatchError::Transaction(err.to_string()))?;

        if self.transaction.replace(Some(transaction)).is_some() {
            debug!("Replaced a transaction that was still open");
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), BatchError> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| BatchError::Transaction("no open transaction".to_string()))?;

        block_on(transaction.commit())?.map_err(|err| BatchError::Transaction(err.to_string()))
    }

    fn rollback(&self) -> Result<(), BatchError> {
        match self.transaction.take() {
            Some(transaction) => block_on(transaction.rollback())?
                .map_err(|err| BatchError::Transaction(err.to_string())),
            None => Ok(()),
        }
    }
}

/// Builds a [`PostgresItemWriter`].
///
/// The writer only writes atomically per chunk when the step also uses it as
/// its transaction manager (`.writer(&writer).transaction_manager(&writer)`).
/// Otherwise every insert statement commits on its own.
pub struct PostgresItemWriterBuilder<'a, O> {
    pool: Option<&'a Pool<Postgres>>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn DatabaseItemBinder<O, Postgres>>,
}

impl<O> Default for PostgresItemWriterBuilder<'_, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, O> PostgresItemWriterBuilder<'a, O> {
    pub fn new() -> Self {
        Self {
            pool: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
        }
    }

    pub fn pool(mut self, pool: &'a Pool<Postgres>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    /// Adds a column. Columns are bound in the order they are added.
    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn item_binder(mut self, item_binder: &'a dyn DatabaseItemBinder<O, Postgres>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }

    /// # Panics
    ///
    /// Panics if the pool, the table, the columns or the binder are missing.
    pub fn build(self) -> PostgresItemWriter<'a, O> {
        assert!(!self.columns.is_empty(), "One or more columns are required");

        PostgresItemWriter {
            pool: self.pool.expect("Pool is required"),
            table: self.table.expect("Table name is mandatory"),
            columns: self.columns,
            item_binder: self.item_binder.expect("Item binder is required"),
            transaction: RefCell::new(None),
        }
    }
}
