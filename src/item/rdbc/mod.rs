use sqlx::{query_builder::Separated, Database, Encode, QueryBuilder, Type};

#[cfg(feature = "rdbc-postgres")]
/// PostgreSQL page source and transactional writer.
pub mod postgres;

#[cfg(feature = "rdbc-sqlite")]
/// SQLite page source and transactional writer.
pub mod sqlite;

/// Keyset pagination query over a table with a unique integer key.
///
/// Renders, with bound parameters:
///
/// ```sql
/// SELECT <select> FROM <from> [WHERE <where> AND <key> > $1] ORDER BY <key> ASC LIMIT $2
/// ```
///
/// The key predicate is left out for the first page.
///
/// # Examples
///
/// ```
/// use chunk_batch::item::rdbc::KeysetQuery;
/// use sqlx::{QueryBuilder, Sqlite};
///
/// let query = KeysetQuery::new("id, name", "users", "id");
/// let builder: QueryBuilder<Sqlite> = query.page_query(Some(100), 50);
///
/// assert_eq!(
///     builder.sql(),
///     "SELECT id, name FROM users WHERE id > ? ORDER BY id ASC LIMIT ?"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysetQuery {
    select_clause: String,
    from_clause: String,
    where_clause: Option<String>,
    sort_key: String,
}

impl KeysetQuery {
    pub fn new(select_clause: &str, from_clause: &str, sort_key: &str) -> Self {
        Self {
            select_clause: select_clause.to_string(),
            from_clause: from_clause.to_string(),
            where_clause: None,
            sort_key: sort_key.to_string(),
        }
    }

    /// Adds a filter applied to every page, combined with the key predicate.
    pub fn where_clause(mut self, where_clause: &str) -> Self {
        self.where_clause = Some(where_clause.to_string());
        self
    }

    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }

    /// Builds the query of the page following `cursor`.
    pub fn page_query<'args, DB>(&self, cursor: Option<i64>, page_size: usize) -> QueryBuilder<'args, DB>
    where
        DB: Database,
        i64: Encode<'args, DB> + Type<DB>,
    {
        let mut query_builder = QueryBuilder::new("SELECT ");
        query_builder.push(&self.select_clause);
        query_builder.push(" FROM ");
        query_builder.push(&self.from_clause);

        match (&self.where_clause, cursor) {
            (Some(filter), Some(cursor)) => {
                query_builder.push(" WHERE (");
                query_builder.push(filter);
                query_builder.push(") AND ");
                query_builder.push(&self.sort_key);
                query_builder.push(" > ");
                query_builder.push_bind(cursor);
            }
            (Some(filter), None) => {
                query_builder.push(" WHERE ");
                query_builder.push(filter);
            }
            (None, Some(cursor)) => {
                query_builder.push(" WHERE ");
                query_builder.push(&self.sort_key);
                query_builder.push(" > ");
                query_builder.push_bind(cursor);
            }
            (None, None) => {}
        }

        query_builder.push(" ORDER BY ");
        query_builder.push(&self.sort_key);
        query_builder.push(" ASC LIMIT ");
        query_builder.push_bind(i64::try_from(page_size).unwrap_or(i64::MAX));

        query_builder
    }
}

/// Trait for binding item data to database query parameters.
///
/// Writers call it once per item while building a multi-row `INSERT`, in the
/// order of the columns they were given.
///
/// # Examples
///
/// ```
/// use chunk_batch::item::rdbc::DatabaseItemBinder;
/// use sqlx::{query_builder::Separated, Sqlite};
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// struct UserBinder;
///
/// impl DatabaseItemBinder<User, Sqlite> for UserBinder {
///     fn bind(&self, item: &User, mut query_builder: Separated<Sqlite, &str>) {
///         query_builder.push_bind(item.id);
///         query_builder.push_bind(item.name.clone());
///     }
/// }
/// ```
pub trait DatabaseItemBinder<O, DB: Database> {
    fn bind(&self, item: &O, query_builder: Separated<DB, &str>);
}

/// Builds one multi-row `INSERT` statement per group of items small enough to
/// stay under `bind_limit` parameters.
pub(crate) fn insert_queries<'args, O, DB>(
    table: &str,
    columns: &[&str],
    items: &'args [O],
    bind_limit: usize,
    item_binder: &dyn DatabaseItemBinder<O, DB>,
) -> Vec<QueryBuilder<'args, DB>>
where
    DB: Database,
{
    let rows_per_query = (bind_limit / columns.len().max(1)).max(1);

    items
        .chunks(rows_per_query)
        .map(|rows| {
            let mut query_builder = QueryBuilder::new("INSERT INTO ");
            query_builder.push(table);
            query_builder.push(" (");
            query_builder.push(columns.join(","));
            query_builder.push(") ");
            query_builder.push_values(rows, |b, item| {
                item_binder.bind(item, b);
            });
            query_builder
        })
        .collect()
}

#[cfg(all(test, feature = "rdbc-sqlite"))]
mod tests {
    use sqlx::Sqlite;

    use super::*;

    #[derive(Debug, Clone)]
    struct Pair(i64, String);

    struct PairBinder;

    impl DatabaseItemBinder<Pair, Sqlite> for PairBinder {
        fn bind(&self, item: &Pair, mut query_builder: Separated<Sqlite, &str>) {
            query_builder.push_bind(item.0);
            query_builder.push_bind(item.1.clone());
        }
    }

    #[test]
    fn first_page_has_no_key_predicate() {
        let query = KeysetQuery::new("id, name", "person", "id");

        let builder: QueryBuilder<Sqlite> = query.page_query(None, 10);

        assert_eq!(builder.sql(), "SELECT id, name FROM person ORDER BY id ASC LIMIT ?");
    }

    #[test]
    fn following_pages_start_after_the_cursor() {
        let query = KeysetQuery::new("id, name", "person", "id");

        let builder: QueryBuilder<Sqlite> = query.page_query(Some(42), 10);

        assert_eq!(
            builder.sql(),
            "SELECT id, name FROM person WHERE id > ? ORDER BY id ASC LIMIT ?"
        );
    }

    #[test]
    fn combines_the_filter_with_the_key_predicate() {
        let query = KeysetQuery::new("id", "person", "id").where_clause("age > 18 OR age IS NULL");

        let first: QueryBuilder<Sqlite> = query.page_query(None, 5);
        let next: QueryBuilder<Sqlite> = query.page_query(Some(7), 5);

        assert_eq!(
            first.sql(),
            "SELECT id FROM person WHERE age > 18 OR age IS NULL ORDER BY id ASC LIMIT ?"
        );
        assert_eq!(
            next.sql(),
            "SELECT id FROM person WHERE (age > 18 OR age IS NULL) AND id > ? ORDER BY id ASC LIMIT ?"
        );
    }

    #[test]
    fn splits_inserts_to_respect_the_bind_limit() {
        let items: Vec<Pair> = (0..5).map(|i| Pair(i, format!("n{}", i))).collect();

        let queries = insert_queries("pairs", &["id", "name"], &items, 4, &PairBinder);

        assert_eq!(queries.len(), 3);
        assert_eq!(
            queries[0].sql(),
            "INSERT INTO pairs (id,name) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(queries[2].sql(), "INSERT INTO pairs (id,name) VALUES (?, ?)");
    }
}
