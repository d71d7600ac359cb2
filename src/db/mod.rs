/// Database Module
///
/// This module provides the transactional SQL execution layer over a
/// single embedded SQLite database, organized into focused submodules:
///
/// - **Transaction Coordinator** (`transaction.rs`): owns the
///   connection's transaction state and the accumulated-operation
///   commit threshold
/// - **Statement Cache** (`statements.rs`): logical names mapped to
///   generated statement templates
/// - **Query Builder** (`builder.rs`): pure SQL assembly and request
///   criteria translation
/// - **Record Retrieval** (`retrieve.rs`): read operations shaping rows
///   into ordered or keyed mappings
///
/// All operations use the standardized `BatchliteError` type. A
/// `Database` owns exactly one connection and provides no internal
/// locking; callers using it from multiple threads must serialize access
/// externally.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{Connection, ToSql};
use tracing::{debug, error, info};

use crate::config::{BatchErrorPolicy, DatabaseConfig};
use crate::core::{BatchliteError, Result};

pub mod builder;
mod retrieve;
pub mod row;
mod statements;
mod transaction;

pub use retrieve::{GroupQuery, ListItem, RecordGroup};
pub use row::Record;
pub use statements::{statement_name, StatementEntry, StatementKind};

use statements::StatementCache;
use transaction::{execution_error, TxnCoordinator};

/// Result of executing an ordered batch of statements.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Sum of affected-row counts over the successful statements.
    pub rows_affected: usize,
    /// Last-insert-id captured after each successful statement, in
    /// execution order. Meaningful for INSERT statements.
    pub insert_ids: Vec<i64>,
    /// Per-statement failures recorded under
    /// `BatchErrorPolicy::ContinueOnError`.
    pub failures: Vec<BatchFailure>,
}

/// A single failed statement inside a batch.
#[derive(Debug)]
pub struct BatchFailure {
    /// Index of the statement within the submitted batch.
    pub index: usize,
    pub error: BatchliteError,
}

/// Result of executing a single statement.
#[derive(Debug, Clone, Copy)]
pub struct StatementOutcome {
    pub rows_affected: usize,
    /// Rowid of the most recent successful INSERT on this connection.
    pub last_insert_id: i64,
}

/// A level of abstraction for managing an embedded SQLite database:
/// batched writes, cached statement templates, and generic
/// insert/update/select/delete operations.
#[derive(Debug)]
pub struct Database {
    pub(crate) conn: Connection,
    path: PathBuf,
    cache: StatementCache,
    txn: TxnCoordinator,
    batch_error_policy: BatchErrorPolicy,
}

impl Database {
    /// Opens the database described by `config`.
    ///
    /// Runs the bootstrap script first when one is configured (this may
    /// create the database file), then opens the main connection and
    /// applies the journal/synchronous pragmas. A missing database file
    /// or open failure is fatal for the instance.
    pub fn open(config: &DatabaseConfig) -> Result<Database> {
        if let Some(script) = &config.init_script {
            run_init_script(&config.path, script, config.page_size)?;
        }

        let in_memory = config.path == Path::new(":memory:");
        if !in_memory && !config.path.exists() {
            error!("cannot find file: {}", config.path.display());
            return Err(BatchliteError::Connection(format!(
                "cannot find file: {}",
                config.path.display()
            )));
        }

        let conn = Connection::open(&config.path).map_err(|e| {
            error!("failed to open {}: {}", config.path.display(), e);
            BatchliteError::Connection(format!(
                "failed to open {}: {e}",
                config.path.display()
            ))
        })?;
        conn.busy_timeout(Duration::from_secs(1))?;

        if !config.enable_journal {
            conn.execute_batch("PRAGMA journal_mode = OFF;")?;
            debug!("journaling off");
        }
        if !config.enable_synchronous {
            conn.execute_batch("PRAGMA synchronous = OFF;")?;
            debug!("synchronous off");
        }
        debug!("opened database {}", config.path.display());

        Ok(Database {
            conn,
            path: config.path.clone(),
            cache: StatementCache::new(),
            txn: TxnCoordinator::new(config.commit_interval),
            batch_error_policy: config.batch_error_policy,
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.in_transaction()
    }

    /// Write operations executed since the last commit.
    pub fn pending_ops(&self) -> u64 {
        self.txn.pending_ops()
    }

    /// Quotes a scalar as a SQL string literal.
    pub fn quote(&self, text: &str) -> String {
        builder::quote(text)
    }

    /// Sets the SQLite page-cache size (`PRAGMA cache_size`).
    pub fn set_cache_size(&self, pages: i64) -> Result<()> {
        self.conn
            .execute_batch(&format!("PRAGMA cache_size = {pages}"))?;
        Ok(())
    }

    /// Bounds the driver-side cache of compiled statement handles.
    pub fn set_statement_cache_capacity(&self, capacity: usize) {
        self.conn.set_prepared_statement_cache_capacity(capacity);
    }

    /// Installs the `REGEX_MATCH(text, pattern)` scalar SQL function,
    /// returning the first match of `pattern` in `text` or NULL.
    pub fn register_regexp_match(&self) -> Result<()> {
        self.conn
            .create_scalar_function(
                "REGEX_MATCH",
                2,
                FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
                |ctx| {
                    let text: String = ctx.get(0)?;
                    let pattern: String = ctx.get(1)?;
                    let re = regex::Regex::new(&pattern)
                        .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
                    Ok(re.find(&text).map(|m| m.as_str().to_string()))
                },
            )
            .map_err(BatchliteError::Database)
    }

    /// Compiles and registers a named statement with its ordered
    /// parameter list, silently overwriting any statement already
    /// registered under `name`.
    pub fn prepare(&mut self, name: &str, sql: &str, parameters: Vec<String>) -> Result<()> {
        // Compile once to validate and warm the driver's handle cache.
        self.conn
            .prepare_cached(sql)
            .map_err(|e| execution_error("prepare", e))?;
        self.cache.insert(name, sql.to_string(), parameters);
        Ok(())
    }

    /// Executes a single SQL statement, batching it into the open
    /// transaction when `use_transaction` is set. Returns the
    /// affected-row count.
    ///
    /// With `use_transaction = false` any pending batch is committed
    /// first so program-order durability is preserved.
    pub fn execute_one(&mut self, sql: &str, use_transaction: bool) -> Result<usize> {
        self.route_transaction(use_transaction)?;
        let affected = self
            .conn
            .execute(sql, [])
            .map_err(|e| execution_error("execute_one", e))?;
        self.txn.note_executed(1);
        if use_transaction {
            self.txn.autocommit_if_due(&self.conn)?;
        }
        Ok(affected)
    }

    /// Executes an ordered sequence of statements, collecting affected
    /// rows and per-statement insert ids.
    ///
    /// A failing statement is handled per the configured
    /// `BatchErrorPolicy`: recorded in the outcome and skipped, or
    /// surfaced immediately. Either way the statements already executed
    /// remain in the open transaction.
    pub fn execute_batch<S: AsRef<str>>(
        &mut self,
        statements: &[S],
        use_transaction: bool,
    ) -> Result<BatchOutcome> {
        self.route_transaction(use_transaction)?;
        let mut outcome = BatchOutcome::default();
        let mut executed: u64 = 0;

        for (index, statement) in statements.iter().enumerate() {
            match self.conn.execute(statement.as_ref(), []) {
                Ok(affected) => {
                    outcome.rows_affected += affected;
                    outcome.insert_ids.push(self.conn.last_insert_rowid());
                    executed += 1;
                }
                Err(e) => {
                    let error = execution_error("batch statement", e);
                    match self.batch_error_policy {
                        BatchErrorPolicy::ContinueOnError => {
                            outcome.failures.push(BatchFailure { index, error });
                        }
                        BatchErrorPolicy::AbortOnFirstError => {
                            self.txn.note_executed(executed);
                            return Err(error);
                        }
                    }
                }
            }
        }

        self.txn.note_executed(executed);
        if use_transaction {
            self.txn.autocommit_if_due(&self.conn)?;
        }
        Ok(outcome)
    }

    /// Executes a file of semicolon-separated statements,
    /// non-transactionally (any pending batch commits first).
    pub fn execute_sql_file<P: AsRef<Path>>(&mut self, path: P) -> Result<BatchOutcome> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            error!("cannot find file: {}", path.display());
            BatchliteError::Io(e)
        })?;
        let statements: Vec<&str> = text
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        self.execute_batch(&statements, false)
    }

    /// Executes a registered statement, binding its parameter list by
    /// name from `values`. Parameters missing from `values` bind as
    /// NULL.
    pub fn execute_statement(
        &mut self,
        name: &str,
        values: &Record,
        use_transaction: bool,
    ) -> Result<StatementOutcome> {
        let entry = match self.cache.get(name) {
            Some(entry) => entry.clone(),
            None => {
                error!("cannot find statement: {}", name);
                return Err(BatchliteError::StatementNotFound(name.to_string()));
            }
        };
        self.execute_named(&entry.sql, &entry.parameters, values, use_transaction)
    }

    /// Deletes all rows from each named table, then forces a commit.
    pub fn empty_tables<S: AsRef<str>>(&mut self, tables: &[S]) -> Result<Vec<(String, usize)>> {
        let mut results = Vec::with_capacity(tables.len());
        for table in tables {
            let table = table.as_ref();
            info!("empty {}", table);
            let affected = self.execute_one(&format!("DELETE FROM {table}"), true)?;
            results.push((table.to_string(), affected));
        }
        self.commit()?;
        Ok(results)
    }

    /// Vacuums the database. Any pending batch commits first since
    /// VACUUM cannot run inside a transaction.
    pub fn vacuum(&mut self) -> Result<()> {
        info!("vacuum database");
        self.execute_one("VACUUM", false)?;
        Ok(())
    }

    /// Inserts a record built from the mapping's keys, binding every
    /// value as a named parameter. Returns the insert id.
    pub fn insert_values(
        &mut self,
        table: &str,
        data: &Record,
        use_transaction: bool,
    ) -> Result<i64> {
        let mut columns: Vec<String> = data.keys().cloned().collect();
        // Map order is arbitrary; stable SQL keeps the driver handle
        // cache warm across calls.
        columns.sort();
        let (sql, parameters) = builder::build_insert(table, &columns, false);
        Ok(self
            .execute_named(&sql, &parameters, data, use_transaction)?
            .last_insert_id)
    }

    /// Generates and caches the INSERT template for `table`. Subsequent
    /// calls for the same table are no-ops; callers changing the column
    /// set must account for the cached template.
    pub fn prepare_insert<S: AsRef<str>>(
        &mut self,
        table: &str,
        columns: &[S],
        replace: bool,
    ) -> Result<()> {
        let name = statement_name(table, StatementKind::Insert);
        if self.cache.contains(&name) {
            return Ok(());
        }
        info!("adding statement: INSERT {}", table);
        let (sql, parameters) = builder::build_insert(table, columns, replace);
        self.prepare(&name, &sql, parameters)
    }

    /// Generates and caches the UPDATE template for `table`, keyed on
    /// `id_column`. Subsequent calls for the same table are no-ops.
    pub fn prepare_update<S: AsRef<str>>(
        &mut self,
        table: &str,
        columns: &[S],
        id_column: &str,
    ) -> Result<()> {
        let name = statement_name(table, StatementKind::Update);
        if self.cache.contains(&name) {
            return Ok(());
        }
        info!("adding statement: UPDATE {}", table);
        let (sql, parameters) = builder::build_update(table, columns, id_column);
        self.prepare(&name, &sql, parameters)
    }

    /// Whether a generated template of the given kind exists for `table`.
    pub fn is_prepared(&self, table: &str, kind: StatementKind) -> bool {
        self.cache.contains(&statement_name(table, kind))
    }

    /// Inserts through the cached INSERT template; declared columns
    /// missing from `data` bind as NULL. Returns the insert id.
    pub fn insert_prepared(
        &mut self,
        table: &str,
        data: &Record,
        use_transaction: bool,
    ) -> Result<i64> {
        let name = statement_name(table, StatementKind::Insert);
        Ok(self
            .execute_statement(&name, data, use_transaction)?
            .last_insert_id)
    }

    /// Updates through the cached UPDATE template; declared columns
    /// missing from `data` bind as NULL. Returns the affected-row count.
    pub fn update_prepared(
        &mut self,
        table: &str,
        data: &Record,
        use_transaction: bool,
    ) -> Result<usize> {
        let name = statement_name(table, StatementKind::Update);
        Ok(self
            .execute_statement(&name, data, use_transaction)?
            .rows_affected)
    }

    /// Sets one column for the rows matching `key_column = key`. Both
    /// scalars are bound as parameters.
    pub fn set_key_value<K: ToSql, V: ToSql>(
        &mut self,
        table: &str,
        key_column: &str,
        key: K,
        value_column: &str,
        value: V,
    ) -> Result<usize> {
        self.route_transaction(true)?;
        let sql = format!("UPDATE {table} SET {value_column} = ?1 WHERE {key_column} = ?2");
        let affected = self
            .conn
            .execute(&sql, rusqlite::params![value, key])
            .map_err(|e| execution_error("set_key_value", e))?;
        self.txn.note_executed(1);
        self.txn.autocommit_if_due(&self.conn)?;
        Ok(affected)
    }

    /// Updates the record matching `id_column = id` with the supplied
    /// column/value mapping, all values bound as parameters. Executed
    /// immediately (pending batch commits first).
    pub fn update_key_values(
        &mut self,
        table: &str,
        key_values: &Record,
        id_column: &str,
        id: &Value,
        extra_where: Option<&str>,
    ) -> Result<usize> {
        let mut columns: Vec<&String> = key_values.keys().collect();
        columns.sort();
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 1))
            .collect();
        let mut sql = format!(
            "UPDATE {table} SET {} WHERE {id_column} = ?{}",
            assignments.join(","),
            columns.len() + 1
        );
        if let Some(clause) = extra_where {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        debug!("sql = {}", sql);

        self.route_transaction(false)?;
        let mut params: Vec<&dyn ToSql> = columns
            .iter()
            .map(|c| &key_values[*c] as &dyn ToSql)
            .collect();
        params.push(id as &dyn ToSql);
        let affected = self
            .conn
            .execute(&sql, params.as_slice())
            .map_err(|e| execution_error("update_key_values", e))?;
        Ok(affected)
    }

    /// Deletes the rows matching `id_column = id_value`, with the id
    /// bound as a parameter. Executed immediately (pending batch commits
    /// first).
    pub fn delete_records<K: ToSql>(
        &mut self,
        table: &str,
        id_column: &str,
        id_value: K,
        extra_where: Option<&str>,
    ) -> Result<usize> {
        let mut sql = format!("DELETE FROM {table} WHERE {id_column} = ?1");
        if let Some(clause) = extra_where {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        self.route_transaction(false)?;
        let affected = self
            .conn
            .execute(&sql, rusqlite::params![id_value])
            .map_err(|e| execution_error("delete_records", e))?;
        Ok(affected)
    }

    /// Commits the open transaction, returning the number of operations
    /// committed; a no-op returning `Ok(0)` when nothing is open.
    pub fn commit(&mut self) -> Result<u64> {
        self.txn.commit(&self.conn)
    }

    /// Opens or flushes the transaction according to the call's batching
    /// mode.
    fn route_transaction(&mut self, use_transaction: bool) -> Result<()> {
        if use_transaction {
            self.txn.begin_if_needed(&self.conn)
        } else {
            self.txn.flush_before_immediate(&self.conn)
        }
    }

    /// Executes SQL with named placeholders, binding `parameters` in
    /// order from `values`; missing keys bind as NULL.
    fn execute_named(
        &mut self,
        sql: &str,
        parameters: &[String],
        values: &Record,
        use_transaction: bool,
    ) -> Result<StatementOutcome> {
        self.route_transaction(use_transaction)?;
        let bound: Vec<(String, Value)> = parameters
            .iter()
            .map(|p| {
                (
                    format!(":{p}"),
                    values.get(p).cloned().unwrap_or(Value::Null),
                )
            })
            .collect();
        let params: Vec<(&str, &dyn ToSql)> = bound
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();

        let rows_affected = {
            let mut stmt = self
                .conn
                .prepare_cached(sql)
                .map_err(|e| execution_error("prepare", e))?;
            stmt.execute(params.as_slice())
                .map_err(|e| execution_error("execute", e))?
        };
        let last_insert_id = self.conn.last_insert_rowid();

        self.txn.note_executed(1);
        if use_transaction {
            self.txn.autocommit_if_due(&self.conn)?;
        }
        Ok(StatementOutcome {
            rows_affected,
            last_insert_id,
        })
    }
}

impl Drop for Database {
    /// Best-effort durability on shutdown: commit any open transaction;
    /// never roll back implicitly.
    fn drop(&mut self) {
        if self.txn.in_transaction() {
            if let Err(e) = self.txn.commit(&self.conn) {
                error!("commit on teardown failed: {}", e);
            }
        }
    }
}

/// Executes the bootstrap script on a short-lived connection, with the
/// optional page-size pragma prepended. This path may create the
/// database file.
fn run_init_script(db_path: &Path, script: &Path, page_size: Option<u32>) -> Result<()> {
    let text = fs::read_to_string(script).map_err(|e| {
        error!("cannot find initialise script: {}", script.display());
        BatchliteError::Initialization(format!(
            "cannot find initialise script {}: {e}",
            script.display()
        ))
    })?;

    let mut statements: Vec<String> = Vec::new();
    if let Some(size) = page_size {
        statements.push(format!("PRAGMA page_size = {size}"));
    }
    statements.extend(
        text.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
    );

    let bootstrap = Connection::open(db_path).map_err(|e| {
        error!("bootstrap open failed for {}: {}", db_path.display(), e);
        BatchliteError::Initialization(format!(
            "bootstrap open failed for {}: {e}",
            db_path.display()
        ))
    })?;
    for statement in &statements {
        bootstrap.execute_batch(statement).map_err(|e| {
            error!("bootstrap statement failed: {}: {}", statement, e);
            BatchliteError::Initialization(format!("bootstrap statement failed: {e}"))
        })?;
    }
    Ok(())
}
