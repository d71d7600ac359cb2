//! Transaction Coordinator
//!
//! Owns the single connection's transaction state and decides when to
//! open, continue, or commit a transaction. Batched writes accumulate in
//! one open transaction that is committed once the pending-operation
//! count reaches the configured commit interval, amortizing per-statement
//! fsync cost over many writes at the expense of an
//! at-most-`commit_interval`-operations durability window on crash.
//!
//! There is no rollback path: a failed statement inside a batch leaves
//! the transaction open with partial effects.

use rusqlite::Connection;
use tracing::{debug, error};

use crate::core::{BatchliteError, Result};

/// Transaction lifecycle state.
///
/// Invariant: `pending_ops == 0` whenever `in_transaction == false`.
/// Mutated only through `TxnCoordinator` methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TransactionState {
    in_transaction: bool,
    pending_ops: u64,
}

#[derive(Debug)]
pub(crate) struct TxnCoordinator {
    state: TransactionState,
    commit_interval: u64,
}

impl TxnCoordinator {
    pub fn new(commit_interval: u64) -> Self {
        TxnCoordinator {
            state: TransactionState::default(),
            commit_interval: commit_interval.max(1),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.state.in_transaction
    }

    pub fn pending_ops(&self) -> u64 {
        self.state.pending_ops
    }

    /// Opens a transaction if none is open (Idle → Open).
    pub fn begin_if_needed(&mut self, conn: &Connection) -> Result<()> {
        if !self.state.in_transaction {
            conn.execute_batch("BEGIN")
                .map_err(|e| execution_error("begin transaction", e))?;
            self.state.in_transaction = true;
            debug!("transaction opened");
        }
        Ok(())
    }

    /// Commits any open transaction so that an immediate
    /// (non-transactional) write cannot be reordered before pending
    /// batched writes.
    pub fn flush_before_immediate(&mut self, conn: &Connection) -> Result<()> {
        if self.state.in_transaction {
            self.commit(conn)?;
        }
        Ok(())
    }

    /// Records `count` executed statements against the open batch.
    pub fn note_executed(&mut self, count: u64) {
        if self.state.in_transaction {
            self.state.pending_ops += count;
        }
    }

    /// Commits when the pending-operation count has reached the commit
    /// interval.
    pub fn autocommit_if_due(&mut self, conn: &Connection) -> Result<()> {
        if self.state.in_transaction && self.state.pending_ops >= self.commit_interval {
            self.commit(conn)?;
        }
        Ok(())
    }

    /// Commits the open transaction and returns the number of operations
    /// committed. A no-op returning `Ok(0)` when no transaction is open.
    ///
    /// On failure the state is left unchanged so the caller may retry.
    pub fn commit(&mut self, conn: &Connection) -> Result<u64> {
        if !self.state.in_transaction {
            return Ok(0);
        }
        match conn.execute_batch("COMMIT") {
            Ok(()) => {
                let committed = self.state.pending_ops;
                debug!("committed {} operations", committed);
                self.state = TransactionState::default();
                Ok(committed)
            }
            Err(e) => {
                error!(
                    "failed to commit {} pending operations: {}",
                    self.state.pending_ops, e
                );
                Err(execution_error("commit", e))
            }
        }
    }
}

/// Logs a driver error with its SQLite result code and wraps it for the
/// caller. The error-check step every execution routes through.
pub(crate) fn execution_error(context: &str, err: rusqlite::Error) -> BatchliteError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(inner, _) => inner.extended_code,
        _ => -1,
    };
    error!("{}: driver error {}: {}", context, code, err);
    BatchliteError::Execution {
        code,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        conn
    }

    #[test]
    fn test_begin_is_lazy_and_idempotent() {
        let conn = test_conn();
        let mut txn = TxnCoordinator::new(100);
        assert!(!txn.in_transaction());

        txn.begin_if_needed(&conn).unwrap();
        assert!(txn.in_transaction());

        // Second call is a no-op rather than a nested BEGIN error.
        txn.begin_if_needed(&conn).unwrap();
        assert!(txn.in_transaction());
    }

    #[test]
    fn test_commit_resets_state() {
        let conn = test_conn();
        let mut txn = TxnCoordinator::new(100);

        txn.begin_if_needed(&conn).unwrap();
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        txn.note_executed(1);
        assert_eq!(txn.pending_ops(), 1);

        assert_eq!(txn.commit(&conn).unwrap(), 1);
        assert!(!txn.in_transaction());
        assert_eq!(txn.pending_ops(), 0);
    }

    #[test]
    fn test_commit_idempotent_when_idle() {
        let conn = test_conn();
        let mut txn = TxnCoordinator::new(100);
        assert_eq!(txn.commit(&conn).unwrap(), 0);
        assert_eq!(txn.commit(&conn).unwrap(), 0);
    }

    #[test]
    fn test_note_executed_outside_transaction_does_not_count() {
        let conn = test_conn();
        let mut txn = TxnCoordinator::new(100);
        txn.note_executed(5);
        assert_eq!(txn.pending_ops(), 0);
        drop(conn);
    }

    #[test]
    fn test_autocommit_at_interval() {
        let conn = test_conn();
        let mut txn = TxnCoordinator::new(3);

        txn.begin_if_needed(&conn).unwrap();
        for i in 0..3 {
            conn.execute("INSERT INTO t VALUES (?1)", [i]).unwrap();
            txn.note_executed(1);
        }
        assert_eq!(txn.pending_ops(), 3);
        txn.autocommit_if_due(&conn).unwrap();
        assert!(!txn.in_transaction());
        assert_eq!(txn.pending_ops(), 0);
    }

    #[test]
    fn test_flush_before_immediate() {
        let conn = test_conn();
        let mut txn = TxnCoordinator::new(100);

        txn.begin_if_needed(&conn).unwrap();
        conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
        txn.note_executed(1);

        txn.flush_before_immediate(&conn).unwrap();
        assert!(!txn.in_transaction());

        // Nothing open: flush is a no-op.
        txn.flush_before_immediate(&conn).unwrap();
    }
}
