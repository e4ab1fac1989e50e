//! Input store adapter (component A).
//!
//! Backed by `rusqlite` with the bundled SQLite engine. Reads `branch_call`,
//! `call_graph`, and `call_statistic`; writes `condition_equivalence`,
//! `function_similarity`, and `function_action`. All queries are
//! parameterized: the upstream miner's string-interpolated SQL was a
//! correctness bug in the source, not a design requirement to reproduce.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::action::CallGraphLookup;
use crate::catalog::ReturnCatalog;
use crate::error::StoreError;
use crate::model::{CallSite, ClassifiedSite, FunctionKey};

/// Owns the SQLite connection and the call-graph-callee cache used by the
/// action/similarity BFS passes.
pub struct Store {
    conn: Connection,
    /// `(name, def_loc) -> callees`, memoized for the run's duration — the
    /// graph is read-only once loaded, so this is a pure optimization, not
    /// a semantic change.
    callee_cache: RefCell<HashMap<FunctionKey, Vec<FunctionKey>>>,
}

impl Store {
    /// Open (or create) the SQLite file at `path`, ensuring every input and
    /// output table and its indices exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            callee_cache: RefCell::new(HashMap::new()),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and the integration suite.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            callee_cache: RefCell::new(HashMap::new()),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS branch_call (
                id INTEGER PRIMARY KEY,
                branch_id INTEGER NOT NULL,
                domain TEXT NOT NULL,
                project TEXT NOT NULL,
                call_name TEXT NOT NULL,
                call_def_loc TEXT NOT NULL,
                call_id TEXT NOT NULL,
                call_str TEXT NOT NULL,
                call_ret TEXT NOT NULL,
                call_arg TEXT NOT NULL,
                call_arg_count INTEGER NOT NULL,
                expr_tokens TEXT NOT NULL,
                expr_tokens_count INTEGER NOT NULL,
                path_number_vec TEXT NOT NULL,
                log_name TEXT NOT NULL,
                log_def_loc TEXT NOT NULL,
                log_id TEXT NOT NULL,
                log_str TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_branch_call_callee
                ON branch_call (call_name, call_def_loc);

            CREATE TABLE IF NOT EXISTS call_statistic (
                call_name TEXT NOT NULL,
                call_def_loc TEXT NOT NULL,
                project TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_call_statistic_callee
                ON call_statistic (call_name, call_def_loc);

            CREATE TABLE IF NOT EXISTS call_graph (
                func_name TEXT NOT NULL,
                func_def_loc TEXT NOT NULL,
                call_name TEXT NOT NULL,
                call_def_loc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_call_graph_caller
                ON call_graph (func_name, func_def_loc);

            CREATE TABLE IF NOT EXISTS function_call (
                call_name TEXT NOT NULL,
                call_def_loc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_function_call_callee
                ON function_call (call_name, call_def_loc);

            CREATE TABLE IF NOT EXISTS return_catalog (
                domain TEXT NOT NULL,
                call_name TEXT NOT NULL,
                call_def_loc TEXT NOT NULL,
                return_type TEXT NOT NULL,
                normal_query TEXT NOT NULL,
                error_query TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS condition_equivalence (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                branch_id INTEGER NOT NULL,
                domain TEXT NOT NULL,
                project TEXT NOT NULL,
                call_name TEXT NOT NULL,
                call_def_loc TEXT NOT NULL,
                call_id TEXT NOT NULL,
                call_str TEXT NOT NULL,
                call_return TEXT NOT NULL,
                expr_set_id INTEGER NOT NULL,
                path_intention TEXT NOT NULL,
                expr_str_vec TEXT NOT NULL,
                path_number_vec TEXT NOT NULL,
                log_name TEXT NOT NULL,
                log_def_loc TEXT NOT NULL,
                log_id TEXT NOT NULL,
                log_str TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS function_similarity (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_name TEXT NOT NULL,
                log_def_loc TEXT NOT NULL,
                intention TEXT NOT NULL,
                weight REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS function_action (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                log_name TEXT NOT NULL,
                log_def_loc TEXT NOT NULL,
                intention TEXT NOT NULL,
                trace TEXT NOT NULL,
                level INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Drop and recreate one output table. Output
    /// tables are dropped-and-recreated at the start of each phase so a
    /// crash mid-phase simply re-triggers the same reset on the next run.
    pub fn reset_output_table(&self, table: &str) -> Result<(), StoreError> {
        match table {
            "condition_equivalence" => {
                self.conn.execute_batch("DROP TABLE IF EXISTS condition_equivalence;")?;
            }
            "function_similarity" => {
                self.conn.execute_batch("DROP TABLE IF EXISTS function_similarity;")?;
            }
            "function_action" => {
                self.conn.execute_batch("DROP TABLE IF EXISTS function_action;")?;
            }
            other => {
                return Err(StoreError::MalformedRow {
                    table: "<reset>",
                    reason: format!("unknown output table `{other}`"),
                })
            }
        }
        self.ensure_schema()
    }

    /// Load the return-semantics catalog into the `return_catalog` table as
    /// a replaceable table.
    pub fn load_catalog_table(&mut self, catalog: &ReturnCatalog) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM return_catalog", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO return_catalog
                    (domain, call_name, call_def_loc, return_type, normal_query, error_query)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in catalog.entries() {
                stmt.execute(params![
                    entry.domain,
                    entry.call_name,
                    entry.call_def_loc,
                    entry.return_type.to_string(),
                    entry.normal_query,
                    entry.error_query,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Enumerate target functions: those with at least `min_project`
    /// distinct projects in `call_statistic`.
    pub fn target_functions(&self, min_project: u32) -> Result<Vec<FunctionKey>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT call_name, call_def_loc
             FROM call_statistic
             GROUP BY call_name, call_def_loc
             HAVING COUNT(DISTINCT project) >= ?1
             ORDER BY call_name, call_def_loc",
        )?;
        let rows = stmt
            .query_map(params![min_project], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<FunctionKey>>>()?;
        Ok(rows)
    }

    /// Fetch every call site of `(call_name, call_def_loc)` whose
    /// `log_name` has already been classified by the action pass: the only
    /// filter applied is `log_name ∈ set(function_action.log_name)`, so the
    /// action classifier must run first.
    pub fn call_sites_for_target(
        &self,
        call_name: &str,
        call_def_loc: &str,
    ) -> Result<Vec<CallSite>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, branch_id, domain, project, call_name, call_def_loc, call_id,
                    call_str, call_ret, call_arg, call_arg_count, expr_tokens,
                    expr_tokens_count, path_number_vec, log_name, log_def_loc, log_id, log_str
             FROM branch_call
             WHERE call_name = ?1 AND call_def_loc = ?2
               AND log_name IN (SELECT DISTINCT log_name FROM function_action)
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![call_name, call_def_loc], row_to_call_site)?
            .collect::<rusqlite::Result<Vec<CallSite>>>()?;
        Ok(rows)
    }

    /// Every distinct `(log_name, log_def_loc)` pair appearing in
    /// `branch_call`, the action classifier's enumeration root.
    pub fn distinct_log_functions(&self) -> Result<Vec<FunctionKey>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT log_name, log_def_loc FROM branch_call ORDER BY log_name, log_def_loc")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<FunctionKey>>>()?;
        Ok(rows)
    }

    /// Every distinct `(log_name, log_def_loc)` pair that appears in at
    /// least one non-orphan `condition_equivalence` row, the similarity
    /// scorer's enumeration root. Narrower than
    /// [`Store::distinct_log_functions`]: a log function whose every call
    /// site ended up an orphan is not scored.
    pub fn logs_with_nonzero_equivalence(&self) -> Result<Vec<FunctionKey>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT log_name, log_def_loc FROM condition_equivalence
             WHERE expr_set_id != 0
             ORDER BY log_name, log_def_loc",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<FunctionKey>>>()?;
        Ok(rows)
    }

    /// Write one `condition_equivalence` row. Commits per insert, matching
    /// the durable-incremental-progress requirement.
    pub fn insert_condition_equivalence(&self, site: &ClassifiedSite) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO condition_equivalence
                (branch_id, domain, project, call_name, call_def_loc, call_id, call_str,
                 call_return, expr_set_id, path_intention, expr_str_vec, path_number_vec,
                 log_name, log_def_loc, log_id, log_str)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                site.site.branch_id,
                site.site.domain,
                site.site.project,
                site.site.call_name,
                site.site.call_def_loc,
                site.site.call_id,
                site.site.call_str,
                site.site.call_ret,
                site.expr_set_id,
                site.intention.to_string(),
                site.site.expr_tokens,
                site.site.path_number_vec,
                site.site.log_name,
                site.site.log_def_loc,
                site.site.log_id,
                site.site.log_str,
            ],
        )?;
        Ok(())
    }

    /// Write one `function_action` row.
    pub fn insert_function_action(&self, record: &crate::model::ActionRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO function_action (log_name, log_def_loc, intention, trace, level)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record.log.0, record.log.1, record.intention.to_string(), record.trace, record.level],
        )?;
        Ok(())
    }

    /// Write one `function_similarity` row.
    pub fn insert_function_similarity(&self, record: &crate::model::SimilarityRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO function_similarity (log_name, log_def_loc, intention, weight)
             VALUES (?1, ?2, ?3, ?4)",
            params![record.log.0, record.log.1, record.intention, record.weight],
        )?;
        Ok(())
    }

    /// Number of rows currently in `table`, for progress logging and tests.
    pub fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        let allowed = [
            "branch_call",
            "call_graph",
            "call_statistic",
            "condition_equivalence",
            "function_similarity",
            "function_action",
        ];
        if !allowed.contains(&table) {
            return Err(StoreError::MalformedRow {
                table: "<row_count>",
                reason: format!("unknown table `{table}`"),
            });
        }
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
        info!(table, count, "row count");
        Ok(count)
    }
}

fn row_to_call_site(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallSite> {
    Ok(CallSite {
        id: row.get(0)?,
        branch_id: row.get(1)?,
        domain: row.get(2)?,
        project: row.get(3)?,
        call_name: row.get(4)?,
        call_def_loc: row.get(5)?,
        call_id: row.get(6)?,
        call_str: row.get(7)?,
        call_ret: row.get(8)?,
        call_arg: row.get(9)?,
        call_arg_count: row.get(10)?,
        expr_tokens: row.get(11)?,
        expr_tokens_count: row.get(12)?,
        path_number_vec: row.get(13)?,
        log_name: row.get(14)?,
        log_def_loc: row.get(15)?,
        log_id: row.get(16)?,
        log_str: row.get(17)?,
    })
}

impl CallGraphLookup for Store {
    fn callees(&self, name: &str, def_loc: &str) -> Vec<FunctionKey> {
        let key = (name.to_string(), def_loc.to_string());
        if let Some(cached) = self.callee_cache.borrow().get(&key) {
            return cached.clone();
        }
        let result = (|| -> rusqlite::Result<Vec<FunctionKey>> {
            let mut stmt = self.conn.prepare(
                "SELECT DISTINCT call_name, call_def_loc FROM call_graph
                 WHERE func_name = ?1 AND func_def_loc = ?2",
            )?;
            stmt.query_map(params![name, def_loc], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect()
        })()
        .unwrap_or_default();
        self.callee_cache.borrow_mut().insert(key, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let store = Store::open_in_memory().unwrap();
        for table in [
            "branch_call",
            "call_graph",
            "call_statistic",
            "function_call",
            "condition_equivalence",
            "function_similarity",
            "function_action",
        ] {
            assert_eq!(store.row_count(table).unwrap(), 0);
        }
    }

    #[test]
    fn reset_output_table_drops_and_recreates() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO function_action (log_name, log_def_loc, intention, trace, level)
                 VALUES ('f', 'loc', 'exit', 'f', 1)",
                [],
            )
            .unwrap();
        assert_eq!(store.row_count("function_action").unwrap(), 1);
        store.reset_output_table("function_action").unwrap();
        assert_eq!(store.row_count("function_action").unwrap(), 0);
    }

    #[test]
    fn target_functions_honors_min_project() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(
                "INSERT INTO call_statistic VALUES ('foo', 'loc', 'p1');
                 INSERT INTO call_statistic VALUES ('foo', 'loc', 'p2');
                 INSERT INTO call_statistic VALUES ('bar', 'loc', 'p1');",
            )
            .unwrap();
        let targets = store.target_functions(2).unwrap();
        assert_eq!(targets, vec![("foo".to_string(), "loc".to_string())]);
    }

    #[test]
    fn callees_are_cached_after_first_lookup() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO call_graph VALUES ('a', 'loc', 'b', 'loc')",
                [],
            )
            .unwrap();
        let first = store.callees("a", "loc");
        assert_eq!(first, vec![("b".to_string(), "loc".to_string())]);
        // Mutate the graph behind the cache's back: the cached answer
        // should still be served, demonstrating the run-duration memoization.
        store.conn.execute("DELETE FROM call_graph", []).unwrap();
        let second = store.callees("a", "loc");
        assert_eq!(second, first);
    }
}
