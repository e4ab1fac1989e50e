//! End-to-end pipeline tests: a fixture SQLite database plays the role of
//! the pre-extracted facts corpus, and the full [`Pipeline`] is run against
//! it exactly as the `ehminer` binary would.

use std::io::Write;

use eh_miner::catalog::ReturnCatalog;
use eh_miner::config::MinerConfig;
use eh_miner::model::TOKEN_SEP;
use eh_miner::store::Store;
use eh_miner::Pipeline;

/// Seed a fresh SQLite file with one guarded `malloc` call site, reached
/// from a post-branch function whose name nudges the action BFS into the
/// `output` and `close` categories, with enough `call_statistic` rows to
/// clear the default `min_project` threshold.
fn seed_fixture_db(path: &std::path::Path) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE branch_call (
            id INTEGER PRIMARY KEY, branch_id INTEGER, domain TEXT, project TEXT,
            call_name TEXT, call_def_loc TEXT, call_id TEXT, call_str TEXT,
            call_ret TEXT, call_arg TEXT, call_arg_count INTEGER,
            expr_tokens TEXT, expr_tokens_count INTEGER, path_number_vec TEXT,
            log_name TEXT, log_def_loc TEXT, log_id TEXT, log_str TEXT
        );
        CREATE TABLE call_statistic (call_name TEXT, call_def_loc TEXT, project TEXT);
        CREATE TABLE call_graph (func_name TEXT, func_def_loc TEXT, call_name TEXT, call_def_loc TEXT);
        ",
    )
    .unwrap();

    let expr_tokens = format!("malloc(){TOKEN_SEP}VARIABLE_POINTER{TOKEN_SEP}UO_9_!");
    conn.execute(
        "INSERT INTO branch_call
            (branch_id, domain, project, call_name, call_def_loc, call_id, call_str,
             call_ret, call_arg, call_arg_count, expr_tokens, expr_tokens_count,
             path_number_vec, log_name, log_def_loc, log_id, log_str)
         VALUES (1, 'd', 'p1', 'malloc', 'stdlib.h', 'c1', 'malloc()',
                 '-', '-', 0, ?1, 3,
                 '-', 'log_and_close', 'app.c', 'l1', 'log_and_close()')",
        rusqlite::params![expr_tokens],
    )
    .unwrap();

    conn.execute_batch(
        "INSERT INTO call_statistic VALUES ('malloc', 'stdlib.h', 'p1');
         INSERT INTO call_statistic VALUES ('malloc', 'stdlib.h', 'p2');
         INSERT INTO call_graph VALUES ('log_and_close', 'app.c', 'fprintf', 'libc.h');
         INSERT INTO call_graph VALUES ('log_and_close', 'app.c', 'close', 'unistd.h');",
    )
    .unwrap();
}

fn malloc_catalog() -> ReturnCatalog {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "DomainName,CallName,CallDefLoc,ReturnType,NormalQuery,ErrorQuery").unwrap();
    writeln!(file, "libc,malloc,stdlib.h,POINTER,malloc_0,Not(malloc_0)").unwrap();
    ReturnCatalog::load_csv(file.path()).unwrap()
}

#[test]
fn pipeline_classifies_and_labels_a_malloc_null_check() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("facts.db");
    seed_fixture_db(&db_path);

    let mut store = Store::open(&db_path).unwrap();
    let pipeline = Pipeline::new(MinerConfig::default(), malloc_catalog());
    let report = pipeline.run(&mut store).unwrap();

    assert_eq!(report.targets_analyzed, 1);
    assert_eq!(report.call_sites_written, 1);
    assert_eq!(report.action_records_written, 2);

    drop(store);
    let conn = rusqlite::Connection::open(&db_path).unwrap();

    let (intention, expr_set_id): (String, i64) = conn
        .query_row(
            "SELECT path_intention, expr_set_id FROM condition_equivalence",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(intention, "ERROR");
    assert_eq!(expr_set_id, 1);

    let mut stmt = conn
        .prepare("SELECT intention, trace, level FROM function_action ORDER BY intention")
        .unwrap();
    let actions: Vec<(String, String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(
        actions,
        vec![
            ("close".to_string(), "log_and_close->close".to_string(), 2),
            ("output".to_string(), "log_and_close->fprintf".to_string(), 2),
        ]
    );
}

#[test]
fn re_running_the_pipeline_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("facts.db");
    seed_fixture_db(&db_path);

    let mut store = Store::open(&db_path).unwrap();
    let pipeline = Pipeline::new(MinerConfig::default(), malloc_catalog());
    let first = pipeline.run(&mut store).unwrap();
    let second = pipeline.run(&mut store).unwrap();

    assert_eq!(first.call_sites_written, second.call_sites_written);
    assert_eq!(store.row_count("condition_equivalence").unwrap(), 1);
}

#[test]
#[cfg(feature = "similarity")]
fn similarity_only_scores_logs_with_a_non_orphan_class() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("facts.db");
    seed_fixture_db(&db_path);

    // A second target function whose only call site is unusable (a ternary
    // token), so it becomes an orphan (`expr_set_id = 0`). Its log function,
    // `orphan_log`, is itself reachable by the action classifier's `output`
    // keyword/function match (so it still clears component A's
    // `log_name IN function_action` filter) -- if the similarity scorer
    // wrongly iterated every distinct log function instead of only those
    // backing a non-zero equivalence class, it would wrongly score it.
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute(
        "INSERT INTO branch_call
            (branch_id, domain, project, call_name, call_def_loc, call_id, call_str,
             call_ret, call_arg, call_arg_count, expr_tokens, expr_tokens_count,
             path_number_vec, log_name, log_def_loc, log_id, log_str)
         VALUES (2, 'd', 'p1', 'bar', 'bar.h', 'c2', 'bar()',
                 '-', '-', 0, ':?', 1,
                 '-', 'orphan_log', 'app.c', 'l2', 'orphan_log()')",
        [],
    )
    .unwrap();
    conn.execute_batch(
        "INSERT INTO call_statistic VALUES ('bar', 'bar.h', 'p1');
         INSERT INTO call_statistic VALUES ('bar', 'bar.h', 'p2');
         INSERT INTO call_graph VALUES ('orphan_log', 'app.c', 'fprintf', 'libc.h');",
    )
    .unwrap();
    drop(conn);

    let mut store = Store::open(&db_path).unwrap();
    let pipeline = Pipeline::new(MinerConfig::default(), malloc_catalog());
    pipeline.run(&mut store).unwrap();

    drop(store);
    let conn = rusqlite::Connection::open(&db_path).unwrap();

    let orphan_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM function_similarity WHERE log_name = 'orphan_log'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphan_rows, 0, "orphan-only log function must not be scored");

    let scored_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM function_similarity WHERE log_name = 'log_and_close'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(scored_rows > 0, "log function backing a non-orphan class must be scored");
}

#[test]
fn denied_function_is_skipped_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("facts.db");
    seed_fixture_db(&db_path);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "UPDATE branch_call SET call_name = 'strcmp', call_def_loc = 'string.h';
         UPDATE call_statistic SET call_name = 'strcmp', call_def_loc = 'string.h';",
    )
    .unwrap();
    drop(conn);

    let mut store = Store::open(&db_path).unwrap();
    let pipeline = Pipeline::new(MinerConfig::default(), ReturnCatalog::default());
    let report = pipeline.run(&mut store).unwrap();

    assert_eq!(report.targets_analyzed, 0);
    assert_eq!(store.row_count("condition_equivalence").unwrap(), 0);
}
