//! CLI smoke tests for the `ehminer` binary.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn ehminer() -> Command {
    Command::cargo_bin("ehminer").unwrap()
}

fn write_catalog(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("glibc_return.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "DomainName,CallName,CallDefLoc,ReturnType,NormalQuery,ErrorQuery").unwrap();
    writeln!(file, "libc,malloc,stdlib.h,POINTER,malloc_0,Not(malloc_0)").unwrap();
    path
}

fn write_empty_db(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("facts.db");
    // Schema creation is the store's job; an empty file is enough for
    // `Store::open` to create every table from scratch.
    path
}

#[test]
fn help_lists_the_run_and_catalog_subcommands() {
    ehminer()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("catalog"));
}

#[test]
fn catalog_show_prints_loaded_entries() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = write_catalog(dir.path());
    let db_path = write_empty_db(dir.path());

    ehminer()
        .arg("--database")
        .arg(&db_path)
        .arg("catalog")
        .arg("--path")
        .arg(&catalog_path)
        .arg("--show")
        .assert()
        .success()
        .stdout(predicate::str::contains("malloc"));
}

#[test]
fn run_against_an_empty_database_succeeds_with_no_targets() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = write_catalog(dir.path());
    let db_path = write_empty_db(dir.path());

    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!("[catalog]\npath = \"{}\"\n", catalog_path.display()),
    )
    .unwrap();

    ehminer()
        .arg("--database")
        .arg(&db_path)
        .arg("--config")
        .arg(&config_path)
        .arg("run")
        .assert()
        .success();
}

#[test]
fn unknown_subcommand_fails_with_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = write_empty_db(dir.path());

    ehminer()
        .arg("--database")
        .arg(&db_path)
        .arg("not-a-real-subcommand")
        .assert()
        .failure();
}
