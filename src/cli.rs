//! Command line interface (a `clap::Parser` derive
//! tree rather than a bare getopt parser). Global flags (`--database`,
//! `--min-project`, `-v`) plus a `run` subcommand (the default, matching the
//! original single-pipeline CLI's no-subcommand simplicity) and a `catalog`
//! subcommand for ambient catalog introspection.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::catalog::ReturnCatalog;
use crate::config::MinerConfig;
use crate::error::Result;
use crate::store::Store;
use crate::Pipeline;

/// Mine error-handling patterns from static-analysis facts about C/C++ call
/// sites.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the SQLite facts database.
    #[arg(short = 'd', long, global = true)]
    pub database: PathBuf,

    /// Minimum number of distinct projects for a function to be enumerated
    /// as a target function.
    #[arg(short = 'm', long, default_value_t = 2, global = true)]
    pub min_project: u32,

    /// Increase logging verbosity; repeatable (-v, -vv, -vvv, ...).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Optional TOML run configuration; overrides the built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the full pipeline: action classifier -> equivalence engine ->
    /// path-intention labeller (-> similarity scorer, if enabled).
    Run,
    /// Load (and optionally print) the return-semantics catalog CSV.
    Catalog {
        /// Path to the catalog CSV; defaults to the config's `catalog.path`.
        #[arg(long)]
        path: Option<PathBuf>,
        /// Print every loaded entry to stdout.
        #[arg(long)]
        show: bool,
    },
}

impl Cli {
    /// Execute the selected subcommand (or `run`, if none was given).
    pub fn run(&self) -> Result<()> {
        match &self.command {
            None | Some(Command::Run) => self.run_pipeline(),
            Some(Command::Catalog { path, show }) => self.run_catalog(path.as_deref(), *show),
        }
    }

    fn load_config(&self) -> Result<MinerConfig> {
        let mut config = match &self.config {
            Some(path) => MinerConfig::load_from_file(path)?,
            None => MinerConfig::default(),
        };
        config.analysis.min_project = self.min_project;
        Ok(config)
    }

    fn run_pipeline(&self) -> Result<()> {
        let config = self.load_config()?;
        let catalog = ReturnCatalog::load_csv(Path::new(&config.catalog.path))?;
        info!(entries = catalog.len(), "loaded return-semantics catalog");

        let mut store = Store::open(&self.database)?;
        let pipeline = Pipeline::new(config, catalog);
        let report = pipeline.run(&mut store)?;
        info!(
            targets_analyzed = report.targets_analyzed,
            call_sites_written = report.call_sites_written,
            action_records_written = report.action_records_written,
            similarity_records_written = report.similarity_records_written,
            "pipeline complete"
        );
        Ok(())
    }

    fn run_catalog(&self, path: Option<&Path>, show: bool) -> Result<()> {
        let config = self.load_config()?;
        let default_path = PathBuf::from(&config.catalog.path);
        let path = path.unwrap_or(&default_path);
        let catalog = ReturnCatalog::load_csv(path)?;

        if show {
            for entry in catalog.entries() {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    entry.call_name, entry.call_def_loc, entry.return_type, entry.normal_query, entry.error_query
                );
            }
        }

        let mut store = Store::open(&self.database)?;
        store.load_catalog_table(&catalog)?;
        info!(entries = catalog.len(), path = %path.display(), "catalog loaded into store");
        Ok(())
    }
}
