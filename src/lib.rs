//! # Error-Handling Pattern Miner
//!
//! Mines error-handling patterns from a corpus of pre-extracted
//! static-analysis facts about C/C++ call sites.
//!
//! ## Architecture Overview
//!
//! ```text
//! branch_call/call_graph/call_statistic (store)
//!        |
//!        v
//!   action classifier (H) ---> function_action
//!        |
//!        v  (log_name filter)
//!   equivalence engine (F) --uses--> normalizer (C) + formula builder (D) + smt bridge (E)
//!        |
//!        v
//!   intention labeller (G) --uses--> return-semantics catalog (B)
//!        |
//!        v
//!   condition_equivalence
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use eh_miner::{MinerConfig, Pipeline};
//! use eh_miner::catalog::ReturnCatalog;
//! use eh_miner::store::Store;
//! use std::path::Path;
//!
//! let config = MinerConfig::default();
//! let mut store = Store::open(Path::new("facts.db"))?;
//! let catalog = ReturnCatalog::load_csv(Path::new("glibc_return.csv"))?;
//! let pipeline = Pipeline::new(config, catalog);
//! let report = pipeline.run(&mut store)?;
//! println!("{} target functions analyzed", report.targets_analyzed);
//! # Ok::<(), eh_miner::error::Error>(())
//! ```

pub mod action;
pub mod catalog;
pub mod config;
pub mod equivalence;
pub mod error;
pub mod formula;
pub mod intention;
pub mod model;
pub mod normalize;
#[cfg(feature = "similarity")]
pub mod similarity;
pub mod smt;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

pub use catalog::ReturnCatalog;
pub use config::{ConfigLoader, MinerConfig};
pub use error::{Error, Result};
pub use model::{ActionKind, ActionRecord, CallSite, ClassifiedSite, PathIntention};
pub use store::Store;

use tracing::{debug, info, warn};

use crate::catalog::CatalogEntry;
use crate::equivalence::{EquivalenceContext, EquivalenceResult};
use crate::model::FunctionKey;
use crate::smt::SmtContext;

/// Label every equivalence class found for one target, on its
/// representative site only, then hand back a `class_id -> label` map
/// [`classify_sites`] applies to every site in the class.
fn label_representatives(
    result: &EquivalenceResult,
    catalog_entry: Option<&CatalogEntry>,
    call_name: &str,
    smt: &mut SmtContext,
) -> std::collections::HashMap<u32, PathIntention> {
    let mut labels = std::collections::HashMap::new();
    for (&class_id, &rep_idx) in &result.representatives {
        let label = match &result.formulas[rep_idx] {
            Some(branch) => intention::label(branch, catalog_entry, call_name, smt),
            None => PathIntention::Unknown,
        };
        labels.insert(class_id, label);
    }
    labels
}

/// Pair each input site with its `expr_set_id` and resolved intention label
/// (`UNKNOWN` for orphans), ready to be written to `condition_equivalence`.
fn classify_sites(
    sites: Vec<CallSite>,
    result: &EquivalenceResult,
    labels: &std::collections::HashMap<u32, PathIntention>,
) -> Vec<ClassifiedSite> {
    sites
        .into_iter()
        .enumerate()
        .map(|(i, site)| {
            let expr_set_id = result.expr_set_id[i];
            let intention = if expr_set_id == 0 {
                PathIntention::Unknown
            } else {
                labels.get(&expr_set_id).copied().unwrap_or(PathIntention::Unknown)
            };
            ClassifiedSite { site, expr_set_id, intention }
        })
        .collect()
}

/// Orchestrates the full pipeline: action classification (H) runs first
/// (component A's filter requires it), then equivalence partitioning (F)
/// and path-intention labelling (G) run per target function, then the
/// optional similarity scorer (I) runs last.
pub struct Pipeline {
    config: MinerConfig,
    catalog: ReturnCatalog,
}

/// Summary counters returned by [`Pipeline::run`], useful for CLI/log
/// reporting.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub log_functions_classified: usize,
    pub action_records_written: usize,
    pub similarity_records_written: usize,
    pub targets_analyzed: usize,
    pub call_sites_written: usize,
}

impl Pipeline {
    pub fn new(config: MinerConfig, catalog: ReturnCatalog) -> Self {
        Self { config, catalog }
    }

    /// Run the complete pipeline against `store`, writing results as it
    /// goes; writes commit per insert.
    pub fn run(&self, store: &mut Store) -> Result<RunReport> {
        let mut report = RunReport::default();

        self.run_action_classification(store, &mut report)?;
        self.run_equivalence_and_intention(store, &mut report)?;

        #[cfg(feature = "similarity")]
        self.run_similarity(store, &mut report)?;

        Ok(report)
    }

    fn run_action_classification(&self, store: &mut Store, report: &mut RunReport) -> Result<()> {
        store.reset_output_table("function_action")?;
        let logs = store.distinct_log_functions()?;
        info!(count = logs.len(), "classifying post-branch functions");
        for log in &logs {
            let records = action::classify(log, &*store, self.config.analysis.action_bfs_max_depth);
            for record in &records {
                store.insert_function_action(record)?;
                report.action_records_written += 1;
            }
            report.log_functions_classified += 1;
        }
        Ok(())
    }

    fn run_equivalence_and_intention(&self, store: &mut Store, report: &mut RunReport) -> Result<()> {
        store.reset_output_table("condition_equivalence")?;
        let targets = store.target_functions(self.config.analysis.min_project)?;
        info!(count = targets.len(), "enumerated target functions");

        #[cfg(feature = "parallel")]
        if self.config.analysis.parallel {
            return self.run_equivalence_and_intention_parallel(store, &targets, report);
        }

        let mut smt = SmtContext::new(self.config.analysis.smt_timeout_ms);

        for (call_name, call_def_loc) in &targets {
            if equivalence::is_skipped(call_name, &self.config.deny_list) {
                debug!(call_name, "skipping denied function");
                continue;
            }

            let sites = store.call_sites_for_target(call_name, call_def_loc)?;
            if sites.is_empty() {
                continue;
            }

            let mut ctx = EquivalenceContext::new();
            let result = ctx.run(call_name, &sites, &self.catalog, &mut smt);

            let catalog_entry = self.catalog.lookup(call_name, call_def_loc);
            let labels = label_representatives(&result, catalog_entry, call_name, &mut smt);

            for classified in classify_sites(sites, &result, &labels) {
                store.insert_condition_equivalence(&classified)?;
                report.call_sites_written += 1;
            }

            report.targets_analyzed += 1;
        }

        Ok(())
    }

    /// Data-parallel sibling of [`Pipeline::run_equivalence_and_intention`]:
    /// reads every target's call sites up front (a `rusqlite::Connection`
    /// isn't `Sync`), partitions and labels each target's sites concurrently
    /// with `rayon` — each worker builds its own [`EquivalenceContext`] and
    /// [`SmtContext`] since a `z3::Context` is not `Sync` either — and then
    /// commits the results back through `store` sequentially, in target
    /// order, preserving the single-threaded path's per-insert commit
    /// behavior. See DESIGN.md for why this phase split was chosen over a
    /// shared `Mutex<Store>`.
    #[cfg(feature = "parallel")]
    fn run_equivalence_and_intention_parallel(
        &self,
        store: &mut Store,
        targets: &[FunctionKey],
        report: &mut RunReport,
    ) -> Result<()> {
        use rayon::prelude::*;

        let mut work: Vec<(FunctionKey, Vec<CallSite>)> = Vec::new();
        for (call_name, call_def_loc) in targets {
            if equivalence::is_skipped(call_name, &self.config.deny_list) {
                debug!(call_name, "skipping denied function");
                continue;
            }
            let sites = store.call_sites_for_target(call_name, call_def_loc)?;
            if sites.is_empty() {
                continue;
            }
            work.push(((call_name.clone(), call_def_loc.clone()), sites));
        }

        let smt_timeout_ms = self.config.analysis.smt_timeout_ms;
        let catalog = &self.catalog;
        let outcomes: Vec<Vec<ClassifiedSite>> = work
            .into_par_iter()
            .map(|((call_name, call_def_loc), sites)| {
                let mut smt = SmtContext::new(smt_timeout_ms);
                let mut ctx = EquivalenceContext::new();
                let result = ctx.run(&call_name, &sites, catalog, &mut smt);

                let catalog_entry = catalog.lookup(&call_name, &call_def_loc);
                let labels = label_representatives(&result, catalog_entry, &call_name, &mut smt);

                classify_sites(sites, &result, &labels)
            })
            .collect();

        for rows in outcomes {
            if rows.is_empty() {
                continue;
            }
            report.targets_analyzed += 1;
            for classified in rows {
                store.insert_condition_equivalence(&classified)?;
                report.call_sites_written += 1;
            }
        }

        Ok(())
    }

    #[cfg(feature = "similarity")]
    fn run_similarity(&self, store: &mut Store, report: &mut RunReport) -> Result<()> {
        store.reset_output_table("function_similarity")?;
        store.insert_function_similarity(&similarity::baseline_row())?;
        report.similarity_records_written += 1;

        let logs: Vec<FunctionKey> = store.logs_with_nonzero_equivalence()?;
        for log in &logs {
            let records = similarity::score(
                log,
                &*store,
                self.config.analysis.similarity_max_depth,
                self.config.analysis.similarity_weight_floor,
            );
            if records.is_empty() {
                warn!(log_name = %log.0, "no similarity weight accumulated");
            }
            for record in &records {
                store.insert_function_similarity(record)?;
                report.similarity_records_written += 1;
            }
        }
        Ok(())
    }
}
