//! Equivalence engine (component F).
//!
//! For one target function `F`, partitions its call sites into equivalence
//! classes by testing, for every ordered pair `(i, j)` with `i < j`, whether
//! the two sites' branch predicates are logically equivalent — optionally
//! extended with `F`'s catalog normal/error predicate so that only the part
//! of the predicate that actually discriminates `F`'s return domain is
//! compared. Classes are tracked with a disjoint-set over call-site
//! positions, a direct substitution for the source's list-of-sets
//! partitioning.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::catalog::ReturnCatalog;
use crate::config::DenyListConfig;
use crate::formula::{self, Formula};
use crate::model::{CallSite, Sort};
use crate::normalize::normalize_for_formula;
use crate::smt::{Decision, SmtContext};

/// Classic disjoint-set over `0..n` positions, union-by-rank with path
/// compression.
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn same_set(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Per-target mutable state: the equivalence-decision cache and the
/// parse-error fingerprint set. Owned by a context object rather than
/// process-wide statics and cleared automatically at
/// each call to [`EquivalenceContext::run`] since a fresh context is built
/// per target function.
#[derive(Default)]
pub struct EquivalenceContext {
    /// `(cache_key(q_i), cache_key(q_j), callee_name) -> equivalent`, stored
    /// symmetrically.
    decisions: HashMap<(String, String, String), bool>,
    /// `(format!("{:?}", raw tokens), callee_name)` fingerprints of sites
    /// whose normalization already failed once.
    parse_errors: HashSet<(String, String)>,
}

/// One resolved call site ready for equivalence testing: its position in the
/// target's site list, the original row, and (if normalization/formula
/// construction succeeded) its built predicate.
struct Resolved<'a> {
    site: &'a CallSite,
    formula: Option<Formula>,
}

/// Outcome of running the equivalence engine over one target function's call
/// sites.
pub struct EquivalenceResult {
    /// `expr_set_id` per site, parallel to the input `sites` slice. `0` for
    /// orphans.
    pub expr_set_id: Vec<u32>,
    /// Representative site index for each non-zero class id (1-based class
    /// id -> index into `sites`), used by the intention labeller.
    pub representatives: HashMap<u32, usize>,
    /// The catalog-extended predicate built for each site, parallel to the
    /// input `sites` slice (`None` for unusable sites). The intention
    /// labeller runs on the representative's entry here
    /// ("branch = extended query of the representative").
    pub formulas: Vec<Option<Formula>>,
}

/// True when `call_name` should be skipped entirely for equivalence: it is
/// on the exact-name deny list, or its name contains `operator`/`__builtin`.
pub fn is_skipped(call_name: &str, deny_list: &DenyListConfig) -> bool {
    deny_list.is_denied(call_name)
}

fn extend_with_catalog(
    query: Formula,
    call_name: &str,
    catalog: &ReturnCatalog,
    call_def_loc: &str,
) -> Formula {
    let Some(entry) = catalog.lookup(call_name, call_def_loc) else {
        return query;
    };
    let slot = format!("{call_name}_0");
    let sort = match entry.return_type {
        crate::model::ReturnType::Int => Sort::Int,
        crate::model::ReturnType::Pointer => Sort::Bool,
    };
    let normal = formula::parse_catalog_query(&entry.normal_query, &slot);
    let error = formula::parse_catalog_query(&entry.error_query, &slot);
    let (Ok(normal), Ok(error)) = (normal, error) else {
        return query;
    };
    let mut extended = query.and(normal.or(error));
    extended.ensure_sort(&slot, sort);
    extended
}

/// Test whether `a` and `b` are semantically equivalent: both
/// `a ∧ ¬b` and `b ∧ ¬a` must both be UNSAT.
fn equivalent(a: &Formula, b: &Formula, smt: &mut SmtContext) -> bool {
    let ab = a.clone().and(b.clone().not());
    let ba = b.clone().and(a.clone().not());
    let d1 = smt.decide(&ab.node, &ab.int_vars, &ab.real_vars, &ab.bool_vars);
    if d1 != Decision::Unsat {
        return false;
    }
    let d2 = smt.decide(&ba.node, &ba.int_vars, &ba.real_vars, &ba.bool_vars);
    d2 == Decision::Unsat
}

impl EquivalenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the O(n^2) ordered-pair partitioning pass over `sites` (all call
    /// sites of one target function `call_name`/`call_def_loc`).
    pub fn run(
        &mut self,
        call_name: &str,
        sites: &[CallSite],
        catalog: &ReturnCatalog,
        smt: &mut SmtContext,
    ) -> EquivalenceResult {
        let resolved: Vec<Resolved> = sites
            .iter()
            .map(|site| {
                let fingerprint = (format!("{:?}", site.expr_tokens), call_name.to_string());
                if self.parse_errors.contains(&fingerprint) {
                    return Resolved { site, formula: None };
                }
                let formula = normalize_for_formula(site)
                    .and_then(|inputs| formula::build(&inputs, call_name).ok())
                    .map(|q| extend_with_catalog(q, call_name, catalog, &site.call_def_loc));
                if formula.is_none() {
                    self.parse_errors.insert(fingerprint);
                    debug!(site_id = site.id, call_name, "site unusable for equivalence");
                }
                Resolved { site, formula }
            })
            .collect();

        let n = resolved.len();
        let mut uf = UnionFind::new(n);

        for i in 0..n {
            let Some(qi) = &resolved[i].formula else { continue };
            for j in (i + 1)..n {
                if uf.same_set(i, j) {
                    continue;
                }
                let Some(qj) = &resolved[j].formula else { continue };

                let key = (qi.cache_key(), qj.cache_key(), call_name.to_string());
                let rev_key = (qj.cache_key(), qi.cache_key(), call_name.to_string());
                let decision = if let Some(&cached) = self.decisions.get(&key) {
                    cached
                } else if let Some(&cached) = self.decisions.get(&rev_key) {
                    cached
                } else {
                    let result = equivalent(qi, qj, smt);
                    self.decisions.insert(key, result);
                    self.decisions.insert(rev_key, result);
                    result
                };

                if decision {
                    uf.union(i, j);
                }
            }
        }

        // Assign sequential class ids (1-based) in order of first appearance
        // among sites that have at least one well-formed query and share a
        // root with another site OR stand alone — any site whose query was
        // built at all ends up in a class (the reflexive-equivalence
        // invariant: `equivalent(i, i)` holds trivially), sites with no
        // query become orphans.
        let mut class_of_root: HashMap<usize, u32> = HashMap::new();
        let mut next_class_id = 1u32;
        let mut expr_set_id = vec![0u32; n];
        let mut representatives: HashMap<u32, usize> = HashMap::new();

        for i in 0..n {
            if resolved[i].formula.is_none() {
                continue;
            }
            let root = uf.find(i);
            let class_id = *class_of_root.entry(root).or_insert_with(|| {
                let id = next_class_id;
                next_class_id += 1;
                id
            });
            expr_set_id[i] = class_id;
            representatives.entry(class_id).or_insert(i);
        }

        EquivalenceResult {
            expr_set_id,
            representatives,
            formulas: resolved.into_iter().map(|r| r.formula).collect(),
        }
    }
}
