//! Path-intention labeller (component G).
//!
//! Given one representative call site's extended predicate and the target
//! function's catalog entry, classifies the whole equivalence class as
//! NORMAL / SUB-NORMAL / ERROR / SUB-ERROR / UNCHECK / UNKNOWN via the
//! four-test implication cascade.

use crate::catalog::CatalogEntry;
use crate::formula::{self, Formula};
use crate::model::{PathIntention, ReturnType, Sort};
use crate::smt::{Decision, SmtContext};

/// Label one equivalence class given its representative site's already-built
/// (catalog-extended) predicate. Returns [`PathIntention::Uncheck`] when
/// `catalog_entry` is `None`, the label is `UNCHECK`.
pub fn label(
    branch: &Formula,
    catalog_entry: Option<&CatalogEntry>,
    call_name: &str,
    smt: &mut SmtContext,
) -> PathIntention {
    let Some(entry) = catalog_entry else {
        return PathIntention::Uncheck;
    };

    let slot = format!("{call_name}_0");
    let sort = match entry.return_type {
        ReturnType::Int => Sort::Int,
        ReturnType::Pointer => Sort::Bool,
    };

    let Ok(normal) = formula::parse_catalog_query(&entry.normal_query, &slot) else {
        return PathIntention::Unknown;
    };
    let Ok(error) = formula::parse_catalog_query(&entry.error_query, &slot) else {
        return PathIntention::Unknown;
    };

    let mut normal = normal;
    let mut error = error;
    normal.ensure_sort(&slot, sort);
    error.ensure_sort(&slot, sort);

    match test_cascade(branch, &normal, smt) {
        Cascade::Equivalent => return PathIntention::Normal,
        Cascade::SubDomain => return PathIntention::SubNormal,
        Cascade::Neither => {}
        Cascade::Failure => return PathIntention::Unknown,
    }

    match test_cascade(branch, &error, smt) {
        Cascade::Equivalent => PathIntention::Error,
        Cascade::SubDomain => PathIntention::SubError,
        Cascade::Neither => PathIntention::Unknown,
        Cascade::Failure => PathIntention::Unknown,
    }
}

enum Cascade {
    /// `¬branch ∧ target` and `¬target ∧ branch` both UNSAT.
    Equivalent,
    /// `¬branch ∧ target` SAT, `¬target ∧ branch` UNSAT: branch is a strict
    /// sub-domain of target.
    SubDomain,
    /// Neither condition held.
    Neither,
    /// A solver call did not produce a definite decision.
    Failure,
}

fn test_cascade(branch: &Formula, target: &Formula, smt: &mut SmtContext) -> Cascade {
    let not_branch_and_target = branch.clone().not().and(target.clone());
    let not_target_and_branch = target.clone().not().and(branch.clone());

    let d1 = smt.decide(
        &not_branch_and_target.node,
        &not_branch_and_target.int_vars,
        &not_branch_and_target.real_vars,
        &not_branch_and_target.bool_vars,
    );
    let d2 = smt.decide(
        &not_target_and_branch.node,
        &not_target_and_branch.int_vars,
        &not_target_and_branch.real_vars,
        &not_target_and_branch.bool_vars,
    );

    if d1 == Decision::Unknown || d2 == Decision::Unknown {
        return Cascade::Failure;
    }
    match (d1, d2) {
        (Decision::Unsat, Decision::Unsat) => Cascade::Equivalent,
        (Decision::Sat, Decision::Unsat) => Cascade::SubDomain,
        _ => Cascade::Neither,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ReturnCatalog;
    use crate::model::{CallSite, TOKEN_SEP};
    use crate::normalize::normalize_for_formula;

    fn site(call_name: &str, call_str: &str, tokens: &str) -> CallSite {
        let expr_tokens_count = tokens.split(TOKEN_SEP).count() as i64;
        CallSite {
            id: 1,
            branch_id: 1,
            domain: "d".into(),
            project: "p".into(),
            call_name: call_name.into(),
            call_def_loc: "loc".into(),
            call_id: "c1".into(),
            call_str: call_str.into(),
            call_ret: "-".into(),
            call_arg: "-".into(),
            call_arg_count: 0,
            expr_tokens: tokens.into(),
            expr_tokens_count,
            path_number_vec: "-".into(),
            log_name: "log".into(),
            log_def_loc: "logloc".into(),
            log_id: "l1".into(),
            log_str: "log()".into(),
        }
    }

    fn catalog_with(call_name: &str, return_type: &str, normal: &str, error: &str) -> ReturnCatalog {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DomainName,CallName,CallDefLoc,ReturnType,NormalQuery,ErrorQuery").unwrap();
        writeln!(file, "libc,{call_name},loc,{return_type},{normal},{error}").unwrap();
        ReturnCatalog::load_csv(file.path()).unwrap()
    }

    #[test]
    fn malloc_null_guard_is_error() {
        let s = site(
            "malloc",
            "malloc()",
            &format!("malloc(){TOKEN_SEP}VARIABLE_POINTER{TOKEN_SEP}UO_9_!"),
        );
        let inputs = normalize_for_formula(&s).unwrap();
        let branch = formula::build(&inputs, "malloc").unwrap();
        let catalog = catalog_with("malloc", "POINTER", "malloc_0", "Not(malloc_0)");
        let entry = catalog.lookup("malloc", "loc").unwrap();
        let mut smt = SmtContext::new(0);
        assert_eq!(
            label(&branch, Some(entry), "malloc", &mut smt),
            PathIntention::Error
        );
    }

    #[test]
    fn no_catalog_entry_is_uncheck() {
        let s = site("foo", "foo()", &format!("foo(){TOKEN_SEP}VARIABLE_INT{TOKEN_SEP}0{TOKEN_SEP}BO_9_<"));
        let inputs = normalize_for_formula(&s).unwrap();
        let branch = formula::build(&inputs, "foo").unwrap();
        let mut smt = SmtContext::new(0);
        assert_eq!(label(&branch, None, "foo", &mut smt), PathIntention::Uncheck);
    }

    #[test]
    fn equality_to_zero_matches_normal_exactly() {
        let s = site("foo", "foo()", &format!("foo(){TOKEN_SEP}VARIABLE_INT{TOKEN_SEP}0{TOKEN_SEP}BO_13_=="));
        let inputs = normalize_for_formula(&s).unwrap();
        let branch = formula::build(&inputs, "foo").unwrap();
        let catalog = catalog_with("foo", "INT", "foo_0==0", "foo_0!=0");
        let entry = catalog.lookup("foo", "loc").unwrap();
        let mut smt = SmtContext::new(0);
        assert_eq!(
            label(&branch, Some(entry), "foo", &mut smt),
            PathIntention::Normal
        );
    }
}
