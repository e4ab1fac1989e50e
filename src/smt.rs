//! SMT bridge (component E).
//!
//! Declares every free variable of a [`Formula`] in its sort, installs the
//! formula into a fresh solver, and reports satisfiability. A formula is
//! only ever produced by [`crate::formula::build`] or the catalog-query
//! parser, both of which only emit well-typed trees, so installation cannot
//! fail from malformed input; it can still fail from solver resource limits
//! (timeout), which is reported as [`Decision::Unknown`] rather than an
//! error: a solver failure degrades the result, it never aborts the run.

use std::collections::HashMap;

use z3::ast::{Ast, Bool, Int, Real};
use z3::{Config, Context, SatResult, Solver};

use crate::formula::FormulaNode;
use crate::model::Sort;

/// Outcome of one `solver.check()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Sat,
    Unsat,
    Unknown,
}

impl From<SatResult> for Decision {
    fn from(value: SatResult) -> Self {
        match value {
            SatResult::Sat => Decision::Sat,
            SatResult::Unsat => Decision::Unsat,
            SatResult::Unknown => Decision::Unknown,
        }
    }
}

/// Owns a `z3::Context` and per-call scratch state. One `SmtContext` should
/// be created per worker thread when the `parallel` feature is in use: z3
/// contexts are not `Sync`.
pub struct SmtContext {
    context: Context,
    timeout_ms: u64,
}

impl SmtContext {
    /// Build a context. `timeout_ms` of `0` disables the per-call timeout.
    pub fn new(timeout_ms: u64) -> Self {
        let config = Config::new();
        Self {
            context: Context::new(&config),
            timeout_ms,
        }
    }

    fn solver(&self) -> Solver<'_> {
        let solver = Solver::new(&self.context);
        if self.timeout_ms > 0 {
            let mut params = z3::Params::new(&self.context);
            params.set_u32("timeout", self.timeout_ms as u32);
            solver.set_params(&params);
        }
        solver
    }

    /// Declare `int_vars`/`real_vars`/`bool_vars` plus two unreferenced
    /// "dummy" variables per sort (the upstream implementation always
    /// declares a `dummy_int_1`/`dummy_int_2` pair and their real/bool
    /// counterparts, whether or not a formula uses them).
    fn declare<'ctx>(
        &'ctx self,
        int_vars: &std::collections::BTreeSet<String>,
        real_vars: &std::collections::BTreeSet<String>,
        bool_vars: &std::collections::BTreeSet<String>,
    ) -> Declared<'ctx> {
        let mut ints = HashMap::new();
        let mut reals = HashMap::new();
        let mut bools = HashMap::new();

        let mut int_names: Vec<String> = int_vars.iter().cloned().collect();
        int_names.push("dummy_int_1".to_string());
        int_names.push("dummy_int_2".to_string());
        for name in int_names {
            ints.entry(name.clone()).or_insert_with(|| Int::new_const(&self.context, name.as_str()));
        }

        let mut real_names: Vec<String> = real_vars.iter().cloned().collect();
        real_names.push("dummy_real_1".to_string());
        real_names.push("dummy_real_2".to_string());
        for name in real_names {
            reals.entry(name.clone()).or_insert_with(|| Real::new_const(&self.context, name.as_str()));
        }

        let mut bool_names: Vec<String> = bool_vars.iter().cloned().collect();
        bool_names.push("dummy_bool_1".to_string());
        bool_names.push("dummy_bool_2".to_string());
        for name in bool_names {
            bools.entry(name.clone()).or_insert_with(|| Bool::new_const(&self.context, name.as_str()));
        }

        Declared { ints, reals, bools }
    }

    /// Translate a [`FormulaNode`] into a z3 boolean AST node, given its
    /// declared variables.
    fn to_bool<'ctx>(&'ctx self, node: &FormulaNode, declared: &Declared<'ctx>) -> Option<Bool<'ctx>> {
        match node {
            FormulaNode::BoolLit(v) => Some(Bool::from_bool(&self.context, *v)),
            FormulaNode::Var(name) => declared.bools.get(name).cloned(),
            FormulaNode::Not(a) => Some(self.to_bool(a, declared)?.not()),
            FormulaNode::And(a, b) => {
                let a = self.to_bool(a, declared)?;
                let b = self.to_bool(b, declared)?;
                Some(Bool::and(&self.context, &[&a, &b]))
            }
            FormulaNode::Or(a, b) => {
                let a = self.to_bool(a, declared)?;
                let b = self.to_bool(b, declared)?;
                Some(Bool::or(&self.context, &[&a, &b]))
            }
            FormulaNode::Eq(a, b) => self.eq_node(a, b, declared, true),
            FormulaNode::Ne(a, b) => self.eq_node(a, b, declared, false),
            FormulaNode::Lt(a, b) => self.cmp_int_or_real(a, b, declared, CmpOp::Lt),
            FormulaNode::Gt(a, b) => self.cmp_int_or_real(a, b, declared, CmpOp::Gt),
            FormulaNode::Le(a, b) => self.cmp_int_or_real(a, b, declared, CmpOp::Le),
            FormulaNode::Ge(a, b) => self.cmp_int_or_real(a, b, declared, CmpOp::Ge),
            _ => None,
        }
    }

    fn eq_node<'ctx>(
        &'ctx self,
        a: &FormulaNode,
        b: &FormulaNode,
        declared: &Declared<'ctx>,
        want_eq: bool,
    ) -> Option<Bool<'ctx>> {
        if let (Some(a), Some(b)) = (self.to_bool(a, declared), self.to_bool(b, declared)) {
            let eq = a._eq(&b);
            return Some(if want_eq { eq } else { eq.not() });
        }
        if let (Some(a), Some(b)) = (self.to_int(a, declared), self.to_int(b, declared)) {
            let eq = a._eq(&b);
            return Some(if want_eq { eq } else { eq.not() });
        }
        if let (Some(a), Some(b)) = (self.to_real(a, declared), self.to_real(b, declared)) {
            let eq = a._eq(&b);
            return Some(if want_eq { eq } else { eq.not() });
        }
        None
    }

    fn cmp_int_or_real<'ctx>(
        &'ctx self,
        a: &FormulaNode,
        b: &FormulaNode,
        declared: &Declared<'ctx>,
        op: CmpOp,
    ) -> Option<Bool<'ctx>> {
        if let (Some(a), Some(b)) = (self.to_int(a, declared), self.to_int(b, declared)) {
            return Some(match op {
                CmpOp::Lt => a.lt(&b),
                CmpOp::Gt => a.gt(&b),
                CmpOp::Le => a.le(&b),
                CmpOp::Ge => a.ge(&b),
            });
        }
        let a = self.to_real(a, declared)?;
        let b = self.to_real(b, declared)?;
        Some(match op {
            CmpOp::Lt => a.lt(&b),
            CmpOp::Gt => a.gt(&b),
            CmpOp::Le => a.le(&b),
            CmpOp::Ge => a.ge(&b),
        })
    }

    fn to_int<'ctx>(&'ctx self, node: &FormulaNode, declared: &Declared<'ctx>) -> Option<Int<'ctx>> {
        match node {
            FormulaNode::IntLit(v) => Some(Int::from_i64(&self.context, *v)),
            FormulaNode::Var(name) => declared.ints.get(name).cloned(),
            FormulaNode::Neg(a) => Some(-&self.to_int(a, declared)?),
            FormulaNode::Add(a, b) => Some(&self.to_int(a, declared)? + &self.to_int(b, declared)?),
            FormulaNode::Sub(a, b) => Some(&self.to_int(a, declared)? - &self.to_int(b, declared)?),
            FormulaNode::Mul(a, b) => Some(&self.to_int(a, declared)? * &self.to_int(b, declared)?),
            FormulaNode::Div(a, b) => {
                let a = self.to_int(a, declared)?;
                let b = self.to_int(b, declared)?;
                Some(a.div(&b))
            }
            FormulaNode::Rem(a, b) => {
                let a = self.to_int(a, declared)?;
                let b = self.to_int(b, declared)?;
                Some(a.rem(&b))
            }
            _ => None,
        }
    }

    fn to_real<'ctx>(&'ctx self, node: &FormulaNode, declared: &Declared<'ctx>) -> Option<Real<'ctx>> {
        match node {
            FormulaNode::RealLit(text) => text.parse::<f64>().ok().map(|v| {
                let (num, den) = float_to_fraction(v);
                Real::from_real(&self.context, num, den)
            }),
            FormulaNode::Var(name) => declared.reals.get(name).cloned(),
            FormulaNode::Neg(a) => Some(-&self.to_real(a, declared)?),
            FormulaNode::Add(a, b) => Some(&self.to_real(a, declared)? + &self.to_real(b, declared)?),
            FormulaNode::Sub(a, b) => Some(&self.to_real(a, declared)? - &self.to_real(b, declared)?),
            FormulaNode::Mul(a, b) => Some(&self.to_real(a, declared)? * &self.to_real(b, declared)?),
            FormulaNode::Div(a, b) => Some(&self.to_real(a, declared)? / &self.to_real(b, declared)?),
            _ => None,
        }
    }

    /// Declare `node`'s free variables and check its satisfiability.
    /// Returns [`Decision::Unknown`] when the AST could not be translated
    /// (a sort mismatch the solver itself would otherwise reject) or when
    /// the solver timed out or returned `unknown`.
    pub fn decide(
        &self,
        node: &FormulaNode,
        int_vars: &std::collections::BTreeSet<String>,
        real_vars: &std::collections::BTreeSet<String>,
        bool_vars: &std::collections::BTreeSet<String>,
    ) -> Decision {
        let declared = self.declare(int_vars, real_vars, bool_vars);
        let Some(translated) = self.to_bool(node, &declared) else {
            return Decision::Unknown;
        };
        let solver = self.solver();
        solver.assert(&translated);
        solver.check().into()
    }
}

enum CmpOp {
    Lt,
    Gt,
    Le,
    Ge,
}

struct Declared<'ctx> {
    ints: HashMap<String, Int<'ctx>>,
    reals: HashMap<String, Real<'ctx>>,
    bools: HashMap<String, Bool<'ctx>>,
}

/// Convert an `f64` literal to an exact `(numerator, denominator)` pair z3
/// accepts for `Real::from_real`. Only used for the small set of decimal
/// literals a branch condition can contain; denominators are powers of ten.
fn float_to_fraction(v: f64) -> (i32, i32) {
    let text = format!("{v}");
    if let Some(dot) = text.find('.') {
        let frac_len = text.len() - dot - 1;
        let den = 10i32.pow(frac_len as u32);
        let num: i32 = text.replace('.', "").parse().unwrap_or(0);
        (num, den)
    } else {
        (text.parse().unwrap_or(0), 1)
    }
}
