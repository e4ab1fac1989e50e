//! Query builder (component D).
//!
//! Folds a canonicalized post-order token stream onto a stack of
//! `(formula, is_bool)` pairs, producing a typed formula AST over a mixed
//! Int/Real/Bool signature plus the three sort-sets of free variables that
//! must be declared before the formula is installed into a solver: AST
//! nodes are built directly, never via intermediate string concatenation.

use std::collections::BTreeSet;
use std::fmt;

use crate::model::Sort;
use crate::normalize::{BinOp, ExprToken, FormulaInputs, UnOp};

/// The formula AST.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaNode {
    IntLit(i64),
    RealLit(String),
    BoolLit(bool),
    /// A free variable, named by its slot (`F_0`, `F_i`) or, for an
    /// identifier the normalizer left untouched, its raw source name.
    Var(String),
    Not(Box<FormulaNode>),
    Neg(Box<FormulaNode>),
    And(Box<FormulaNode>, Box<FormulaNode>),
    Or(Box<FormulaNode>, Box<FormulaNode>),
    Eq(Box<FormulaNode>, Box<FormulaNode>),
    Ne(Box<FormulaNode>, Box<FormulaNode>),
    Lt(Box<FormulaNode>, Box<FormulaNode>),
    Gt(Box<FormulaNode>, Box<FormulaNode>),
    Le(Box<FormulaNode>, Box<FormulaNode>),
    Ge(Box<FormulaNode>, Box<FormulaNode>),
    Add(Box<FormulaNode>, Box<FormulaNode>),
    Sub(Box<FormulaNode>, Box<FormulaNode>),
    Mul(Box<FormulaNode>, Box<FormulaNode>),
    Div(Box<FormulaNode>, Box<FormulaNode>),
    Rem(Box<FormulaNode>, Box<FormulaNode>),
}

impl fmt::Display for FormulaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaNode::IntLit(v) => write!(f, "{v}"),
            FormulaNode::RealLit(v) => write!(f, "{v}"),
            FormulaNode::BoolLit(v) => write!(f, "{v}"),
            FormulaNode::Var(name) => write!(f, "{name}"),
            FormulaNode::Not(a) => write!(f, "Not({a})"),
            FormulaNode::Neg(a) => write!(f, "-{a}"),
            FormulaNode::And(a, b) => write!(f, "And({a},{b})"),
            FormulaNode::Or(a, b) => write!(f, "Or({a},{b})"),
            FormulaNode::Eq(a, b) => write!(f, "({a}=={b})"),
            FormulaNode::Ne(a, b) => write!(f, "({a}!={b})"),
            FormulaNode::Lt(a, b) => write!(f, "({a}<{b})"),
            FormulaNode::Gt(a, b) => write!(f, "({a}>{b})"),
            FormulaNode::Le(a, b) => write!(f, "({a}<={b})"),
            FormulaNode::Ge(a, b) => write!(f, "({a}>={b})"),
            FormulaNode::Add(a, b) => write!(f, "({a}+{b})"),
            FormulaNode::Sub(a, b) => write!(f, "({a}-{b})"),
            FormulaNode::Mul(a, b) => write!(f, "({a}*{b})"),
            FormulaNode::Div(a, b) => write!(f, "({a}/{b})"),
            FormulaNode::Rem(a, b) => write!(f, "({a}%{b})"),
        }
    }
}

/// A built formula plus the free-variable sort sets that must be declared
/// before it is handed to the SMT bridge.
#[derive(Debug, Clone)]
pub struct Formula {
    pub node: FormulaNode,
    pub int_vars: BTreeSet<String>,
    pub real_vars: BTreeSet<String>,
    pub bool_vars: BTreeSet<String>,
}

impl Formula {
    /// Canonical string form used as the equivalence-decision cache key
    /// the AST is printed lazily, never built as strings in the hot path.
    pub fn cache_key(&self) -> String {
        self.node.to_string()
    }

    /// Force a slot into a given sort's declared set, without touching the
    /// formula body, removing it from the other two sets first so a slot is
    /// always declared in exactly one sort. Used by the equivalence engine
    /// and the intention labeller to declare `F_0` by the catalog's
    /// `ReturnType` even when no `VARIABLE_*` tag happened to wrap it in the
    /// branch expression, and to correct the catalog-query parser's
    /// necessarily provisional guess (it declares a bare slot `Bool` before
    /// the catalog's own `ReturnType` is known to it).
    pub fn ensure_sort(&mut self, slot: &str, sort: Sort) {
        if sort != Sort::Int {
            self.int_vars.remove(slot);
        }
        if sort != Sort::Real {
            self.real_vars.remove(slot);
        }
        if sort != Sort::Bool {
            self.bool_vars.remove(slot);
        }
        match sort {
            Sort::Int => self.int_vars.insert(slot.to_string()),
            Sort::Real => self.real_vars.insert(slot.to_string()),
            Sort::Bool => self.bool_vars.insert(slot.to_string()),
        };
    }

    /// Build `And(self, other)`, merging sort sets.
    pub fn and(mut self, other: Formula) -> Formula {
        self.int_vars.extend(other.int_vars);
        self.real_vars.extend(other.real_vars);
        self.bool_vars.extend(other.bool_vars);
        Formula {
            node: FormulaNode::And(Box::new(self.node), Box::new(other.node)),
            int_vars: self.int_vars,
            real_vars: self.real_vars,
            bool_vars: self.bool_vars,
        }
    }

    /// Build `Or(self, other)`, merging sort sets.
    pub fn or(mut self, other: Formula) -> Formula {
        self.int_vars.extend(other.int_vars);
        self.real_vars.extend(other.real_vars);
        self.bool_vars.extend(other.bool_vars);
        Formula {
            node: FormulaNode::Or(Box::new(self.node), Box::new(other.node)),
            int_vars: self.int_vars,
            real_vars: self.real_vars,
            bool_vars: self.bool_vars,
        }
    }

    /// Build `Not(self)`.
    pub fn not(self) -> Formula {
        Formula {
            node: FormulaNode::Not(Box::new(self.node)),
            int_vars: self.int_vars,
            real_vars: self.real_vars,
            bool_vars: self.bool_vars,
        }
    }
}

/// A formula the builder refused to construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaError(pub String);

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.0)
    }
}

impl std::error::Error for FormulaError {}

struct Frame {
    node: FormulaNode,
    is_bool: bool,
}

fn leaf_text(node: &FormulaNode) -> Option<String> {
    match node {
        FormulaNode::Var(s) => Some(s.clone()),
        FormulaNode::IntLit(i) => Some(i.to_string()),
        _ => None,
    }
}

/// Resolve a `MEMBER`/`ARRAY`-constructed variable name against the
/// sanitized `call_ret`/`call_arg` lists, rewriting it to the slot name when
/// it matches.
fn reslot(variable: String, call_name: &str, call_rets: &[String], call_args: &[String]) -> String {
    if call_rets.iter().any(|r| r == &variable) {
        return format!("{call_name}_0");
    }
    if let Some(i) = call_args.iter().position(|a| a == &variable) {
        return format!("{call_name}_{}", i + 1);
    }
    variable
}

fn is_slot_of(name: &str, call_name: &str) -> bool {
    name.starts_with(&format!("{call_name}_"))
}

/// Fold the normalized token stream into a [`Formula`].
pub fn build(inputs: &FormulaInputs, call_name: &str) -> Result<Formula, FormulaError> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut int_vars = BTreeSet::new();
    let mut real_vars = BTreeSet::new();
    let mut bool_vars = BTreeSet::new();

    macro_rules! pop2 {
        () => {{
            if stack.len() < 2 {
                return Err(FormulaError("wrong tree".to_string()));
            }
            let b = stack.pop().unwrap();
            let a = stack.pop().unwrap();
            (a, b)
        }};
    }

    for tok in &inputs.tokens {
        match tok {
            ExprToken::IntLit(text) => {
                let v: i64 = text.parse().map_err(|_| FormulaError("bad int literal".into()))?;
                stack.push(Frame {
                    node: FormulaNode::IntLit(v),
                    is_bool: false,
                });
            }
            ExprToken::FloatLit(text) => {
                stack.push(Frame {
                    node: FormulaNode::RealLit(text.clone()),
                    is_bool: false,
                });
            }
            ExprToken::Ternary => {
                return Err(FormulaError("?: operator".to_string()));
            }
            ExprToken::Binary(op) => {
                let (a, b) = pop2!();
                match op {
                    BinOp::Mul => stack.push(Frame { node: FormulaNode::Mul(Box::new(a.node), Box::new(b.node)), is_bool: false }),
                    BinOp::Div => stack.push(Frame { node: FormulaNode::Div(Box::new(a.node), Box::new(b.node)), is_bool: false }),
                    BinOp::Rem => stack.push(Frame { node: FormulaNode::Rem(Box::new(a.node), Box::new(b.node)), is_bool: false }),
                    BinOp::Add => stack.push(Frame { node: FormulaNode::Add(Box::new(a.node), Box::new(b.node)), is_bool: false }),
                    BinOp::Sub => stack.push(Frame { node: FormulaNode::Sub(Box::new(a.node), Box::new(b.node)), is_bool: false }),
                    BinOp::Lt => stack.push(Frame { node: FormulaNode::Lt(Box::new(a.node), Box::new(b.node)), is_bool: true }),
                    BinOp::Gt => stack.push(Frame { node: FormulaNode::Gt(Box::new(a.node), Box::new(b.node)), is_bool: true }),
                    BinOp::Le => stack.push(Frame { node: FormulaNode::Le(Box::new(a.node), Box::new(b.node)), is_bool: true }),
                    BinOp::Ge => stack.push(Frame { node: FormulaNode::Ge(Box::new(a.node), Box::new(b.node)), is_bool: true }),
                    BinOp::Eq | BinOp::Ne => {
                        let mut an = a.node;
                        let mut bn = b.node;
                        if a.is_bool {
                            if let FormulaNode::IntLit(v) = bn {
                                bn = FormulaNode::BoolLit(v != 0);
                            }
                        }
                        if b.is_bool {
                            if let FormulaNode::IntLit(v) = an {
                                an = FormulaNode::BoolLit(v != 0);
                            }
                        }
                        let node = if *op == BinOp::Eq {
                            FormulaNode::Eq(Box::new(an), Box::new(bn))
                        } else {
                            FormulaNode::Ne(Box::new(an), Box::new(bn))
                        };
                        stack.push(Frame { node, is_bool: true });
                    }
                    BinOp::And | BinOp::Or => {
                        let an = if a.is_bool { a.node } else { FormulaNode::Ne(Box::new(a.node), Box::new(FormulaNode::IntLit(0))) };
                        let bn = if b.is_bool { b.node } else { FormulaNode::Ne(Box::new(b.node), Box::new(FormulaNode::IntLit(0))) };
                        let node = if *op == BinOp::And {
                            FormulaNode::And(Box::new(an), Box::new(bn))
                        } else {
                            FormulaNode::Or(Box::new(an), Box::new(bn))
                        };
                        stack.push(Frame { node, is_bool: true });
                    }
                    BinOp::Assign => stack.push(Frame { node: b.node, is_bool: b.is_bool }),
                    BinOp::Other(name) => {
                        return Err(FormulaError(format!("unsupport binary operator: {name}")));
                    }
                }
            }
            ExprToken::Member | ExprToken::Array => {
                let (a, b) = pop2!();
                let at = leaf_text(&a.node).ok_or_else(|| FormulaError("member/array operand not a simple identifier".to_string()))?;
                let bt = leaf_text(&b.node).ok_or_else(|| FormulaError("member/array operand not a simple identifier".to_string()))?;
                let variable = if matches!(tok, ExprToken::Member) {
                    format!("{bt}_{at}")
                } else {
                    format!("{at}_{bt}_")
                };
                let variable = reslot(variable, call_name, &inputs.call_rets, &inputs.call_args);
                stack.push(Frame { node: FormulaNode::Var(variable), is_bool: false });
            }
            ExprToken::Unary(op) => {
                if stack.is_empty() {
                    return Err(FormulaError("wrong tree".to_string()));
                }
                let c = stack.pop().unwrap();
                match op {
                    UnOp::Plus => stack.push(Frame { node: c.node, is_bool: false }),
                    UnOp::Minus => stack.push(Frame { node: FormulaNode::Neg(Box::new(c.node)), is_bool: false }),
                    UnOp::Not => {
                        let inner = if c.is_bool { c.node } else { FormulaNode::Ne(Box::new(c.node), Box::new(FormulaNode::IntLit(0))) };
                        stack.push(Frame { node: FormulaNode::Not(Box::new(inner)), is_bool: true });
                    }
                    UnOp::VariableInt => {
                        if let FormulaNode::Var(name) = &c.node {
                            if is_slot_of(name, call_name) {
                                int_vars.insert(name.clone());
                            }
                        }
                        stack.push(Frame { node: c.node, is_bool: false });
                    }
                    UnOp::VariableBool => {
                        if let FormulaNode::Var(name) = &c.node {
                            if is_slot_of(name, call_name) {
                                bool_vars.insert(name.clone());
                            }
                        }
                        stack.push(Frame { node: c.node, is_bool: true });
                    }
                    UnOp::VariableFloat => {
                        if let FormulaNode::Var(name) = &c.node {
                            if is_slot_of(name, call_name) {
                                real_vars.insert(name.clone());
                            }
                        }
                        stack.push(Frame { node: c.node, is_bool: false });
                    }
                    UnOp::VariablePointer => {
                        if let FormulaNode::Var(name) = &c.node {
                            if is_slot_of(name, call_name) {
                                bool_vars.insert(name.clone());
                            }
                        }
                        stack.push(Frame { node: c.node, is_bool: true });
                    }
                    UnOp::Other(_) => stack.push(Frame { node: c.node, is_bool: false }),
                }
            }
            ExprToken::Ident(name) => {
                stack.push(Frame { node: FormulaNode::Var(name.clone()), is_bool: false });
            }
        }
    }

    if stack.len() == 1 && !stack[0].is_bool {
        let top = stack.pop().unwrap();
        stack.push(Frame {
            node: FormulaNode::Ne(Box::new(top.node), Box::new(FormulaNode::IntLit(0))),
            is_bool: true,
        });
    }

    if stack.len() != 1 {
        return Err(FormulaError("did not reduce to a single predicate".to_string()));
    }

    Ok(Formula {
        node: stack.pop().unwrap().node,
        int_vars,
        real_vars,
        bool_vars,
    })
}

mod catalog_query;
pub use catalog_query::parse_catalog_query;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_for_formula;
    use crate::model::{CallSite, TOKEN_SEP};

    fn site(call_name: &str, call_str: &str, call_ret: &str, call_arg: &str, tokens: &str) -> CallSite {
        let call_arg_count = if call_arg == "-" { 0 } else { call_arg.split(TOKEN_SEP).count() as i64 };
        let expr_tokens_count = if tokens == "-" { 0 } else { tokens.split(TOKEN_SEP).count() as i64 };
        CallSite {
            id: 1,
            branch_id: 1,
            domain: "d".into(),
            project: "p".into(),
            call_name: call_name.into(),
            call_def_loc: "loc".into(),
            call_id: "c1".into(),
            call_str: call_str.into(),
            call_ret: call_ret.into(),
            call_arg: call_arg.into(),
            call_arg_count,
            expr_tokens: tokens.into(),
            expr_tokens_count,
            path_number_vec: "-".into(),
            log_name: "log".into(),
            log_def_loc: "logloc".into(),
            log_id: "l1".into(),
            log_str: "log()".into(),
        }
    }

    #[test]
    fn simple_equality_against_zero() {
        let s = site(
            "foo",
            "foo()",
            "-",
            "-",
            &format!("foo(){TOKEN_SEP}VARIABLE_INT{TOKEN_SEP}0{TOKEN_SEP}BO_13_=="),
        );
        let inputs = normalize_for_formula(&s).unwrap();
        let formula = build(&inputs, "foo").unwrap();
        assert_eq!(formula.cache_key(), "(foo_0==0)");
        assert!(formula.int_vars.contains("foo_0"));
    }

    #[test]
    fn top_level_non_bool_gets_wrapped() {
        let s = site(
            "foo",
            "foo()",
            "-",
            "-",
            &format!("foo(){TOKEN_SEP}VARIABLE_INT"),
        );
        let inputs = normalize_for_formula(&s).unwrap();
        let formula = build(&inputs, "foo").unwrap();
        assert_eq!(formula.cache_key(), "(foo_0!=0)");
    }

    #[test]
    fn ternary_is_rejected() {
        let s = site("foo", "foo()", "-", "-", ":?");
        let inputs = normalize_for_formula(&s).unwrap();
        let err = build(&inputs, "foo").unwrap_err();
        assert_eq!(err.0, "?: operator");
    }

    #[test]
    fn unknown_binary_tag_is_rejected() {
        let s = site(
            "foo",
            "foo()",
            "-",
            "-",
            &format!("1{TOKEN_SEP}2{TOKEN_SEP}BO_99_weird"),
        );
        let inputs = normalize_for_formula(&s).unwrap();
        let err = build(&inputs, "foo").unwrap_err();
        assert!(err.0.starts_with("unsupport binary operator"));
    }

    #[test]
    fn logical_and_wraps_nonbool_operands() {
        let s = site(
            "foo",
            "foo(x)",
            "-",
            "x",
            &format!("foo(x){TOKEN_SEP}VARIABLE_INT{TOKEN_SEP}x{TOKEN_SEP}VARIABLE_INT{TOKEN_SEP}BO_18_&&"),
        );
        let inputs = normalize_for_formula(&s).unwrap();
        let formula = build(&inputs, "foo").unwrap();
        assert_eq!(formula.cache_key(), "And((foo_0!=0),(foo_1!=0))");
    }

    #[test]
    fn ensure_sort_is_exclusive_across_sets() {
        let mut f = Formula {
            node: FormulaNode::BoolLit(true),
            int_vars: BTreeSet::new(),
            real_vars: BTreeSet::new(),
            bool_vars: BTreeSet::from(["foo_0".to_string()]),
        };
        f.ensure_sort("foo_0", Sort::Int);
        assert!(f.int_vars.contains("foo_0"));
        assert!(!f.bool_vars.contains("foo_0"));
        assert!(!f.real_vars.contains("foo_0"));
    }
}
