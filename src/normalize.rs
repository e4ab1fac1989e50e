//! Expression normalizer (component C).
//!
//! Converts a call site's raw post-order token stream into a canonical form
//! where tokens that denote the callee's return value or arguments are
//! rewritten to stable slot names `F_0 .. F_n`. Returns an empty token list
//! to signal "unusable" (declared/actual count mismatch, or an empty AST).

use crate::model::{CallSite, TOKEN_SEP};

/// Binary operator recovered from a `BO_<k>_<op>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Assign,
    /// A binary tag this miner doesn't recognize; the formula builder
    /// aborts on any other binary tag.
    Other(String),
}

/// Unary operator recovered from a `UO_<k>_<op>` tag, or one of the
/// `VARIABLE_<SORT>` sort-annotation tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Minus,
    Not,
    VariableInt,
    VariableBool,
    VariableFloat,
    VariablePointer,
    /// Any other unary tag passes through as a non-bool no-op.
    Other(String),
}

/// A single canonicalized token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprToken {
    /// An integer literal, preserved as written (all-digit text).
    IntLit(String),
    /// A floating point literal.
    FloatLit(String),
    /// The unsupported ternary marker `:?`.
    Ternary,
    /// A binary operator tag.
    Binary(BinOp),
    /// A unary operator tag (includes `VARIABLE_*` sort annotations).
    Unary(UnOp),
    /// A `MEMBER` access tag.
    Member,
    /// An `ARRAY` access tag.
    Array,
    /// A leaf identifier or slot name (`F_0`, `F_i`, or an un-slotted raw
    /// identifier left untouched because it matched none of the callee's
    /// return/argument expressions).
    Ident(String),
}

/// Split a `#-_-#`-joined column, honoring the "leading `-` means empty
/// list" convention, and validate the declared count. Returns `None` when
/// the declared count disagrees with the actual split length.
fn split_declared(raw: &str, declared_count: i64) -> Option<Vec<String>> {
    let mut parts: Vec<String> = raw.split(TOKEN_SEP).map(str::to_string).collect();
    if parts.first().map(String::as_str) == Some("-") {
        parts.remove(0);
    }
    if parts.len() as i64 != declared_count {
        return None;
    }
    Some(parts)
}

/// Strip a leading run of `&`/`*` sigils, keeping at least one character.
fn strip_sigils(s: &str) -> &str {
    let mut rest = s;
    while rest.len() > 1 {
        let first = rest.as_bytes()[0];
        if first == b'&' || first == b'*' {
            rest = &rest[1..];
        } else {
            break;
        }
    }
    rest
}

fn is_int_literal(tok: &str) -> bool {
    !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit())
}

fn is_float_literal(tok: &str) -> bool {
    tok.parse::<f64>().is_ok()
}

/// Parse a `<prefix>_<k>_<op>` tag, returning the numeric code and operator
/// text.
fn parse_tagged(tok: &str, prefix: &str) -> Option<(u32, String)> {
    let rest = tok.strip_prefix(prefix)?;
    let mut parts = rest.splitn(2, '_');
    let code: u32 = parts.next()?.parse().ok()?;
    let op = parts.next()?.to_string();
    Some((code, op))
}

fn classify_bin_op(code: u32, op: &str) -> BinOp {
    match (code, op) {
        (2, "*") => BinOp::Mul,
        (3, "/") => BinOp::Div,
        (4, "%") => BinOp::Rem,
        (5, "+") => BinOp::Add,
        (6, "-") => BinOp::Sub,
        (9, "<") => BinOp::Lt,
        (10, ">") => BinOp::Gt,
        (11, "<=") => BinOp::Le,
        (12, ">=") => BinOp::Ge,
        (13, "==") => BinOp::Eq,
        (14, "!=") => BinOp::Ne,
        (18, "&&") => BinOp::And,
        (19, "||") => BinOp::Or,
        (20, "=") => BinOp::Assign,
        _ => BinOp::Other(op.to_string()),
    }
}

fn classify_un_op(code: u32, op: &str) -> UnOp {
    match (code, op) {
        (6, "+") => UnOp::Plus,
        (7, "-") => UnOp::Minus,
        (9, "!") => UnOp::Not,
        _ => UnOp::Other(op.to_string()),
    }
}

/// Classify one raw token into its [`ExprToken`] shape. Slot renaming is a
/// separate pass (see [`normalize`]): this only recognizes tag *forms*.
fn classify(tok: &str) -> ExprToken {
    if tok == ":?" {
        return ExprToken::Ternary;
    }
    if tok == "MEMBER" {
        return ExprToken::Member;
    }
    if tok == "ARRAY" {
        return ExprToken::Array;
    }
    match tok {
        "VARIABLE_INT" => return ExprToken::Unary(UnOp::VariableInt),
        "VARIABLE_BOOL" => return ExprToken::Unary(UnOp::VariableBool),
        "VARIABLE_FLOAT" => return ExprToken::Unary(UnOp::VariableFloat),
        "VARIABLE_POINTER" => return ExprToken::Unary(UnOp::VariablePointer),
        _ => {}
    }
    if let Some((code, op)) = parse_tagged(tok, "BO_") {
        return ExprToken::Binary(classify_bin_op(code, &op));
    }
    if let Some((code, op)) = parse_tagged(tok, "UO_") {
        return ExprToken::Unary(classify_un_op(code, &op));
    }
    if is_int_literal(tok) {
        return ExprToken::IntLit(tok.to_string());
    }
    if is_float_literal(tok) {
        return ExprToken::FloatLit(tok.to_string());
    }
    ExprToken::Ident(tok.to_string())
}

/// Rewrite the `Ident` tokens of an already-classified stream to slot names,
/// given the (possibly sanitized) `call_ret` alternates and `call_arg`
/// expressions to match against.
fn slot_rename(
    tokens: Vec<ExprToken>,
    call_name: &str,
    call_str: &str,
    call_rets: &[String],
    call_args: &[String],
) -> Vec<ExprToken> {
    tokens
        .into_iter()
        .map(|tok| match tok {
            ExprToken::Ident(ident) => ExprToken::Ident(slot_for(
                &ident, call_name, call_str, call_rets, call_args,
            )),
            other => other,
        })
        .collect()
}

/// Resolve one identifier to its slot name, or leave it untouched.
fn slot_for(
    ident: &str,
    call_name: &str,
    call_str: &str,
    call_rets: &[String],
    call_args: &[String],
) -> String {
    if ident == call_str {
        return format!("{call_name}_0");
    }
    if call_rets.iter().any(|r| r == ident) {
        return format!("{call_name}_0");
    }
    if let Some(i) = call_args.iter().position(|a| a == ident) {
        return format!("{call_name}_{}", i + 1);
    }
    ident.to_string()
}

/// The split, sigil-stripped `call_ret` and `call_arg` lists common to both
/// normalization variants.
struct SplitSite {
    call_rets: Vec<String>,
    call_args: Vec<String>,
    tokens_raw: Vec<String>,
}

fn split_site(site: &CallSite) -> Option<SplitSite> {
    let mut call_rets = split_declared(&site.call_ret, count_alternates(&site.call_ret))?;
    for r in &mut call_rets {
        *r = strip_sigils(r).to_string();
    }

    let mut call_args = split_declared(&site.call_arg, site.call_arg_count)?;
    for a in &mut call_args {
        *a = strip_sigils(a).to_string();
    }

    let tokens_raw = split_declared(&site.expr_tokens, site.expr_tokens_count)?;
    if tokens_raw.is_empty() {
        return None;
    }

    Some(SplitSite {
        call_rets,
        call_args,
        tokens_raw,
    })
}

/// `call_ret` doesn't declare its own count column; its length is whatever
/// the split (after dropping a leading `-`) yields.
fn count_alternates(call_ret: &str) -> i64 {
    let mut parts: Vec<&str> = call_ret.split(TOKEN_SEP).collect();
    if parts.first() == Some(&"-") {
        parts.remove(0);
    }
    parts.len() as i64
}

/// Canonicalize a call site's guard expression using the raw `call_ret`/
/// `call_arg` text for slot matching (component C as specified). Returns an
/// empty `Vec` when the site is unusable.
pub fn normalize(site: &CallSite) -> Vec<ExprToken> {
    let Some(split) = split_site(site) else {
        return Vec::new();
    };
    let classified: Vec<ExprToken> = split.tokens_raw.iter().map(|t| classify(t)).collect();
    slot_rename(
        classified,
        &site.call_name,
        &site.call_str,
        &split.call_rets,
        &split.call_args,
    )
}

/// Sanitize a `call_ret`/`call_arg` element for the query builder: replace
/// member/array syntax with underscores so `MEMBER`/`ARRAY` reconstructions
/// during folding can match it textually.
fn sanitize(expr: &str) -> String {
    expr.replace('.', "_")
        .replace("->", "_")
        .replace('[', "_")
        .replace(']', "_")
}

/// The inputs the query builder needs: the canonicalized token stream (slots
/// resolved against the *sanitized* `call_ret`/`call_arg` lists) plus those
/// sanitized lists themselves, for the `MEMBER`/`ARRAY` re-slotting step.
pub struct FormulaInputs {
    /// Canonical token stream for folding.
    pub tokens: Vec<ExprToken>,
    /// Sanitized return-value alternates.
    pub call_rets: Vec<String>,
    /// Sanitized argument expressions.
    pub call_args: Vec<String>,
}

/// Canonicalize a call site's guard expression the way the query builder
/// needs it: `.`, `->`, `[`, `]` are folded to `_` in `call_ret`/`call_arg`
/// before slot matching.
pub fn normalize_for_formula(site: &CallSite) -> Option<FormulaInputs> {
    let split = split_site(site)?;
    let call_rets: Vec<String> = split.call_rets.iter().map(|r| sanitize(r)).collect();
    let call_args: Vec<String> = split.call_args.iter().map(|a| sanitize(a)).collect();
    let classified: Vec<ExprToken> = split.tokens_raw.iter().map(|t| classify(t)).collect();
    let tokens = slot_rename(classified, &site.call_name, &site.call_str, &call_rets, &call_args);
    Some(FormulaInputs {
        tokens,
        call_rets,
        call_args,
    })
}
