//! Core type definitions shared across the mining pipeline.

use std::fmt;

/// The 5-byte token separator used by the upstream extractor inside
/// `call_ret`, `call_arg`, and `expr_tokens` columns.
pub const TOKEN_SEP: &str = "#-_-#";

/// A single guarded call-site row read from `branch_call`.
///
/// Named fields are used rather than positional tuple access: the upstream
/// schema's exact column order is an implementation detail of the extractor,
/// not a contract this crate needs to reproduce bit-for-bit, as long as the
/// same semantic positions are consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Unique row id.
    pub id: i64,
    /// Branch identifier shared by all call sites under the same `if`.
    pub branch_id: i64,
    /// Source analysis domain (a logical grouping the extractor assigns).
    pub domain: String,
    /// Project the call site was extracted from.
    pub project: String,
    /// Name of the callee `F`.
    pub call_name: String,
    /// Definition location of `F` (header path, or similar stable key).
    pub call_def_loc: String,
    /// Opaque id of the call expression itself.
    pub call_id: String,
    /// Textual form of the call, e.g. `foo(x, y)`.
    pub call_str: String,
    /// Raw `#-_-#`-joined return-value alternates (may be empty: `"-"`).
    pub call_ret: String,
    /// Raw `#-_-#`-joined argument expressions (may be empty: `"-"`).
    pub call_arg: String,
    /// Declared argument count; must equal the split `call_arg` length.
    pub call_arg_count: i64,
    /// Raw `#-_-#`-joined post-order token stream of the guard condition.
    pub expr_tokens: String,
    /// Declared token count; must equal the split `expr_tokens` length.
    pub expr_tokens_count: i64,
    /// Opaque path-number vector, passed through to the output row unparsed.
    pub path_number_vec: String,
    /// Name of the post-branch "log" function.
    pub log_name: String,
    /// Definition location of the log function.
    pub log_def_loc: String,
    /// Opaque id of the log invocation.
    pub log_id: String,
    /// Textual form of the log invocation.
    pub log_str: String,
}

/// `(name, definition location)` key identifying a function in the static
/// call graph or in `branch_call`'s `log_name`/`log_def_loc` pair.
pub type FunctionKey = (String, String);

/// Return value domain declared by a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// The function returns an integer; its `F_0` slot is declared `Int`.
    Int,
    /// The function returns a pointer; its `F_0` slot is modelled as `Bool`
    /// (null vs non-null), not as an integer sort. Intentional, not a
    /// simplification to fix.
    Pointer,
}

impl std::str::FromStr for ReturnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INT" => Ok(ReturnType::Int),
            "POINTER" => Ok(ReturnType::Pointer),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ReturnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnType::Int => write!(f, "INT"),
            ReturnType::Pointer => write!(f, "POINTER"),
        }
    }
}

/// The SMT sort a free variable is declared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sort {
    /// Mapped to `Int`.
    Int,
    /// Mapped to `Real`.
    Real,
    /// Mapped to `Bool`.
    Bool,
}

/// Label assigned to an equivalence class (or orphan site).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathIntention {
    /// No catalog entry for `F`: the class is unlabelled by construction.
    Uncheck,
    /// A solver failure, or an outcome that didn't match any of the four
    /// implication tests.
    Unknown,
    /// The class's predicate is logically equivalent to `F`'s normal
    /// predicate.
    Normal,
    /// The class's predicate implies the normal predicate but not the
    /// reverse (a strict sub-domain of NORMAL).
    SubNormal,
    /// The class's predicate is logically equivalent to `F`'s error
    /// predicate.
    Error,
    /// The class's predicate implies the error predicate but not the
    /// reverse (a strict sub-domain of ERROR).
    SubError,
}

impl fmt::Display for PathIntention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PathIntention::Uncheck => "UNCHECK",
            PathIntention::Unknown => "UNKNOWN",
            PathIntention::Normal => "NORMAL",
            PathIntention::SubNormal => "SUB-NORMAL",
            PathIntention::Error => "ERROR",
            PathIntention::SubError => "SUB-ERROR",
        };
        write!(f, "{s}")
    }
}

/// One of the nine post-branch function actions the BFS classifier looks
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Terminates the process (`exit`, `abort`, ...).
    Exit,
    /// Writes diagnostic output (`fprintf`, `syslog`, ...).
    Output,
    /// Releases heap memory (`free`).
    Free,
    /// Removes a filesystem entry (`unlink`, `rmdir`, ...).
    Delete,
    /// Closes a handle (`close`, `fclose`, ...).
    Close,
    /// Returns from the enclosing function.
    Return,
    /// Jumps via `goto`.
    Goto,
    /// Breaks out of a loop.
    Break,
    /// Continues a loop.
    Continue,
}

impl ActionKind {
    /// All nine kinds, in the fixed order the BFS classifier runs them.
    pub const ALL: [ActionKind; 9] = [
        ActionKind::Exit,
        ActionKind::Output,
        ActionKind::Free,
        ActionKind::Delete,
        ActionKind::Close,
        ActionKind::Return,
        ActionKind::Goto,
        ActionKind::Break,
        ActionKind::Continue,
    ];

    /// The six kinds the similarity scorer accumulates weight over. Narrower
    /// than [`ActionKind::ALL`] by design: the upstream
    /// `get_intent_weights` never scores goto/break/continue.
    pub const SIMILARITY: [ActionKind; 6] = [
        ActionKind::Exit,
        ActionKind::Output,
        ActionKind::Free,
        ActionKind::Delete,
        ActionKind::Close,
        ActionKind::Return,
    ];

    /// Lowercase name used for DB storage, matching the upstream miner.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Exit => "exit",
            ActionKind::Output => "output",
            ActionKind::Free => "free",
            ActionKind::Delete => "delete",
            ActionKind::Close => "close",
            ActionKind::Return => "return",
            ActionKind::Goto => "goto",
            ActionKind::Break => "break",
            ActionKind::Continue => "continue",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row that will be written to `function_action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    /// Post-branch function this record is about.
    pub log: FunctionKey,
    /// Which of the nine actions was matched.
    pub intention: ActionKind,
    /// `->`-joined chain from `log` down to the matching descendant.
    pub trace: String,
    /// Depth at which the action was found (1 = direct match).
    pub level: u32,
}

/// One row that will be written to `function_similarity`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityRecord {
    /// Post-branch function this record is about.
    pub log: FunctionKey,
    /// Action category label (lowercase name, or `"return"` for the
    /// baseline row).
    pub intention: String,
    /// Accumulated weight.
    pub weight: f64,
}

/// A fully-resolved equivalence class (or orphan) ready for storage.
#[derive(Debug, Clone)]
pub struct ClassifiedSite {
    /// The originating call site.
    pub site: CallSite,
    /// `0` for an orphan, otherwise a positive number unique within this
    /// target function's run (not globally unique).
    pub expr_set_id: u32,
    /// Label assigned to the class this site belongs to.
    pub intention: PathIntention,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_type_round_trips_through_display() {
        assert_eq!("INT".parse::<ReturnType>().unwrap().to_string(), "INT");
        assert_eq!(
            "POINTER".parse::<ReturnType>().unwrap().to_string(),
            "POINTER"
        );
        assert!("WEIRD".parse::<ReturnType>().is_err());
    }

    #[test]
    fn path_intention_display_matches_upstream_strings() {
        assert_eq!(PathIntention::SubNormal.to_string(), "SUB-NORMAL");
        assert_eq!(PathIntention::SubError.to_string(), "SUB-ERROR");
        assert_eq!(PathIntention::Uncheck.to_string(), "UNCHECK");
    }

    #[test]
    fn action_kind_all_has_nine_distinct_entries() {
        let names: std::collections::HashSet<_> =
            ActionKind::ALL.iter().map(|a| a.as_str()).collect();
        assert_eq!(names.len(), 9);
    }

    #[test]
    fn similarity_action_set_excludes_control_flow_actions() {
        assert!(!ActionKind::SIMILARITY.contains(&ActionKind::Goto));
        assert!(!ActionKind::SIMILARITY.contains(&ActionKind::Break));
        assert!(!ActionKind::SIMILARITY.contains(&ActionKind::Continue));
    }
}
