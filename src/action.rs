//! Action classifier (component H).
//!
//! For each distinct post-branch "log" function, and for each of the nine
//! action categories independently, runs a bounded breadth-first search over
//! the static call graph: a direct function-name match against the
//! category's lexicon ends the search with a record; an identifier-substring
//! keyword match expands the search to that function's direct callees. Depth
//! is capped at 20.

use std::collections::BTreeMap;

use crate::model::{ActionKind, ActionRecord, FunctionKey};

/// Read-only view of the static call graph the BFS expands over. Backed by
/// `call_graph` in the real store; a `BTreeMap`-backed fake is used in
/// tests.
pub trait CallGraphLookup {
    /// Direct callees `(name, def_loc)` of `(name, def_loc)`.
    fn callees(&self, name: &str, def_loc: &str) -> Vec<FunctionKey>;
}

/// One action category's matching lexicon.
pub struct Lexicon {
    /// Function names that directly count as this action.
    pub functions: &'static [&'static str],
    /// Lowercase substrings that, found in a function name, expand the BFS
    /// through that function rather than stopping at it.
    pub keywords: &'static [&'static str],
}

/// The nine lexicons, indexed by [`ActionKind`]. Carried over verbatim from
/// the upstream miner's `get_function_action` tables (see DESIGN.md) rather
/// than reinvented: these are the exact function/keyword lists it ships.
pub fn lexicon(kind: ActionKind) -> Lexicon {
    match kind {
        ActionKind::Exit => Lexicon {
            functions: &["abort", "exit", "kill", "killpg", "raise", "alarm", "signal"],
            keywords: &["abort", "exit", "die", "kill", "quit", "stop"],
        },
        ActionKind::Output => Lexicon {
            functions: &[
                "printf", "fprintf", "dprintf", "vprintf", "vfprintf", "vdprintf",
                "fputs", "puts", "fwrite", "perror", "psignal", "psiginfo", "syslog",
                "pwrite", "write", "writev", "written", "msgsnd", "send", "sendto", "sendmsg",
            ],
            keywords: &[
                "error", "err", "warn", "alert", "assert", "fail", "crit", "emerg", "out",
                "exit", "die", "halt", "suspend", "wrong", "fatal", "fault", "misplay",
                "damage", "illegal", "exception", "errmsg", "abort", "msg", "record",
                "report", "stop", "quit", "close", "put", "print", "write", "log",
                "message", "dump", "hint", "trace", "notify",
            ],
        },
        ActionKind::Free => Lexicon {
            functions: &["free"],
            keywords: &["free", "clean", "clear"],
        },
        ActionKind::Delete => Lexicon {
            functions: &["remove", "unlink", "unlinkat", "rmdir"],
            keywords: &["rm", "unlink", "del", "clean"],
        },
        ActionKind::Close => Lexicon {
            functions: &["close", "fclose", "pclose", "shutdown", "closelog"],
            keywords: &["close", "shutdown"],
        },
        ActionKind::Return => Lexicon {
            functions: &["return"],
            keywords: &["return"],
        },
        ActionKind::Goto => Lexicon {
            functions: &["goto"],
            keywords: &["goto"],
        },
        ActionKind::Break => Lexicon {
            functions: &["break"],
            keywords: &["break"],
        },
        ActionKind::Continue => Lexicon {
            functions: &["continue"],
            keywords: &["continue"],
        },
    }
}

const TOP: &str = "__TOP__";

/// Run the bounded BFS for one `(log, category)` pair. Returns `None` when
/// no function in the lexicon was reached within `max_depth` levels.
fn classify_one(
    log: &FunctionKey,
    kind: ActionKind,
    lexicon: &Lexicon,
    graph: &dyn CallGraphLookup,
    max_depth: u32,
) -> Option<ActionRecord> {
    let mut parent: BTreeMap<String, String> = BTreeMap::new();
    parent.insert(log.0.clone(), TOP.to_string());

    let mut frontier: Vec<FunctionKey> = vec![log.clone()];
    let mut depth = 0u32;

    while !frontier.is_empty() && depth < max_depth {
        depth += 1;
        let mut next: BTreeMap<String, FunctionKey> = BTreeMap::new();

        for (name, loc) in &frontier {
            if lexicon.functions.contains(&name.as_str()) {
                let trace = reconstruct_trace(&parent, name);
                return Some(ActionRecord {
                    log: log.clone(),
                    intention: kind,
                    trace,
                    level: depth,
                });
            }
            let lower = name.to_lowercase();
            if lexicon.keywords.iter().any(|kw| lower.contains(kw)) {
                for (child_name, child_loc) in graph.callees(name, loc) {
                    parent.insert(child_name.clone(), name.clone());
                    next.insert(child_name.clone(), (child_name, child_loc));
                }
            }
        }

        frontier = next.into_values().collect();
    }

    None
}

/// Reconstruct the `->`-joined chain from the top of the BFS down to
/// `matched`, guarding against cycles in the parent map with a local
/// visited set.
fn reconstruct_trace(parent: &BTreeMap<String, String>, matched: &str) -> String {
    let mut chain = vec![matched.to_string()];
    let mut visited = std::collections::HashSet::new();
    visited.insert(matched.to_string());

    let mut current = matched.to_string();
    loop {
        let Some(next) = parent.get(&current) else { break };
        if next == TOP {
            break;
        }
        if !visited.insert(next.clone()) {
            break;
        }
        chain.push(next.clone());
        current = next.clone();
    }
    chain.reverse();
    chain.join("->")
}

/// Classify one post-branch function against all nine action categories,
/// producing at most one record per category.
pub fn classify(log: &FunctionKey, graph: &dyn CallGraphLookup, max_depth: u32) -> Vec<ActionRecord> {
    let mut records = Vec::new();
    for kind in ActionKind::ALL {
        let lex = lexicon(kind);
        if let Some(record) = classify_one(log, kind, &lex, graph, max_depth) {
            records.push(record);
        }
    }
    records
}
