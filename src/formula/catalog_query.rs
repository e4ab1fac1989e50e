//! Parser for the return-semantics catalog's `NormalQuery`/`ErrorQuery`
//! fragments: predicates that reference the slot `<call_name>_0`,
//! §4.F: these fragments are combined with the site's own built formula via
//! `And`/`Or`). The catalog ships small boolean fragments like `malloc_0`,
//! `Not(malloc_0)`, or `foo_0==0` — a tiny expression language distinct from
//! the post-order token stream §4.D folds, so it gets its own
//! recursive-descent parser rather than being routed through [`super::build`].

use super::{Formula, FormulaError, FormulaNode};
use std::collections::BTreeSet;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Int(i64),
    EqEq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    Bang,
    Comma,
    LParen,
    RParen,
}

fn lex(text: &str) -> Result<Vec<Tok>, FormulaError> {
    let mut chars: Peekable<Chars> = text.chars().peekable();
    let mut toks = Vec::new();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                toks.push(Tok::Comma);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::EqEq);
                } else {
                    return Err(FormulaError("unsupported `=` in catalog query".into()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ne);
                } else {
                    toks.push(Tok::Bang);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Le);
                } else {
                    toks.push(Tok::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ge);
                } else {
                    toks.push(Tok::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    toks.push(Tok::AndAnd);
                } else {
                    return Err(FormulaError("unsupported `&` in catalog query".into()));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    toks.push(Tok::OrOr);
                } else {
                    return Err(FormulaError("unsupported `|` in catalog query".into()));
                }
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let v: i64 = s.parse().map_err(|_| FormulaError(format!("bad integer literal `{s}`")))?;
                toks.push(Tok::Int(v));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Ident(s));
            }
            other => {
                return Err(FormulaError(format!("unexpected character `{other}` in catalog query")));
            }
        }
    }
    Ok(toks)
}

struct Parser<'a> {
    toks: &'a [Tok],
    pos: usize,
    int_vars: BTreeSet<String>,
    bool_vars: BTreeSet<String>,
    slot: &'a str,
}

struct Typed {
    node: FormulaNode,
    is_bool: bool,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: &Tok) -> Result<(), FormulaError> {
        match self.bump() {
            Some(t) if &t == want => Ok(()),
            other => Err(FormulaError(format!("expected {want:?}, found {other:?}"))),
        }
    }

    fn parse_or(&mut self) -> Result<Typed, FormulaError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Tok::OrOr) {
            self.bump();
            let right = self.parse_and()?;
            left = self.to_bool(left);
            let right = self.to_bool(right);
            left = Typed {
                node: FormulaNode::Or(Box::new(left.node), Box::new(right.node)),
                is_bool: true,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Typed, FormulaError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Tok::AndAnd) {
            self.bump();
            let right = self.parse_unary()?;
            left = self.to_bool(left);
            let right = self.to_bool(right);
            left = Typed {
                node: FormulaNode::And(Box::new(left.node), Box::new(right.node)),
                is_bool: true,
            };
        }
        Ok(left)
    }

    fn to_bool(&self, t: Typed) -> Typed {
        if t.is_bool {
            t
        } else {
            Typed {
                node: FormulaNode::Ne(Box::new(t.node), Box::new(FormulaNode::IntLit(0))),
                is_bool: true,
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Typed, FormulaError> {
        match self.peek() {
            Some(Tok::Bang) => {
                self.bump();
                let inner = self.parse_unary()?;
                let inner = self.to_bool(inner);
                Ok(Typed { node: FormulaNode::Not(Box::new(inner.node)), is_bool: true })
            }
            Some(Tok::Ident(name)) if name == "Not" => {
                self.bump();
                self.expect(&Tok::LParen)?;
                let inner = self.parse_or()?;
                self.expect(&Tok::RParen)?;
                let inner = self.to_bool(inner);
                Ok(Typed { node: FormulaNode::Not(Box::new(inner.node)), is_bool: true })
            }
            Some(Tok::Ident(name)) if name == "And" || name == "Or" => {
                let is_and = name == "And";
                self.bump();
                self.expect(&Tok::LParen)?;
                let a = self.parse_or()?;
                self.expect(&Tok::Comma)?;
                let b = self.parse_or()?;
                self.expect(&Tok::RParen)?;
                let a = self.to_bool(a);
                let b = self.to_bool(b);
                let node = if is_and {
                    FormulaNode::And(Box::new(a.node), Box::new(b.node))
                } else {
                    FormulaNode::Or(Box::new(a.node), Box::new(b.node))
                };
                Ok(Typed { node, is_bool: true })
            }
            _ => self.parse_rel(),
        }
    }

    fn parse_rel(&mut self) -> Result<Typed, FormulaError> {
        let left = self.parse_atom()?;
        let op = match self.peek() {
            Some(Tok::EqEq) => Some(false),
            Some(Tok::Ne) => Some(true),
            Some(Tok::Lt) | Some(Tok::Gt) | Some(Tok::Le) | Some(Tok::Ge) => {
                let tok = self.bump().unwrap();
                let right = self.parse_atom()?;
                let node = match tok {
                    Tok::Lt => FormulaNode::Lt(Box::new(left.node), Box::new(right.node)),
                    Tok::Gt => FormulaNode::Gt(Box::new(left.node), Box::new(right.node)),
                    Tok::Le => FormulaNode::Le(Box::new(left.node), Box::new(right.node)),
                    Tok::Ge => FormulaNode::Ge(Box::new(left.node), Box::new(right.node)),
                    _ => unreachable!(),
                };
                return Ok(Typed { node, is_bool: true });
            }
            _ => None,
        };
        let Some(negate) = op else { return Ok(left) };
        self.bump();
        let right = self.parse_atom()?;
        let node = if negate {
            FormulaNode::Ne(Box::new(left.node), Box::new(right.node))
        } else {
            FormulaNode::Eq(Box::new(left.node), Box::new(right.node))
        };
        Ok(Typed { node, is_bool: true })
    }

    fn parse_atom(&mut self) -> Result<Typed, FormulaError> {
        match self.bump() {
            Some(Tok::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Int(v)) => Ok(Typed { node: FormulaNode::IntLit(v), is_bool: false }),
            Some(Tok::Ident(name)) if name == "True" => Ok(Typed { node: FormulaNode::BoolLit(true), is_bool: true }),
            Some(Tok::Ident(name)) if name == "False" => Ok(Typed { node: FormulaNode::BoolLit(false), is_bool: true }),
            Some(Tok::Ident(name)) => {
                if name == self.slot {
                    self.bool_vars.insert(name.clone());
                } else {
                    self.int_vars.insert(name.clone());
                }
                Ok(Typed { node: FormulaNode::Var(name), is_bool: name == self.slot })
            }
            other => Err(FormulaError(format!("unexpected token in catalog query: {other:?}"))),
        }
    }
}

/// Parse a catalog `NormalQuery`/`ErrorQuery` fragment into a [`Formula`].
/// `slot` is the `<call_name>_0` variable the fragment is written in terms
/// of; it is declared `Bool` (pointer-as-Bool, or a direct boolean fragment)
/// while any other identifier the fragment happens to mention is declared
/// `Int` — catalog fragments are not expected to reference anything but
/// `slot`, but this keeps a stray identifier from panicking the solver
/// declaration step.
pub fn parse_catalog_query(text: &str, slot: &str) -> Result<Formula, FormulaError> {
    let toks = lex(text)?;
    let mut parser = Parser {
        toks: &toks,
        pos: 0,
        int_vars: BTreeSet::new(),
        bool_vars: BTreeSet::new(),
        slot,
    };
    let parsed = parser.parse_or()?;
    if parser.pos != toks.len() {
        return Err(FormulaError(format!("trailing tokens in catalog query `{text}`")));
    }
    let typed = parser.to_bool(parsed);
    Ok(Formula {
        node: typed.node,
        int_vars: parser.int_vars,
        real_vars: BTreeSet::new(),
        bool_vars: parser.bool_vars,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_slot_is_a_bool_predicate() {
        let f = parse_catalog_query("malloc_0", "malloc_0").unwrap();
        assert_eq!(f.cache_key(), "malloc_0");
        assert!(f.bool_vars.contains("malloc_0"));
    }

    #[test]
    fn not_wraps_bare_slot() {
        let f = parse_catalog_query("Not(malloc_0)", "malloc_0").unwrap();
        assert_eq!(f.cache_key(), "Not(malloc_0)");
    }

    #[test]
    fn equality_fragment_parses() {
        let f = parse_catalog_query("foo_0==0", "foo_0").unwrap();
        assert_eq!(f.cache_key(), "(foo_0==0)");
    }

    #[test]
    fn inequality_fragment_parses() {
        let f = parse_catalog_query("foo_0!=0", "foo_0").unwrap();
        assert_eq!(f.cache_key(), "(foo_0!=0)");
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse_catalog_query("foo_0==0 0", "foo_0").is_err());
    }
}
