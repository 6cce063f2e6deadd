//! The expression tree: a tagged-variant `ExprNode` in place of a C-style
//! union of nullable fields.
//!
//! Each variant only carries the fields that type actually needs — there is
//! no `ExprNode` that can be constructed with a dangling regex on an `ALL`
//! node, for instance.

use std::rc::Rc;
use std::time::Duration;

use regex::Regex;

use crate::error::{MdsortError, Result};

/// Per-pattern capture post-processing, independent of the regex engine's
/// own case-insensitivity flag (`ICASE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseConv {
    None,
    Lower,
    Upper,
}

/// A compiled regex plus the bookkeeping `HEADER`/`BODY` need: how many
/// capture groups it has (so `\N` back-references can be bounds-checked)
/// and how captures get case-converted before being stored in a match
/// record.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    pub regex: Regex,
    pub arity: usize,
    pub case_conv: CaseConv,
}

impl Pattern {
    pub fn compile(source: &str, icase: bool, case_conv: CaseConv) -> Result<Pattern> {
        let pattern_src = if icase {
            format!("(?i){}", source)
        } else {
            source.to_string()
        };
        let regex = Regex::new(&pattern_src).map_err(|e| {
            MdsortError::config(format!("{}: invalid regular expression: {}", source, e))
        })?;
        let arity = regex.captures_len().saturating_sub(1);
        Ok(Pattern {
            source: source.to_string(),
            regex,
            arity,
            case_conv,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOp {
    Before,
    After,
}

/// `exec`'s stdin wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    Off,
    Message,
    Body,
}

/// One node of an expression tree. Immutable once built; evaluation
/// (`eval.rs`) only ever reads from it and writes to a separate match list.
#[derive(Debug, Clone)]
pub enum ExprNode {
    And(Rc<ExprNode>, Rc<ExprNode>),
    Or(Rc<ExprNode>, Rc<ExprNode>),
    Neg(Rc<ExprNode>),
    All,
    /// The root of one rule branch: `MATCH(children…)`.
    Match(Vec<Rc<ExprNode>>),

    Header { keys: Vec<String>, pattern: Pattern },
    Body { pattern: Pattern },
    New,
    Old,
    /// Predicate; `path_template` may contain back-references/macros,
    /// interpolated eagerly rather than deferred to the action-resolution
    /// pass, since its boolean result feeds `AND`/`OR` short-circuiting
    /// immediately.
    Stat { path_template: String },
    /// Predicate; compares a parsed header date against `now - delta`.
    Date { field: String, op: DateOp, delta: Duration },

    Move { dest_template: String },
    Flag { subdir_template: String },
    Discard,
    Label { templates: Vec<String> },
    Reject,
    Exec { argv_templates: Vec<String>, stdin: StdinMode },
}

impl ExprNode {
    /// Only `HEADER`/`BODY` predicates produce captures a back-reference can
    /// resolve against. `STAT`/`DATE` are predicates too but carry no
    /// captures.
    pub fn is_interpolate_capable(&self) -> bool {
        matches!(self, ExprNode::Header { .. } | ExprNode::Body { .. })
    }

    pub fn is_action(&self) -> bool {
        matches!(
            self,
            ExprNode::Move { .. }
                | ExprNode::Flag { .. }
                | ExprNode::Discard
                | ExprNode::Label { .. }
                | ExprNode::Reject
                | ExprNode::Exec { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_arity_counts_capture_groups() {
        let p = Pattern::compile(r"(\S+)@(\S+)", false, CaseConv::None).unwrap();
        assert_eq!(p.arity, 2);
    }

    #[test]
    fn pattern_icase_prefixes_flag() {
        let p = Pattern::compile("bob", true, CaseConv::None).unwrap();
        assert!(p.regex.is_match("BOB"));
    }

    #[test]
    fn pattern_rejects_invalid_regex() {
        assert!(Pattern::compile("(unclosed", false, CaseConv::None).is_err());
    }

    #[test]
    fn interpolate_capability_limited_to_header_and_body() {
        let header = ExprNode::Header {
            keys: vec!["To".into()],
            pattern: Pattern::compile("x", false, CaseConv::None).unwrap(),
        };
        assert!(header.is_interpolate_capable());
        assert!(!ExprNode::New.is_interpolate_capable());
        assert!(!ExprNode::Stat { path_template: "x".into() }.is_interpolate_capable());
    }

    #[test]
    fn action_classification() {
        assert!(ExprNode::Discard.is_action());
        assert!(!ExprNode::All.is_action());
    }
}
