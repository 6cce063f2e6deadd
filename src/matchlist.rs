//! The per-evaluation match list: predicate captures and pending actions,
//! merged at append time.
//!
//! Capturing submatches, case conversion, and the action-merge overwrite
//! policy are kept as three separate responsibilities rather than one
//! conflated function: capture/case-conversion happens in `eval.rs` before a
//! `PredicateRecord` is built, and the overwrite policy is this module's
//! `append_move`/`append_flag`, which make "same-type collapses,
//! opposite-type merges" an explicit, named operation.

use std::rc::Rc;

use crate::expr::{ExprNode, StdinMode};
use crate::path;

#[derive(Debug, Clone)]
pub struct Capture {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Recorded by `HEADER`/`BODY` on a match.
#[derive(Debug, Clone, Default)]
pub struct PredicateRecord {
    pub key: Option<String>,
    pub value: Option<String>,
    pub valbeg: usize,
    pub valend: usize,
    pub captures: Vec<Capture>,
}

/// A merged move/flag record. `dest_template`/`subdir_template` are the raw,
/// uninterpolated strings from the originating `MOVE`/`FLAG` node(s);
/// `maildir`/`subdir`/`path` are filled in by the interpolator
/// (`interp.rs`) once back-references and macros have been resolved.
#[derive(Debug, Clone, Default)]
pub struct MoveFlag {
    pub dest_template: Option<String>,
    pub subdir_template: Option<String>,
    pub maildir: Option<String>,
    pub subdir: Option<String>,
    pub path: Option<String>,
}

impl MoveFlag {
    pub fn has_move(&self) -> bool {
        self.dest_template.is_some()
    }

    pub fn has_flag(&self) -> bool {
        self.subdir_template.is_some()
    }

    /// Fill in whichever of `maildir`/`subdir` wasn't supplied by the rule,
    /// from the message's current path. A flag-only record (no accompanying
    /// move) stays in the current Maildir; a move-only record (no
    /// accompanying flag) defaults to `cur` — standard Maildir delivery
    /// semantics, so a bare `move` lands in `cur/` with `S` set.
    pub fn infer_missing(&mut self, current_path: &str) {
        if self.maildir.is_none() && !self.has_move() {
            self.maildir = path::slice(current_path, 0, -2);
        }
        if self.subdir.is_none() && !self.has_flag() {
            self.subdir = Some("cur".to_string());
        }
    }
}

#[derive(Debug, Clone)]
pub enum RecordBody {
    Predicate(PredicateRecord),
    MoveFlag(MoveFlag),
    Discard,
    Label { templates: Vec<String> },
    Reject,
    Exec { argv_templates: Vec<String>, stdin: StdinMode },
}

#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub expr: Rc<ExprNode>,
    pub body: RecordBody,
}

#[derive(Debug, Clone, Default)]
pub struct MatchList {
    records: Vec<MatchRecord>,
}

impl MatchList {
    pub fn new() -> Self {
        MatchList::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    /// A rollback point usable with [`MatchList::truncate`] — taken before
    /// evaluating a branch whose records might need discarding (`OR`'s
    /// non-taken side, anything beneath a failed `NEG`).
    pub fn mark(&self) -> usize {
        self.records.len()
    }

    pub fn truncate(&mut self, mark: usize) {
        self.records.truncate(mark);
    }

    pub fn push_predicate(&mut self, expr: Rc<ExprNode>, record: PredicateRecord) {
        self.records.push(MatchRecord {
            expr,
            body: RecordBody::Predicate(record),
        });
    }

    /// Index of the nearest preceding record, anywhere in the list, whose
    /// originating expr satisfies `is_target` and whose body is a
    /// `MoveFlag` — mirrors `matches_find`'s head-to-tail scan for a match
    /// of a given expr type.
    fn find_moveflag(&self, is_target: impl Fn(&ExprNode) -> bool) -> Option<usize> {
        self.records
            .iter()
            .position(|r| matches!(&r.body, RecordBody::MoveFlag(_)) && is_target(r.expr.as_ref()))
    }

    /// Append a `move` action.
    ///
    /// `matches_merge` draws a hard line between the two cases this mirrors:
    /// a *consecutive* `move` collapses into the immediately preceding
    /// record (checked via the tail only), while a `move` merging with an
    /// earlier `flag` is found by a global scan (`matches_find`) that
    /// doesn't care how many unrelated actions sit in between.
    pub fn append_move(&mut self, expr: Rc<ExprNode>, dest_template: String) {
        if let Some(last) = self.records.last_mut() {
            if matches!(last.expr.as_ref(), ExprNode::Move { .. }) {
                if let RecordBody::MoveFlag(mf) = &mut last.body {
                    mf.dest_template = Some(dest_template);
                    mf.maildir = None;
                    mf.path = None;
                    last.expr = expr;
                    return;
                }
            }
        }
        let mut mf = MoveFlag {
            dest_template: Some(dest_template),
            ..Default::default()
        };
        if let Some(idx) = self.find_moveflag(|e| matches!(e, ExprNode::Flag { .. })) {
            let old = self.records.remove(idx);
            if let RecordBody::MoveFlag(old_mf) = old.body {
                mf.subdir_template = old_mf.subdir_template;
            }
        }
        self.records.push(MatchRecord { expr, body: RecordBody::MoveFlag(mf) });
    }

    /// Append a `flag` action; same merge policy as `append_move`, mirrored.
    pub fn append_flag(&mut self, expr: Rc<ExprNode>, subdir_template: String) {
        if let Some(last) = self.records.last_mut() {
            if matches!(last.expr.as_ref(), ExprNode::Flag { .. }) {
                if let RecordBody::MoveFlag(mf) = &mut last.body {
                    mf.subdir_template = Some(subdir_template);
                    mf.subdir = None;
                    mf.path = None;
                    last.expr = expr;
                    return;
                }
            }
        }
        let mut mf = MoveFlag {
            subdir_template: Some(subdir_template),
            ..Default::default()
        };
        if let Some(idx) = self.find_moveflag(|e| matches!(e, ExprNode::Move { .. })) {
            let old = self.records.remove(idx);
            if let RecordBody::MoveFlag(old_mf) = old.body {
                mf.dest_template = old_mf.dest_template;
            }
        }
        self.records.push(MatchRecord { expr, body: RecordBody::MoveFlag(mf) });
    }

    pub fn append_discard(&mut self, expr: Rc<ExprNode>) {
        self.records.push(MatchRecord {
            expr,
            body: RecordBody::Discard,
        });
    }

    pub fn append_label(&mut self, expr: Rc<ExprNode>, templates: Vec<String>) {
        self.records.push(MatchRecord {
            expr,
            body: RecordBody::Label { templates },
        });
    }

    pub fn append_reject(&mut self, expr: Rc<ExprNode>) {
        self.records.push(MatchRecord {
            expr,
            body: RecordBody::Reject,
        });
    }

    pub fn append_exec(&mut self, expr: Rc<ExprNode>, argv_templates: Vec<String>, stdin: StdinMode) {
        self.records.push(MatchRecord {
            expr,
            body: RecordBody::Exec { argv_templates, stdin },
        });
    }

    /// Invariant (iv): scan backwards from just before `before_index` for
    /// the nearest record produced by an `INTERPOLATE`-capable predicate.
    pub fn nearest_captures(&self, before_index: usize) -> Option<&[Capture]> {
        self.records[..before_index]
            .iter()
            .rev()
            .find_map(|r| match &r.body {
                RecordBody::Predicate(p) if r.expr.is_interpolate_capable() => Some(p.captures.as_slice()),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CaseConv, Pattern};

    fn header_node() -> Rc<ExprNode> {
        Rc::new(ExprNode::Header {
            keys: vec!["To".into()],
            pattern: Pattern::compile("x", false, CaseConv::None).unwrap(),
        })
    }

    fn move_node(dest: &str) -> Rc<ExprNode> {
        Rc::new(ExprNode::Move {
            dest_template: dest.to_string(),
        })
    }

    fn flag_node(subdir: &str) -> Rc<ExprNode> {
        Rc::new(ExprNode::Flag {
            subdir_template: subdir.to_string(),
        })
    }

    #[test]
    fn consecutive_moves_collapse_to_last() {
        let mut ml = MatchList::new();
        ml.append_move(move_node("A"), "A".into());
        ml.append_move(move_node("B"), "B".into());
        assert_eq!(ml.len(), 1);
        match &ml.records()[0].body {
            RecordBody::MoveFlag(mf) => assert_eq!(mf.dest_template.as_deref(), Some("B")),
            _ => panic!("expected MoveFlag"),
        }
    }

    #[test]
    fn move_then_flag_merges() {
        let mut ml = MatchList::new();
        ml.append_move(move_node("M2"), "M2".into());
        ml.append_flag(flag_node("new"), "new".into());
        assert_eq!(ml.len(), 1);
        match &ml.records()[0].body {
            RecordBody::MoveFlag(mf) => {
                assert_eq!(mf.dest_template.as_deref(), Some("M2"));
                assert_eq!(mf.subdir_template.as_deref(), Some("new"));
            }
            _ => panic!("expected MoveFlag"),
        }
    }

    #[test]
    fn infer_missing_flag_only_keeps_current_maildir() {
        let mut mf = MoveFlag {
            subdir_template: Some("cur".into()),
            ..Default::default()
        };
        mf.infer_missing("/home/u/Maildir/INBOX/new/123");
        assert_eq!(mf.maildir.as_deref(), Some("/home/u/Maildir/INBOX"));
    }

    #[test]
    fn infer_missing_move_only_defaults_subdir_cur() {
        let mut mf = MoveFlag {
            dest_template: Some("M2".into()),
            ..Default::default()
        };
        mf.infer_missing("/home/u/Maildir/INBOX/new/123");
        assert_eq!(mf.subdir.as_deref(), Some("cur"));
    }

    #[test]
    fn nearest_captures_scans_backwards_over_non_interpolating_records() {
        let mut ml = MatchList::new();
        ml.push_predicate(
            header_node(),
            PredicateRecord {
                captures: vec![Capture { start: 0, end: 1, text: "a".into() }],
                ..Default::default()
            },
        );
        ml.append_discard(Rc::new(ExprNode::Discard));
        let found = ml.nearest_captures(ml.len());
        assert_eq!(found.unwrap()[0].text, "a");
    }

    #[test]
    fn unrelated_action_between_move_and_flag_still_merges() {
        let mut ml = MatchList::new();
        ml.append_move(move_node("M2"), "M2".into());
        ml.append_discard(Rc::new(ExprNode::Discard));
        ml.append_flag(flag_node("new"), "new".into());
        assert_eq!(ml.len(), 2);
        match &ml.records()[0].body {
            RecordBody::Discard => {}
            _ => panic!("expected discard to remain in place"),
        }
        match &ml.records()[1].body {
            RecordBody::MoveFlag(mf) => {
                assert_eq!(mf.dest_template.as_deref(), Some("M2"));
                assert_eq!(mf.subdir_template.as_deref(), Some("new"));
            }
            _ => panic!("expected merged MoveFlag"),
        }
    }
}
