//! The rule evaluator: walks an `ExprNode` tree against a `Message`,
//! returning whether it matched and appending to a `MatchList` as a side
//! effect.
//!
//! `NEW`/`OLD` check the `S` flag in addition to the current subdir, via
//! [`Message::is_new`](crate::message::Message::is_new).

use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::expr::{CaseConv, DateOp, ExprNode, Pattern};
use crate::interp::interpolate;
use crate::macros::MacroTable;
use crate::matchlist::{Capture, MatchList, PredicateRecord};
use crate::message::Message;

pub fn evaluate(node: &Rc<ExprNode>, message: &Message, ml: &mut MatchList) -> Result<bool> {
    match node.as_ref() {
        ExprNode::And(l, r) => {
            if !evaluate(l, message, ml)? {
                return Ok(false);
            }
            evaluate(r, message, ml)
        }
        ExprNode::Or(l, r) => {
            let mark = ml.mark();
            if evaluate(l, message, ml)? {
                return Ok(true);
            }
            ml.truncate(mark);
            evaluate(r, message, ml)
        }
        ExprNode::Neg(x) => {
            let mark = ml.mark();
            let matched = evaluate(x, message, ml)?;
            ml.truncate(mark);
            Ok(!matched)
        }
        ExprNode::All => Ok(true),
        ExprNode::Match(children) => {
            // A rule branch is an implicit AND-chain over its children:
            // `rule_eval` in the original C source breaks out of its
            // expression list on the first non-match for an AND-type rule.
            // Stopping here means a predicate that fails partway through a
            // branch prevents every action after it from running, matching
            // `match header "To" /x/ move "M2"` only moving messages whose
            // header actually matched rather than unconditionally running
            // every child.
            for child in children {
                if !evaluate(child, message, ml)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ExprNode::Header { keys, pattern } => eval_header(node, keys, pattern, message, ml),
        ExprNode::Body { pattern } => eval_body(node, pattern, message, ml),
        ExprNode::New => Ok(message.is_new()),
        ExprNode::Old => Ok(!message.is_new()),
        ExprNode::Stat { path_template } => eval_stat(path_template, message, ml),
        ExprNode::Date { field, op, delta } => Ok(eval_date(field, *op, *delta, message)),
        ExprNode::Move { dest_template } => {
            ml.append_move(node.clone(), dest_template.clone());
            Ok(true)
        }
        ExprNode::Flag { subdir_template } => {
            ml.append_flag(node.clone(), subdir_template.clone());
            Ok(true)
        }
        ExprNode::Discard => {
            ml.append_discard(node.clone());
            Ok(true)
        }
        ExprNode::Label { templates } => {
            ml.append_label(node.clone(), templates.clone());
            Ok(true)
        }
        ExprNode::Reject => {
            ml.append_reject(node.clone());
            Ok(true)
        }
        ExprNode::Exec { argv_templates, stdin } => {
            ml.append_exec(node.clone(), argv_templates.clone(), *stdin);
            Ok(true)
        }
    }
}

fn build_captures(caps: &regex::Captures, case_conv: CaseConv) -> Vec<Capture> {
    let convert = |s: &str| match case_conv {
        CaseConv::None => s.to_string(),
        CaseConv::Lower => s.to_ascii_lowercase(),
        CaseConv::Upper => s.to_ascii_uppercase(),
    };
    caps.iter()
        .map(|m| match m {
            Some(m) => Capture {
                start: m.start(),
                end: m.end(),
                text: convert(m.as_str()),
            },
            None => Capture { start: 0, end: 0, text: String::new() },
        })
        .collect()
}

fn eval_header(node: &Rc<ExprNode>, keys: &[String], pattern: &Pattern, message: &Message, ml: &mut MatchList) -> Result<bool> {
    for key in keys {
        for value in message.headers().get(key) {
            if let Some(caps) = pattern.regex.captures(&value) {
                let whole = caps.get(0).unwrap();
                ml.push_predicate(
                    node.clone(),
                    PredicateRecord {
                        key: Some(key.clone()),
                        value: Some(value.clone()),
                        valbeg: whole.start(),
                        valend: whole.end(),
                        captures: build_captures(&caps, pattern.case_conv),
                    },
                );
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn eval_body(node: &Rc<ExprNode>, pattern: &Pattern, message: &Message, ml: &mut MatchList) -> Result<bool> {
    let body = message.body()?;
    let text = String::from_utf8_lossy(&body);
    if let Some(caps) = pattern.regex.captures(&text) {
        let whole = caps.get(0).unwrap();
        ml.push_predicate(
            node.clone(),
            PredicateRecord {
                key: None,
                value: Some(text.into_owned()),
                valbeg: whole.start(),
                valend: whole.end(),
                captures: build_captures(&caps, pattern.case_conv),
            },
        );
        Ok(true)
    } else {
        Ok(false)
    }
}

/// `STAT(path)`: interpolates eagerly against whatever captures already
/// precede it in the match list, then checks the result names an existing
/// path. Unlike an action's deferred interpolation pass, this has to run
/// immediately since its boolean result feeds `AND`/`OR` short-circuiting.
fn eval_stat(path_template: &str, _message: &Message, ml: &MatchList) -> Result<bool> {
    let captures = ml.nearest_captures(ml.len());
    let resolved = interpolate(path_template, captures, &MacroTable::new())?;
    Ok(Path::new(&resolved).exists())
}

fn eval_date(field: &str, op: DateOp, delta: Duration, message: &Message) -> bool {
    let parsed = match message.header_date(field) {
        Some(d) => d,
        None => return false,
    };
    let parsed_utc: DateTime<Utc> = parsed.with_timezone(&Utc);
    let now: DateTime<Utc> = SystemTime::now().into();
    let threshold = now - chrono::Duration::from_std(delta).unwrap_or(chrono::Duration::zero());
    match op {
        DateOp::Before => parsed_utc < threshold,
        DateOp::After => parsed_utc > threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CaseConv;
    use std::path::PathBuf;

    fn header_node(key: &str, re: &str) -> Rc<ExprNode> {
        Rc::new(ExprNode::Header {
            keys: vec![key.to_string()],
            pattern: Pattern::compile(re, false, CaseConv::None).unwrap(),
        })
    }

    fn msg(data: &[u8]) -> Message {
        Message::parse(PathBuf::from("/m/new/1.host"), data).unwrap()
    }

    #[test]
    fn header_match_records_captures() {
        let m = msg(b"From: bob@example.com\n\nbody");
        let node = header_node("From", r"(\S+)@(\S+)");
        let mut ml = MatchList::new();
        assert!(evaluate(&node, &m, &mut ml).unwrap());
        assert_eq!(ml.len(), 1);
    }

    #[test]
    fn and_short_circuits() {
        let m = msg(b"To: x\n\nbody");
        let node = Rc::new(ExprNode::And(
            header_node("From", "nomatch"),
            header_node("To", "x"),
        ));
        let mut ml = MatchList::new();
        assert!(!evaluate(&node, &m, &mut ml).unwrap());
        assert!(ml.is_empty());
    }

    #[test]
    fn or_rolls_back_failed_branch() {
        let m = msg(b"Y: 2\n\nbody");
        let node = Rc::new(ExprNode::Or(header_node("X", "1"), header_node("Y", "2")));
        let mut ml = MatchList::new();
        assert!(evaluate(&node, &m, &mut ml).unwrap());
        assert_eq!(ml.len(), 1);
    }

    #[test]
    fn neg_double_negation_matches_original() {
        let m = msg(b"To: x\n\nbody");
        let inner = header_node("To", "x");
        let once = Rc::new(ExprNode::Neg(inner.clone()));
        let twice = Rc::new(ExprNode::Neg(once.clone()));
        let mut ml = MatchList::new();
        assert!(evaluate(&inner, &m, &mut ml.clone()).unwrap());
        assert!(!evaluate(&once, &m, &mut ml.clone()).unwrap());
        assert!(evaluate(&twice, &m, &mut ml).unwrap());
    }

    #[test]
    fn neg_invalidates_records() {
        let m = msg(b"To: x\n\nbody");
        let node = Rc::new(ExprNode::Neg(header_node("To", "x")));
        let mut ml = MatchList::new();
        assert!(!evaluate(&node, &m, &mut ml).unwrap());
        assert!(ml.is_empty());
    }

    #[test]
    fn all_always_succeeds_with_no_record() {
        let m = msg(b"To: x\n\nbody");
        let mut ml = MatchList::new();
        assert!(evaluate(&Rc::new(ExprNode::All), &m, &mut ml).unwrap());
        assert!(ml.is_empty());
    }

    #[test]
    fn new_requires_unseen_in_new_dir() {
        let m = Message::parse(PathBuf::from("/m/new/1.host"), b"To: x\n\nb").unwrap();
        let mut ml = MatchList::new();
        assert!(evaluate(&Rc::new(ExprNode::New), &m, &mut ml).unwrap());
        let seen = Message::parse(PathBuf::from("/m/new/1.host:2,S"), b"To: x\n\nb").unwrap();
        assert!(!evaluate(&Rc::new(ExprNode::New), &seen, &mut ml).unwrap());
    }

    #[test]
    fn move_action_appends_record_and_succeeds() {
        let m = msg(b"To: x\n\nbody");
        let node = Rc::new(ExprNode::Move { dest_template: "M2".into() });
        let mut ml = MatchList::new();
        assert!(evaluate(&node, &m, &mut ml).unwrap());
        assert_eq!(ml.len(), 1);
    }

    #[test]
    fn match_short_circuits_and_skips_later_actions_on_failed_predicate() {
        let m = msg(b"To: x\n\nbody");
        let node = Rc::new(ExprNode::Match(vec![
            header_node("To", "nomatch"),
            Rc::new(ExprNode::Move { dest_template: "M2".into() }),
        ]));
        let mut ml = MatchList::new();
        assert!(!evaluate(&node, &m, &mut ml).unwrap());
        assert!(ml.is_empty());
    }

    #[test]
    fn match_runs_action_only_after_every_predicate_matches() {
        let m = msg(b"To: x\n\nbody");
        let node = Rc::new(ExprNode::Match(vec![
            header_node("To", "x"),
            Rc::new(ExprNode::Move { dest_template: "M2".into() }),
        ]));
        let mut ml = MatchList::new();
        assert!(evaluate(&node, &m, &mut ml).unwrap());
        assert_eq!(ml.len(), 2);
    }
}
