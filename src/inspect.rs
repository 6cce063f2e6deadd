//! The dry-run / inspect renderer.
//!
//! Renders one `source -> dest` line per action, and, under dry-run, the
//! caret/dollar underline arithmetic for the predicates contributing to it
//! since the previous action (`padbeg`/`padend`, the `padend >= 2` clamp,
//! the multi-line suppression check for body matches).

use std::fmt::Write as _;

use crate::interp::{resolve_actions, ResolvedKind};
use crate::matchlist::{MatchList, PredicateRecord, RecordBody};
use crate::message::Message;
use crate::error::Result;

/// Render the match list: one `source -> dest` line per action, and, when
/// `dry_run` is set, the contributing predicates since the previous action
/// rendered as a caret/dollar underline beneath the matched header or body
/// line.
pub fn render(ml: &MatchList, message: &Message, dry_run: bool) -> Result<String> {
    let resolved = resolve_actions(ml, message)?;
    let source = message.path().to_string_lossy().into_owned();

    let mut out = String::new();
    let mut resolved_idx = 0;
    let mut since_last_action = 0usize;

    for (i, record) in ml.records().iter().enumerate() {
        match &record.body {
            RecordBody::Predicate(_) => continue,
            _ => {
                if dry_run {
                    for predicate in &ml.records()[since_last_action..i] {
                        if let RecordBody::Predicate(p) = &predicate.body {
                            render_predicate(&mut out, predicate.expr.as_ref(), p);
                        }
                    }
                }
                let dest = action_label(&resolved[resolved_idx].kind);
                resolved_idx += 1;
                since_last_action = i + 1;
                let _ = writeln!(out, "{} -> {}", source, dest);
            }
        }
    }

    Ok(out)
}

fn action_label(kind: &ResolvedKind) -> String {
    match kind {
        ResolvedKind::MoveFlag { path, .. } => path.clone(),
        ResolvedKind::Discard => "discard".to_string(),
        ResolvedKind::Label { .. } => "label".to_string(),
        ResolvedKind::Reject => "reject".to_string(),
        ResolvedKind::Exec { argv, .. } => format!("exec {}", argv.join(" ")),
    }
}

/// Render one predicate's contribution: a header match shows the whole
/// value with the `key: ` offset folded into `padbeg`; a body match shows
/// only the line containing it, suppressed entirely if the match spans more
/// than one line.
fn render_predicate(out: &mut String, expr: &crate::expr::ExprNode, p: &PredicateRecord) {
    use crate::expr::ExprNode;

    let value = match &p.value {
        Some(v) => v.as_str(),
        None => return,
    };

    match expr {
        ExprNode::Header { .. } => {
            let key = p.key.as_deref().unwrap_or("");
            let padbeg = key.len() + 2 + p.valbeg;
            let padend = pad_end(p.valbeg, p.valend);
            let _ = writeln!(out, "{}: {}", key, value);
            let _ = writeln!(out, "{}^{}$", " ".repeat(padbeg), " ".repeat(padend));
        }
        ExprNode::Body { .. } => {
            if let Some((line, line_beg)) = line_containing(value, p.valbeg, p.valend) {
                let padbeg = p.valbeg - line_beg;
                let padend = pad_end(p.valbeg, p.valend);
                let _ = writeln!(out, "{}", line);
                let _ = writeln!(out, "{}^{}$", " ".repeat(padbeg), " ".repeat(padend));
            }
        }
        _ => {}
    }
}

fn pad_end(valbeg: usize, valend: usize) -> usize {
    let padend = valend - valbeg;
    if padend >= 2 {
        padend - 2
    } else {
        padend
    }
}

/// Find the line of `value` containing byte offset `valbeg`. Returns
/// `(line, line_start_offset)`, or `None` if `valend` falls past the end of
/// that line (a match spanning multiple lines is suppressed entirely).
fn line_containing(value: &str, valbeg: usize, valend: usize) -> Option<(&str, usize)> {
    let mut line_start = 0usize;
    for line in value.split('\n') {
        let line_end = line_start + line.len();
        if valbeg >= line_start && valbeg <= line_end {
            if valend > line_end {
                return None;
            }
            return Some((line, line_start));
        }
        line_start = line_end + 1;
    }
    None
}
