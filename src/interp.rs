//! The interpolator: substitutes `\N` back-references and `${name}` macros
//! into action templates. Unknown back-references or macros are hard
//! configuration errors rather than silently dropped.

use std::rc::Rc;

use crate::error::{MdsortError, Result};
use crate::expr::{ExprNode, StdinMode};
use crate::macros::{scan_macro, MacroTable};
use crate::matchlist::{Capture, MatchList, RecordBody};
use crate::message::Message;
use crate::path;

/// Parse a leading `\N` at the start of `s`. Returns `(n, consumed_len)`.
fn scan_backref(s: &str) -> Option<(usize, usize)> {
    let rest = s.strip_prefix('\\')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let n: usize = digits.parse().ok()?;
    Some((n, 1 + digits.len()))
}

/// Substitute every `\N` and `${name}` occurrence in `template`.
/// `captures` is the capture vector of the nearest preceding
/// `INTERPOLATE`-capable predicate (index 0 is the whole match), or `None`
/// if no such predicate precedes this action in the match list.
pub fn interpolate(template: &str, captures: Option<&[Capture]>, macros: &MacroTable) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while !rest.is_empty() {
        if rest.starts_with('\\') {
            if let Some((n, consumed)) = scan_backref(rest) {
                let cap = captures
                    .and_then(|c| c.get(n))
                    .ok_or_else(|| MdsortError::config(format!("\\{}: invalid back-reference", n)))?;
                out.push_str(&cap.text);
                rest = &rest[consumed..];
                continue;
            }
        } else if rest.starts_with("${") {
            if let Some((name, consumed)) = scan_macro(rest) {
                let value = macros
                    .get(name)
                    .ok_or_else(|| MdsortError::config(format!("${{{}}}: unknown macro", name)))?;
                out.push_str(value);
                rest = &rest[consumed..];
                continue;
            }
        }
        let ch_len = rest.chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&rest[..ch_len]);
        rest = &rest[ch_len..];
    }

    Ok(out)
}

/// A match-list action record with every template resolved, ready for
/// `exec::apply`. Computed in one dedicated pass, run once per message
/// before any action touches the filesystem.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub expr: Rc<ExprNode>,
    pub kind: ResolvedKind,
}

#[derive(Debug, Clone)]
pub enum ResolvedKind {
    MoveFlag { maildir: String, subdir: String, path: String },
    Discard,
    Label { value: String },
    Reject,
    Exec { argv: Vec<String>, stdin: StdinMode },
}

/// Run the interpolation pass over every action record in `ml`, in order.
/// `message` supplies the `${path}` macro and, for `label`, the existing
/// `X-Label` header value to concatenate with the node's own label strings.
pub fn resolve_actions(ml: &MatchList, message: &Message) -> Result<Vec<ResolvedAction>> {
    let message_path = message.path().to_string_lossy().into_owned();
    let macros = MacroTable::for_message(&message_path);
    let mut out = Vec::with_capacity(ml.len());

    for (i, record) in ml.records().iter().enumerate() {
        let captures = ml.nearest_captures(i);
        let kind = match &record.body {
            RecordBody::Predicate(_) => continue,
            RecordBody::MoveFlag(mf) => {
                let mut mf = mf.clone();
                if let Some(t) = &mf.dest_template {
                    mf.maildir = Some(interpolate(t, captures, &macros)?);
                }
                if let Some(t) = &mf.subdir_template {
                    mf.subdir = Some(interpolate(t, captures, &macros)?);
                }
                mf.infer_missing(&message_path);
                let maildir = mf
                    .maildir
                    .ok_or_else(|| MdsortError::config(format!("{}: maildir not found", message_path)))?;
                let subdir = mf
                    .subdir
                    .ok_or_else(|| MdsortError::config(format!("{}: subdir not found", message_path)))?;
                let path = path::join(&maildir, &subdir, None)
                    .ok_or_else(|| MdsortError::config("path: buffer too small"))?;
                ResolvedKind::MoveFlag { maildir, subdir, path }
            }
            RecordBody::Discard => ResolvedKind::Discard,
            RecordBody::Label { templates } => {
                let mut value = message.headers().get("X-Label").into_iter().next().unwrap_or_default();
                for t in templates {
                    value.push_str(&interpolate(t, captures, &macros)?);
                }
                ResolvedKind::Label { value }
            }
            RecordBody::Reject => ResolvedKind::Reject,
            RecordBody::Exec { argv_templates, stdin } => {
                let mut argv = Vec::with_capacity(argv_templates.len());
                for t in argv_templates {
                    argv.push(interpolate(t, captures, &macros)?);
                }
                ResolvedKind::Exec { argv, stdin: *stdin }
            }
        };
        out.push(ResolvedAction { expr: record.expr.clone(), kind });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> Vec<Capture> {
        vec![
            Capture { start: 0, end: 5, text: "whole".into() },
            Capture { start: 0, end: 2, text: "gr1".into() },
        ]
    }

    #[test]
    fn backref_zero_is_whole_match() {
        let out = interpolate(r"\0", Some(&caps()), &MacroTable::new()).unwrap();
        assert_eq!(out, "whole");
    }

    #[test]
    fn backref_group() {
        let out = interpolate(r"\1", Some(&caps()), &MacroTable::new()).unwrap();
        assert_eq!(out, "gr1");
    }

    #[test]
    fn unknown_backref_is_error() {
        assert!(interpolate(r"\9", Some(&caps()), &MacroTable::new()).is_err());
    }

    #[test]
    fn backref_without_captures_is_error() {
        assert!(interpolate(r"\0", None, &MacroTable::new()).is_err());
    }

    #[test]
    fn macro_substitution() {
        let m = MacroTable::for_message("/a/b");
        let out = interpolate("${path}/x", None, &m).unwrap();
        assert_eq!(out, "/a/b/x");
    }

    #[test]
    fn unknown_macro_is_error() {
        assert!(interpolate("${nope}", None, &MacroTable::new()).is_err());
    }

    #[test]
    fn idempotent_on_plain_text() {
        let out = interpolate("plain text, no specials", None, &MacroTable::new()).unwrap();
        assert_eq!(out, "plain text, no specials");
    }

    #[test]
    fn mixed_backref_and_macro() {
        let m = MacroTable::for_message("/tmp/x");
        let out = interpolate(r"${path}/\1", Some(&caps()), &m).unwrap();
        assert_eq!(out, "/tmp/x/gr1");
    }

    #[test]
    fn resolve_actions_move_infers_subdir_cur() {
        use crate::expr::{CaseConv, ExprNode, Pattern};
        use std::path::PathBuf;
        let msg = Message::parse(PathBuf::from("/m/new/1"), b"To: x\n\nbody").unwrap();
        let mut ml = MatchList::new();
        let node = Rc::new(ExprNode::Header {
            keys: vec!["To".into()],
            pattern: Pattern::compile("x", false, CaseConv::None).unwrap(),
        });
        crate::eval::evaluate(&node, &msg, &mut ml).unwrap();
        ml.append_move(Rc::new(ExprNode::Move { dest_template: "/m2".into() }), "/m2".into());
        let resolved = resolve_actions(&ml, &msg).unwrap();
        match &resolved[0].kind {
            ResolvedKind::MoveFlag { maildir, subdir, path } => {
                assert_eq!(maildir, "/m2");
                assert_eq!(subdir, "cur");
                assert_eq!(path, "/m2/cur");
            }
            _ => panic!("expected MoveFlag"),
        }
    }

    #[test]
    fn resolve_actions_label_concatenates_existing_header() {
        use std::path::PathBuf;
        let msg = Message::parse(PathBuf::from("/m/new/1"), b"X-Label: old\n\nbody").unwrap();
        let mut ml = MatchList::new();
        ml.append_label(Rc::new(crate::expr::ExprNode::Label { templates: vec!["new".into()] }), vec!["new".into()]);
        let resolved = resolve_actions(&ml, &msg).unwrap();
        match &resolved[0].kind {
            ResolvedKind::Label { value } => assert_eq!(value, "oldnew"),
            _ => panic!("expected Label"),
        }
    }
}
