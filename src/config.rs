//! The data shape a configuration parser would build: one `(maildir, expr)`
//! pair per parsed rule block, plus process-wide facts (`home`/`hostname`/
//! `tmpdir`) threaded through the walker and executor. This crate never
//! parses a configuration file itself — this module only exists so the core
//! has somewhere to receive a parser's output without depending on one.

use std::path::PathBuf;
use std::rc::Rc;

use crate::expr::ExprNode;

/// One `maildir { match ... }` block: the Maildir root to walk and the rule
/// tree to evaluate against every message found there.
#[derive(Debug, Clone)]
pub struct RuleConfig {
    pub maildir: PathBuf,
    pub expr: Rc<ExprNode>,
}

/// Process-wide facts the walker/executor/macro table need, gathered from
/// the environment: `$HOME` (or the passwd database), the domain-stripped
/// local hostname, and `$TMPDIR` for `exec`'s stdin temp files.
#[derive(Debug, Clone)]
pub struct Environment {
    pub home: PathBuf,
    pub hostname: String,
    pub tmpdir: PathBuf,
}

impl Environment {
    /// Gather `home`/`hostname`/`tmpdir`: `$HOME` falls back to nothing (the
    /// passwd-database fallback is a CLI-only concern, not reproduced here —
    /// see `src/bin/mdsort.rs`), the hostname has any domain suffix stripped,
    /// and `tmpdir` falls back to `/tmp`.
    pub fn discover(home: PathBuf, hostname: String, tmpdir: Option<PathBuf>) -> Environment {
        let hostname = hostname.split('.').next().unwrap_or(&hostname).to_string();
        Environment {
            home,
            hostname,
            tmpdir: tmpdir.unwrap_or_else(|| PathBuf::from("/tmp")),
        }
    }
}
