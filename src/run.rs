//! The runner: config list -> walker -> parser -> evaluator -> executor ->
//! inspector, accumulating a run-level error flag.
//!
//! One failed message is logged and skipped rather than aborting the run;
//! the run-level exit status is the only thing any single message's failure
//! affects.

use std::fs;
use std::rc::Rc;

use log::{debug, warn};

use crate::config::{Environment, RuleConfig};
use crate::eval::evaluate;
use crate::exec;
use crate::inspect;
use crate::maildir::Maildir;
use crate::matchlist::MatchList;
use crate::message::Message;

/// Options threaded through a run, mirroring the embedding CLI's `-d`/`-n`
/// flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// `-d`: verbose + inspect, and run the executor too (a dry run still
    /// mutates nothing if the caller instead wants `-n`'s syntax-check-only
    /// behavior, which never calls `run` at all).
    pub dry_run: bool,
}

/// Process every `RuleConfig` in order. Returns whether any error occurred
/// across the whole run (the exit-code-determining flag) along with whether
/// any message triggered `REJECT`.
pub fn run(configs: &[RuleConfig], env: &Environment, opts: RunOptions) -> (bool, bool) {
    let mut had_error = false;
    let mut had_reject = false;

    for config in configs {
        let mut walker = match Maildir::open_walk(&config.maildir) {
            Ok(w) => w,
            Err(e) => {
                warn!("{}: {}", config.maildir.display(), e);
                had_error = true;
                continue;
            }
        };

        loop {
            let path = match walker.next_path() {
                Ok(Some(p)) => p,
                Ok(None) => break,
                Err(e) => {
                    warn!("{}", e);
                    had_error = true;
                    break;
                }
            };

            match process_one(&path, &config.expr, &config.maildir, env, opts) {
                Ok(reject) => had_reject |= reject,
                Err(e) => {
                    warn!("{}: {}", path.display(), e);
                    had_error = true;
                }
            }
        }
    }

    (had_error, had_reject)
}

fn process_one(
    path: &std::path::Path,
    expr: &Rc<crate::expr::ExprNode>,
    maildir_root: &std::path::Path,
    env: &Environment,
    opts: RunOptions,
) -> crate::error::Result<bool> {
    let data = fs::read(path).map_err(|e| crate::error::MdsortError::io_at(path, e))?;
    let mut msg = Message::parse(path.to_path_buf(), &data)?;

    let mut ml = MatchList::new();
    evaluate(expr, &msg, &mut ml)?;

    if ml.is_empty() {
        debug!("{}: no match", path.display());
        return Ok(false);
    }

    if opts.dry_run {
        let rendered = inspect::render(&ml, &msg, true)?;
        print!("{}", rendered);
        return Ok(false);
    }

    let subdir = msg.parent_subdir().unwrap_or("new");
    let src = Maildir::open_single(maildir_root.join(subdir))?;
    exec::apply(&ml, src, &mut msg, env)
}
