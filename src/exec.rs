//! The action executor: applies a resolved match list against a Maildir and
//! a message.
//!
//! Control flow: source-maildir reassignment after a cross-maildir move,
//! `REJECT` continuing rather than aborting, any other error aborting the
//! rest of the list. `exec`'s stdin modes (`off`/`message`/`body`) are wired
//! via an unlinked temp file.

use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::config::Environment;
use crate::error::{ExecOutcome, MdsortError, Result};
use crate::expr::StdinMode;
use crate::interp::{resolve_actions, ResolvedKind};
use crate::maildir::Maildir;
use crate::matchlist::MatchList;
use crate::message::Message;

/// Apply every action in `ml`, in order, to `msg`, initially located in
/// `src`. Returns whether a `REJECT` was encountered (the run-level
/// exit-code flag is the caller's concern — see `run.rs`). The first
/// non-`REJECT` error aborts the remaining actions for this message;
/// actions already applied are not rolled back.
pub fn apply(ml: &MatchList, mut src: Maildir, msg: &mut Message, env: &Environment) -> Result<bool> {
    let resolved = resolve_actions(ml, msg)?;
    let mut reject = false;

    for action in resolved {
        match action.kind {
            ResolvedKind::MoveFlag { path, .. } => {
                let mut dst = Maildir::open_single(PathBuf::from(&path))?;
                let relocates = dst.root() != src.root() || dst.subdir() != src.subdir();
                let dest_path = src.move_message(&mut dst, msg, env)?;
                msg.set_path(dest_path);
                if relocates {
                    src = dst;
                }
            }
            ResolvedKind::Discard => {
                src.unlink_message(msg)?;
            }
            ResolvedKind::Label { value } => {
                let path = msg.path().to_path_buf();
                msg.set_header("X-Label", value);
                msg.write_to(&path)?;
            }
            ResolvedKind::Reject => {
                reject = true;
            }
            ResolvedKind::Exec { argv, stdin } => {
                run_exec(&argv, stdin, msg, env)?;
            }
        }
    }

    Ok(reject)
}

/// Launch `argv[0]` with `argv[1..]`, wiring its stdin per `stdin`.
fn run_exec(argv: &[String], stdin: StdinMode, msg: &Message, env: &Environment) -> Result<()> {
    let argv0 = argv
        .first()
        .ok_or_else(|| MdsortError::config("exec: empty argv"))?;

    let stdin_file = match stdin {
        StdinMode::Off => std::fs::File::open("/dev/null").map_err(MdsortError::Io)?,
        StdinMode::Message => temp_stdin(&msg.serialize(), &env.tmpdir)?,
        StdinMode::Body => temp_stdin(&msg.body()?, &env.tmpdir)?,
    };

    let mut child = std::process::Command::new(argv0)
        .args(&argv[1..])
        .stdin(stdin_file)
        .spawn()
        .map_err(|e| MdsortError::io_at(argv0, e))?;

    let status = child.wait().map_err(MdsortError::Io)?;

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(MdsortError::Subprocess {
                argv0: argv0.clone(),
                outcome: ExecOutcome::Signaled(signal),
            });
        }
    }
    let code = status.code().unwrap_or(0);
    if code != 0 {
        return Err(MdsortError::Subprocess {
            argv0: argv0.clone(),
            outcome: ExecOutcome::Exited(code),
        });
    }
    Ok(())
}

/// A temp file containing `data`, unlinked immediately after creation and
/// rewound to offset 0 so the child inherits it as stdin but no directory
/// entry survives (`mkstemp`-style create-then-unlink while the descriptor
/// stays open).
fn temp_stdin(data: &[u8], tmpdir: &std::path::Path) -> Result<std::fs::File> {
    let name = format!(".mdsort.{}.{}", std::process::id(), rand::random::<u32>());
    let path = tmpdir.join(&name);
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| MdsortError::io_at(&path, e))?;
    std::fs::remove_file(&path).map_err(|e| MdsortError::io_at(&path, e))?;
    file.write_all(data).map_err(MdsortError::Io)?;
    file.seek(SeekFrom::Start(0)).map_err(MdsortError::Io)?;
    Ok(file)
}
