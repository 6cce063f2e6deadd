//! The embedding CLI: option parsing, verbosity wiring, environment
//! discovery. Contains no rule-engine logic of its own — it exists only to
//! exercise `mdsort::run` end to end.

use std::path::PathBuf;
use std::process::ExitCode;

use structopt::StructOpt;

use mdsort::config::{Environment, RuleConfig};
use mdsort::run::{run, RunOptions};

#[derive(StructOpt)]
#[structopt(author, about = "Declarative Maildir sorting engine")]
struct Options {
    #[structopt(short = "d", help = "Dry run: verbose and inspect, no filesystem mutation")]
    dry_run: bool,
    #[structopt(short = "n", help = "Check configuration syntax only, then exit")]
    check_only: bool,
    #[structopt(short = "v", parse(from_occurrences), help = "Increase verbosity, may be repeated")]
    verbose: u8,
    #[structopt(short = "f", parse(from_os_str), help = "Alternate configuration path")]
    config: Option<PathBuf>,
}

/// `0` success, `1` configuration or runtime error, `2` command-line
/// misuse.
const EXIT_ERROR: u8 = 1;
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    let opts = Options::from_args();

    let level = match opts.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).format_timestamp(None).init();

    let home = match std::env::var_os("HOME") {
        Some(h) => PathBuf::from(h),
        None => {
            log::error!("HOME is not set");
            return ExitCode::from(EXIT_USAGE);
        }
    };
    let config_path = opts.config.clone().unwrap_or_else(|| home.join(".mdsort.conf"));

    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let tmpdir = std::env::var_os("TMPDIR").map(PathBuf::from);
    let env = Environment::discover(home, hostname, tmpdir);

    let configs = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}: {}", config_path.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if opts.check_only {
        return ExitCode::SUCCESS;
    }

    let run_opts = RunOptions { dry_run: opts.dry_run };
    let (had_error, had_reject) = run(&configs, &env, run_opts);

    if had_error || had_reject {
        ExitCode::from(EXIT_ERROR)
    } else {
        ExitCode::SUCCESS
    }
}

/// This crate never parses a configuration file itself; this binary has no
/// parser to call, so it always errors unless a parser is linked in above
/// it.
fn load_config(_path: &std::path::Path) -> mdsort::error::Result<Vec<RuleConfig>> {
    Err(mdsort::error::MdsortError::config(
        "no configuration parser is linked into this binary",
    ))
}
