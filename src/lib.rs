//! A declarative Maildir-sorting engine: a rule-expression core (AST,
//! evaluator, match-accumulation, interpolation, action execution) plus the
//! Maildir and message-model substrate it runs against.
//!
//! See `src/bin/mdsort.rs` for the embedding CLI; this crate's core never
//! parses a configuration file or touches `argv` itself.

pub mod config;
pub mod error;
pub mod eval;
pub mod exec;
pub mod expr;
pub mod inspect;
pub mod macros;
pub mod maildir;
pub mod matchlist;
pub mod message;
pub mod path;
pub mod run;
pub mod interp;
