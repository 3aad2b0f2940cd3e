//! simscript: a small scripting runtime that drives a flight simulator.
//!
//! A script is tokenized by [`lexer`], executed by [`script::Interpreter`],
//! and talks to the simulator through the two TCP channels in [`link`]:
//! telemetry flows in as CSV records, control changes flow out as
//! `set <path> <value>` lines.

pub mod cli;
pub mod config;
pub mod lexer;
pub mod link;
pub mod script;
pub mod trace;
pub mod var;
