//! The simulator scripting language.
//!
//! - [`expr`]: arithmetic over script variables (shunting-yard)
//! - [`cond`]: `lhs <op> rhs` conditions for `if` and `while`
//! - [`command`]: keyword table and leading-token classification
//! - [`interp`]: the cursor-driven interpreter
//!
//! # Quick start
//!
//! ```rust
//! use simscript::config::Catalog;
//! use simscript::script::Interpreter;
//!
//! let mut interp = Interpreter::with_writer(Catalog::default(), Vec::new());
//! interp.run_source("var x = 6\nPrint(x * 7)\n").unwrap();
//! assert_eq!(interp.writer().as_slice(), b"42\n");
//! ```

pub mod command;
pub mod cond;
pub mod error;
pub mod expr;
pub mod interp;

// Re-exports for convenience.
pub use error::ScriptError;
pub use expr::EvalContext;
pub use interp::Interpreter;
