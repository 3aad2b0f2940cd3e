//! Fatal script errors.

use crate::link::LinkError;

/// An error that stops the script.
///
/// Positions are token indices into the whole script.
#[derive(Debug)]
pub enum ScriptError {
    Parse { pos: usize, message: String },
    UnknownVariable { pos: usize, name: String },
    UnknownProcedure { pos: usize, name: String },
    CallDepth { pos: usize, limit: usize },
    Connection(LinkError),
    Io(std::io::Error),
}

impl ScriptError {
    pub(crate) fn parse(pos: usize, message: impl Into<String>) -> Self {
        ScriptError::Parse { pos, message: message.into() }
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::Parse { pos, message } => write!(f, "token {pos}: {message}"),
            ScriptError::UnknownVariable { pos, name } => {
                write!(f, "token {pos}: unknown variable `{name}`")
            }
            ScriptError::UnknownProcedure { pos, name } => {
                write!(f, "token {pos}: unknown procedure `{name}`")
            }
            ScriptError::CallDepth { pos, limit } => {
                write!(f, "token {pos}: procedure calls nested deeper than {limit}")
            }
            ScriptError::Connection(e) => write!(f, "connection error: {e}"),
            ScriptError::Io(e) => write!(f, "output error: {e}"),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScriptError::Connection(e) => Some(e),
            ScriptError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LinkError> for ScriptError {
    fn from(e: LinkError) -> Self {
        ScriptError::Connection(e)
    }
}

impl From<std::io::Error> for ScriptError {
    fn from(e: std::io::Error) -> Self {
        ScriptError::Io(e)
    }
}
