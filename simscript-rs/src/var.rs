//! Script variable store.
//!
//! Every script variable is a [`Cell`] with one of three bindings:
//!
//! | Declaration | Binding | `set` | `get` |
//! |-------------|---------|-------|-------|
//! | `var x`, `var x = e` | Local | stores | stored value |
//! | `var x -> sim("p")` | PushOnWrite | stores, queues `set p v` | stored value |
//! | `var x <- sim("p")` | PullOnRead | writes `p` in the input table | `p` from the input table |
//!
//! The store is a single flat namespace owned by the script thread.

use std::collections::HashMap;
use std::sync::Arc;

use crate::link::{set_command, InputTable, OutputQueue};

/// A named value holder.
#[derive(Debug)]
pub enum Cell {
    Local(f64),
    PushOnWrite {
        path: String,
        value: f64,
        queue: Arc<OutputQueue>,
    },
    PullOnRead {
        path: String,
        table: Arc<InputTable>,
    },
}

impl Cell {
    pub fn local(value: f64) -> Self {
        Cell::Local(value)
    }

    /// A simulator control; starts at 0 and sends nothing until set.
    pub fn push_on_write(path: impl Into<String>, queue: Arc<OutputQueue>) -> Self {
        Cell::PushOnWrite { path: path.into(), value: 0.0, queue }
    }

    pub fn pull_on_read(path: impl Into<String>, table: Arc<InputTable>) -> Self {
        Cell::PullOnRead { path: path.into(), table }
    }

    pub fn get(&self) -> f64 {
        match self {
            Cell::Local(v) => *v,
            Cell::PushOnWrite { value, .. } => *value,
            Cell::PullOnRead { path, table } => table.get(path),
        }
    }

    pub fn set(&mut self, v: f64) {
        match self {
            Cell::Local(value) => *value = v,
            Cell::PushOnWrite { path, value, queue } => {
                *value = v;
                queue.push(set_command(path, v));
            }
            Cell::PullOnRead { path, table } => table.set(path, v),
        }
    }

    /// Simulator path this cell is bound to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Cell::Local(_) => None,
            Cell::PushOnWrite { path, .. } | Cell::PullOnRead { path, .. } => Some(path.as_str()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Cell::Local(_) => "local",
            Cell::PushOnWrite { .. } => "push-on-write",
            Cell::PullOnRead { .. } => "pull-on-read",
        }
    }
}

/// Flat name → [`Cell`] mapping.
#[derive(Debug, Default)]
pub struct VarStore {
    vars: HashMap<String, Cell>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a cell.  Returns the cell it replaced.
    pub fn insert(&mut self, name: impl Into<String>, cell: Cell) -> Option<Cell> {
        self.vars.insert(name.into(), cell)
    }

    /// Current value of a variable.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.vars.get(name).map(Cell::get)
    }

    /// Set through the cell's binding.  Returns `false` if `name` is unknown.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match self.vars.get_mut(name) {
            Some(cell) => {
                cell.set(value);
                true
            }
            None => false,
        }
    }

    /// Remove a variable, returning its cell.
    pub fn remove(&mut self, name: &str) -> Option<Cell> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
