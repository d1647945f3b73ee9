//! Shared deterministic types for guard evaluation.
//!
//! These types define the contracts between resources, the evaluator and the
//! translator. They carry no I/O and no references to a run context.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value held in a resource attribute bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
    IntList(Vec<i64>),
    Map(BTreeMap<String, String>),
}

impl AttrValue {
    /// Kind tag used for attribute type checks.
    pub fn kind(&self) -> AttrKind {
        match self {
            Self::Bool(_) => AttrKind::Bool,
            Self::Int(_) => AttrKind::Int,
            Self::Str(_) => AttrKind::Str,
            Self::List(_) => AttrKind::List,
            Self::IntList(_) => AttrKind::IntList,
            Self::Map(_) => AttrKind::Map,
        }
    }

    /// True for `false` and for empty strings, lists and maps.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bool(value) => !value,
            Self::Int(_) => false,
            Self::Str(value) => value.is_empty(),
            Self::List(values) => values.is_empty(),
            Self::IntList(values) => values.is_empty(),
            Self::Map(values) => values.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::List(values) => write!(f, "{values:?}"),
            Self::IntList(values) => write!(f, "{values:?}"),
            Self::Map(values) => write!(f, "{values:?}"),
        }
    }
}

/// Presence check shared by attribute inheritance.
///
/// An absent value counts as empty.
pub fn is_present(value: Option<&AttrValue>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Bool,
    Int,
    Str,
    List,
    IntList,
    Map,
}

/// Tri-state outcome of a block guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardResult {
    /// The anonymous resource reported that it changed something.
    True,
    /// The action completed without updating anything.
    False,
    /// The action raised an error of a handled kind.
    Undetermined,
}

impl GuardResult {
    /// Collapse to a boolean; `Undetermined` is falsy.
    pub fn holds(self) -> bool {
        matches!(self, Self::True)
    }
}

impl From<Option<bool>> for GuardResult {
    fn from(updated: Option<bool>) -> Self {
        if updated.unwrap_or(false) {
            Self::True
        } else {
            Self::False
        }
    }
}

/// Classifiable failure kind raised by a resource action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The external command exited with a status outside `returns`.
    ShellCommandFailed,
    /// The external command exceeded its timeout.
    CommandTimeout,
    /// The requested action is not implemented by the resource type.
    UnsupportedAction,
    /// An attribute held a value the action could not use.
    InvalidAttribute,
    /// The command could not be spawned or its files written.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ShellCommandFailed => "shell_command_failed",
            Self::CommandTimeout => "command_timeout",
            Self::UnsupportedAction => "unsupported_action",
            Self::InvalidAttribute => "invalid_attribute",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

/// Set of error kinds a guard absorbs into [`GuardResult::Undetermined`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandledKinds(BTreeSet<ErrorKind>);

impl HandledKinds {
    pub fn none() -> Self {
        Self::default()
    }

    /// Kinds produced when an external command fails.
    pub fn shell_command_failed() -> Self {
        Self::from_iter([ErrorKind::ShellCommandFailed])
    }

    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.0.contains(&kind)
    }
}

impl FromIterator<ErrorKind> for HandledKinds {
    fn from_iter<I: IntoIterator<Item = ErrorKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Declaring file and line of a guard, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
