use std::{fmt::Display, str::FromStr};

use serde_json::Value;
use thiserror::Error;

use crate::StorageError;

/// A storage operation, owning its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Store `content` at `path`
    WriteFile {
        /// Object path below the bucket path
        path: String,
        /// Object body
        content: Vec<u8>,
    },
    /// Fetch the object at `path`
    ReadFile {
        /// Object path below the bucket path
        path: String,
    },
    /// List every object below `prefix`, recursively
    ReadDirRecursive {
        /// Directory below the bucket path
        prefix: String,
    },
    /// Remove the object at `path`
    Unlink {
        /// Object path below the bucket path
        path: String,
    },
}

/// The kinds of [`Operation`], nameable by their file-system style names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// `writeFile`
    WriteFile,
    /// `readFile`
    ReadFile,
    /// `readdirp`
    ReadDirRecursive,
    /// `unlink`
    Unlink,
}

/// The result of a successful [`Operation`], passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The object was stored
    Written {
        /// Entity tag reported by the store
        etag: String,
    },
    /// The object's body
    Contents(Vec<u8>),
    /// Object keys relative to the listed prefix, in key order
    Listing(Vec<String>),
    /// The object is gone
    Removed,
}

/// A name outside the closed operation set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown operation {0:?}")]
pub struct UnknownOperation(pub String);

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::WriteFile,
        OperationKind::ReadFile,
        OperationKind::ReadDirRecursive,
        OperationKind::Unlink,
    ];

    /// The operation's name.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::WriteFile => "writeFile",
            OperationKind::ReadFile => "readFile",
            OperationKind::ReadDirRecursive => "readdirp",
            OperationKind::Unlink => "unlink",
        }
    }
}

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| UnknownOperation(name.to_string()))
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Operation {
    /// This operation's kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::WriteFile { .. } => OperationKind::WriteFile,
            Operation::ReadFile { .. } => OperationKind::ReadFile,
            Operation::ReadDirRecursive { .. } => OperationKind::ReadDirRecursive,
            Operation::Unlink { .. } => OperationKind::Unlink,
        }
    }

    /// The path or prefix the operation targets.
    pub fn target(&self) -> &str {
        match self {
            Operation::WriteFile { path, .. }
            | Operation::ReadFile { path }
            | Operation::Unlink { path } => path,
            Operation::ReadDirRecursive { prefix } => prefix,
        }
    }

    /// Build an operation of `kind` from positional JSON arguments.
    ///
    /// Every operation takes its path first. `writeFile` takes the content
    /// second, either as a string (stored as UTF-8) or as an array of
    /// bytes.
    pub fn from_args(kind: OperationKind, args: Vec<Value>) -> Result<Self, StorageError> {
        let expected = match kind {
            OperationKind::WriteFile => 2,
            _ => 1,
        };
        if args.len() != expected {
            return Err(StorageError::InvalidArguments(format!(
                "{kind} takes {expected} argument(s), got {}",
                args.len()
            )));
        }

        let mut args = args.into_iter();
        let path = match args.next() {
            Some(Value::String(path)) => path,
            other => {
                return Err(StorageError::InvalidArguments(format!(
                    "{kind} expects a path string, got {}",
                    other.unwrap_or(Value::Null)
                )));
            }
        };

        Ok(match kind {
            OperationKind::WriteFile => Operation::WriteFile {
                path,
                content: content(kind, args.next().unwrap_or(Value::Null))?,
            },
            OperationKind::ReadFile => Operation::ReadFile { path },
            OperationKind::ReadDirRecursive => Operation::ReadDirRecursive { prefix: path },
            OperationKind::Unlink => Operation::Unlink { path },
        })
    }
}

fn content(kind: OperationKind, value: Value) -> Result<Vec<u8>, StorageError> {
    match value {
        Value::String(text) => Ok(text.into_bytes()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|byte| u8::try_from(byte).ok())
                    .ok_or_else(|| {
                        StorageError::InvalidArguments(format!("{kind} content byte {item} is out of range"))
                    })
            })
            .collect(),
        other => Err(StorageError::InvalidArguments(format!(
            "{kind} expects content as a string or byte array, got {other}"
        ))),
    }
}
