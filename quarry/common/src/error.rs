// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Error types for the Quarry query engine

use std::error::Error;
use std::fmt;
use std::io;
use std::result;

use crate::DataType;

/// Result type for operations that could result in a [QuarryError]
pub type Result<T, E = QuarryError> = result::Result<T, E>;

/// A generic boxed error type, used where the underlying cause is
/// produced by an external crate
pub type GenericError = Box<dyn Error + Send + Sync>;

/// A SQL syntax error with the byte offset of the offending token and a
/// short snippet of the surrounding input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// What went wrong
    pub message: String,
    /// Byte offset into the SQL text where the error was detected
    pub offset: usize,
    /// The portion of the input surrounding the offset
    pub snippet: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} at offset {} near '{}'",
            self.message, self.offset, self.snippet
        )
    }
}

/// Error type covering every way a Quarry query can fail
#[derive(Debug)]
pub enum QuarryError {
    /// SQL could not be tokenized or parsed
    Parse(ParseError),
    /// A source locator could not be bound to a reader
    UnknownFormat(String),
    /// Reference to an unknown column, or a type mismatch detected at
    /// plan time
    Schema(String),
    /// Incompatible types detected while evaluating an expression
    Type {
        /// The operation that failed, e.g. `>` or `+`
        op: String,
        left: DataType,
        right: DataType,
    },
    /// The join condition is not an equi-join and cannot run as a hash
    /// join
    UnsupportedJoinCondition(String),
    /// File, HTTP or object-store access failed
    Io {
        /// The locator or path being accessed
        path: String,
        source: GenericError,
    },
    /// Credentials required by a remote source were missing or rejected
    Auth(String),
    /// A record was malformed beyond what permissive decoding can
    /// degrade to nulls
    Data(String),
    /// Invariant violation inside the engine itself
    Internal(String),
    /// Error from an external dependency with no more specific mapping
    External(GenericError),
}

impl QuarryError {
    /// Wrap an I/O-flavored error with the locator it occurred on
    pub fn io(path: impl Into<String>, source: impl Into<GenericError>) -> Self {
        QuarryError::Io {
            path: path.into(),
            source: source.into(),
        }
    }

    /// A runtime type mismatch for binary operation `op`
    pub fn type_mismatch(op: impl Into<String>, left: DataType, right: DataType) -> Self {
        QuarryError::Type {
            op: op.into(),
            left,
            right,
        }
    }
}

impl fmt::Display for QuarryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QuarryError::Parse(e) => write!(f, "Parse error: {e}"),
            QuarryError::UnknownFormat(s) => {
                write!(f, "Unknown format: cannot bind a reader to '{s}'")
            }
            QuarryError::Schema(s) => write!(f, "Schema error: {s}"),
            QuarryError::Type { op, left, right } => {
                write!(f, "Type error: cannot apply '{op}' to {left} and {right}")
            }
            QuarryError::UnsupportedJoinCondition(s) => {
                write!(f, "Unsupported join condition: {s}")
            }
            QuarryError::Io { path, source } => {
                if path.is_empty() {
                    write!(f, "IO error: {source}")
                } else {
                    write!(f, "IO error on '{path}': {source}")
                }
            }
            QuarryError::Auth(s) => write!(f, "Auth error: {s}"),
            QuarryError::Data(s) => write!(f, "Data error: {s}"),
            QuarryError::Internal(s) => {
                write!(
                    f,
                    "Internal error: {s}. This was likely caused by a bug in \
                     Quarry's code and we would welcome that you file an bug report \
                     in our issue tracker"
                )
            }
            QuarryError::External(e) => write!(f, "External error: {e}"),
        }
    }
}

impl Error for QuarryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            QuarryError::Io { source, .. } => Some(source.as_ref()),
            QuarryError::External(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ParseError> for QuarryError {
    fn from(e: ParseError) -> Self {
        QuarryError::Parse(e)
    }
}

impl From<io::Error> for QuarryError {
    fn from(e: io::Error) -> Self {
        QuarryError::Io {
            path: String::new(),
            source: Box::new(e),
        }
    }
}

impl From<serde_json::Error> for QuarryError {
    fn from(e: serde_json::Error) -> Self {
        QuarryError::Data(e.to_string())
    }
}

impl From<object_store::Error> for QuarryError {
    fn from(e: object_store::Error) -> Self {
        QuarryError::Io {
            path: String::new(),
            source: Box::new(e),
        }
    }
}

impl From<reqwest::Error> for QuarryError {
    fn from(e: reqwest::Error) -> Self {
        let path = e.url().map(|u| u.to_string()).unwrap_or_default();
        QuarryError::Io {
            path,
            source: Box::new(e),
        }
    }
}

/// Return an [`QuarryError::Internal`] built from the given format
/// arguments
#[macro_export]
macro_rules! internal_err {
    ($($args:expr),*) => {
        Err($crate::QuarryError::Internal(format!($($args),*)))
    };
}

/// Return an [`QuarryError::Schema`] built from the given format
/// arguments
#[macro_export]
macro_rules! schema_err {
    ($($args:expr),*) => {
        Err($crate::QuarryError::Schema(format!($($args),*)))
    };
}
