/*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
*  http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing,
* software distributed under the License is distributed on an
* "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
* KIND, either express or implied.  See the License for the
* specific language governing permissions and limitations
* under the License.
*/

//! The errors that can occur while building, opening or querying an index.
//! This is the one error type shared by every crate in the workspace.

use std::error::Error;
use std::fmt;
use std::io;

/// Helper type for a call that could go wrong.
pub type SidxResult<T> = Result<T, SidxError>;

#[derive(Debug)]
pub enum SidxError {
    /// Malformed coordinates, negative radius, empty element set where not
    /// allowed, non-existent population.
    InvalidInput(String),
    /// Query references an unknown field or combines incompatible field sets.
    InvalidField(String),
    /// Memory-mapped arena exhausted during build.
    OutOfCapacity { requested: usize, available: usize },
    /// Underlying file or directory operation failed.
    IoError(io::Error),
    /// Another rank in a collective build failed; this rank must terminate.
    CollectiveAbort(String),
    /// Index directory or manifest missing; opening failed.
    NotFound(String),
    /// Variant/operation combination not implemented.
    Unsupported(String),
}

impl fmt::Display for SidxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SidxError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            SidxError::InvalidField(msg) => write!(f, "invalid field: {}", msg),
            SidxError::OutOfCapacity {
                requested,
                available,
            } => write!(
                f,
                "arena out of capacity: requested {} bytes, {} available",
                requested, available
            ),
            SidxError::IoError(e) => write!(f, "I/O error: {}", e),
            SidxError::CollectiveAbort(msg) => write!(f, "collective build aborted: {}", msg),
            SidxError::NotFound(msg) => write!(f, "not found: {}", msg),
            SidxError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

#[allow(deprecated)]
impl Error for SidxError {
    fn description(&self) -> &str {
        match self {
            SidxError::InvalidInput(_) => "invalid input",
            SidxError::InvalidField(_) => "invalid field",
            SidxError::OutOfCapacity { .. } => "arena out of capacity",
            SidxError::IoError(_) => "I/O error",
            SidxError::CollectiveAbort(_) => "collective build aborted",
            SidxError::NotFound(_) => "not found",
            SidxError::Unsupported(_) => "unsupported",
        }
    }

    fn cause(&self) -> Option<&dyn Error> {
        match self {
            SidxError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SidxError {
    fn from(err: io::Error) -> Self {
        SidxError::IoError(err)
    }
}

impl From<serde_json::Error> for SidxError {
    fn from(err: serde_json::Error) -> Self {
        SidxError::NotFound(err.to_string())
    }
}
