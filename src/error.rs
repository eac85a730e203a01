// SPDX-License-Identifier: GPL-3.0-or-later
use std::error::Error as StdError;
use std::fmt;

/// Errors from aggregating a frame.
///
/// Invalid readings are not errors, they are dropped before any statistics are computed. The only
/// failure is being handed a frame that doesn't match the configured grid, which means the camera
/// and the aggregator were wired up with different sizes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum AggregateError {
    DimensionMismatch { expected: usize, actual: usize },
}

impl fmt::Debug for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, actual } => f
                .debug_struct("DimensionMismatch")
                .field("expected", expected)
                .field("actual", actual)
                .finish(),
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DimensionMismatch { expected, actual } => write!(
                f,
                "frame has {} readings, but the aggregator expects {}",
                actual, expected
            ),
        }
    }
}

impl StdError for AggregateError {}
