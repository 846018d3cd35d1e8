//! Conversion failures.

use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};

/// Represents a failure to convert a native value into one of the
/// fixed-width word types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversionFailed {
    TooLarge,
    TooSmall,
}

impl Error for ConversionFailed {}

impl Display for ConversionFailed {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            ConversionFailed::TooLarge => "value does not fit in the word",
            ConversionFailed::TooSmall => "word types cannot hold negative values",
        })
    }
}
